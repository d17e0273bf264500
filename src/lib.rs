//! Cache-backed client for the Trading 212 REST API.
//!
//! [`cache`] holds the API-agnostic response cache; [`api`] wires it to the
//! Trading 212 endpoints over HTTPS.

pub mod api;
pub mod cache;
pub mod config;
