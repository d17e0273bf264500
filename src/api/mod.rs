pub mod cached_client;
pub mod client;
pub mod error;
pub mod types;

pub use cached_client::{CachingClient, DynStorage};
pub use client::{HttpTransport, Transport};
pub use error::ClientError;
