//! Policy-driven response cache with offline support.
//!
//! This module is agnostic of any particular REST API. It:
//! - Derives deterministic keys from requests (pluggable [`KeyStrategy`])
//! - Persists raw responses with a creation time and TTL
//! - Decides per request/response what to store and what to serve
//! - Serves an expired entry when the network is unavailable, if allowed

mod key;
mod layer;
mod policy;
mod storage;
mod traits;

pub use key::{DefaultKeyStrategy, KeyStrategy, KeyStrategyKind, PathOnlyKeyStrategy};
pub use layer::CacheLayer;
pub use policy::{CachePolicy, CachePolicyController, Freshness};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage, StorageStats};
pub use traits::{
  CacheEntry, CacheKey, CacheResult, CacheSource, Clock, HttpRequest, StoredResponse, SystemClock,
};

#[cfg(test)]
pub use traits::ManualClock;
