//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque, value-derived key identifying one cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A request as seen by the cache: enough to derive a key and to perform
/// the network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
  pub method: String,
  /// Path relative to the API base URL, e.g. `/equity/account/info`
  pub path: String,
  pub query: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  pub headers: BTreeMap<String, String>,
  /// Never read from or written to the cache (non-idempotent calls)
  pub bypass_cache: bool,
}

impl HttpRequest {
  pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      method: method.into().to_uppercase(),
      path: path.into(),
      query: Vec::new(),
      body: None,
      headers: BTreeMap::new(),
      bypass_cache: false,
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new("GET", path)
  }

  pub fn post(path: impl Into<String>) -> Self {
    Self::new("POST", path)
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self::new("DELETE", path)
  }

  pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    self.query.push((name.into(), value.to_string()));
    self
  }

  /// Attach a JSON body.
  pub fn with_json<B: Serialize>(mut self, body: &B) -> serde_json::Result<Self> {
    self.body = Some(serde_json::to_vec(body)?);
    Ok(self)
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into().to_lowercase(), value.into());
    self
  }

  /// Mark the request as one that must always reach the network.
  pub fn uncached(mut self) -> Self {
    self.bypass_cache = true;
    self
  }

  /// Form-encoded query string with parameters sorted, so parameter order
  /// never changes a key while reserved characters in values still do.
  pub fn normalized_query(&self) -> String {
    let mut pairs: Vec<_> = self.query.iter().collect();
    pairs.sort();
    url::form_urlencoded::Serializer::new(String::new())
      .extend_pairs(pairs)
      .finish()
  }
}

/// Raw response as persisted: status, headers and body bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
  pub status: u16,
  /// Header names are lowercased
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl StoredResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into().to_lowercase(), value.into());
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_lowercase()).map(String::as_str)
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// One cached response with its creation time and lifetime.
///
/// Entries are immutable once written; refreshing a key replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub key: CacheKey,
  pub response: StoredResponse,
  pub created_at: DateTime<Utc>,
  pub ttl: Duration,
}

impl CacheEntry {
  pub fn new(key: CacheKey, response: StoredResponse, created_at: DateTime<Utc>, ttl: Duration) -> Self {
    Self {
      key,
      response,
      created_at,
      ttl,
    }
  }

  /// An entry is fresh for `created_at <= now < created_at + ttl`.
  ///
  /// A `created_at` in the future (clock skew) counts as fresh.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now - self.created_at >= self.ttl
  }
}

/// Source of the current time. Freshness is only ever judged against this.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
  now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: std::sync::Mutex::new(start),
    }
  }

  pub fn set(&self, now: DateTime<Utc>) {
    if let Ok(mut guard) = self.now.lock() {
      *guard = now;
    }
  }

  pub fn advance(&self, by: Duration) {
    if let Ok(mut guard) = self.now.lock() {
      *guard += by;
    }
  }
}

#[cfg(test)]
impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    match self.now.lock() {
      Ok(guard) => *guard,
      Err(poisoned) => *poisoned.into_inner(),
    }
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a fresh cache entry.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Offline mode - network unavailable, serving an expired entry
  Offline,
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn entry_at(created: DateTime<Utc>, ttl_secs: i64) -> CacheEntry {
    CacheEntry::new(
      CacheKey::new("k"),
      StoredResponse::new(200, b"{}".to_vec()),
      created,
      Duration::seconds(ttl_secs),
    )
  }

  #[test]
  fn test_fresh_until_ttl_elapses() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let entry = entry_at(t0, 300);

    assert!(!entry.is_expired(t0));
    assert!(!entry.is_expired(t0 + Duration::seconds(299)));
    assert!(!entry.is_expired(t0 + Duration::milliseconds(299_999)));
    assert!(entry.is_expired(t0 + Duration::seconds(300)));
    assert!(entry.is_expired(t0 + Duration::seconds(400)));
  }

  #[test]
  fn test_future_entry_is_fresh() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let entry = entry_at(t0 + Duration::seconds(60), 300);
    assert!(!entry.is_expired(t0));
  }

  #[test]
  fn test_zero_ttl_is_always_expired() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    assert!(entry_at(t0, 0).is_expired(t0));
  }

  #[test]
  fn test_normalized_query_ignores_order() {
    let a = HttpRequest::get("/x").with_query("b", 2).with_query("a", 1);
    let b = HttpRequest::get("/x").with_query("a", 1).with_query("b", 2);
    assert_eq!(a.normalized_query(), "a=1&b=2");
    assert_eq!(a.normalized_query(), b.normalized_query());
  }

  #[test]
  fn test_normalized_query_escapes_reserved_characters() {
    let packed = HttpRequest::get("/x").with_query("cursor", "1&limit=5");
    let split = HttpRequest::get("/x").with_query("cursor", 1).with_query("limit", 5);
    assert_eq!(packed.normalized_query(), "cursor=1%26limit%3D5");
    assert_eq!(split.normalized_query(), "cursor=1&limit=5");
  }

  #[test]
  fn test_uncached_sets_bypass() {
    assert!(!HttpRequest::post("/x").bypass_cache);
    assert!(HttpRequest::post("/x").uncached().bypass_cache);
  }

  #[test]
  fn test_method_is_uppercased() {
    assert_eq!(HttpRequest::new("post", "/x").method, "POST");
  }

  #[test]
  fn test_manual_clock_advances() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(t0);
    clock.advance(Duration::seconds(100));
    assert_eq!(clock.now(), t0 + Duration::seconds(100));
    clock.set(t0);
    assert_eq!(clock.now(), t0);
  }
}
