//! Cache layer that orchestrates caching logic with network fetching.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::policy::{CachePolicy, CachePolicyController, Freshness};
use super::storage::CacheStorage;
use super::traits::{CacheEntry, CacheKey, CacheResult, Clock, HttpRequest, StoredResponse, SystemClock};

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the API client and the network transport,
/// providing transparent caching with offline support. Store failures are
/// logged and otherwise ignored: a failed read is a miss, a failed write
/// leaves the live response untouched.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  controller: CachePolicyController,
  clock: Arc<dyn Clock>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend and policy.
  pub fn new(storage: S, policy: CachePolicy) -> Self {
    Self {
      storage: Arc::new(storage),
      controller: CachePolicyController::new(policy),
      clock: Arc::new(SystemClock),
    }
  }

  /// Replace the clock used to judge freshness.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn controller(&self) -> &CachePolicyController {
    &self.controller
  }

  pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
    self.clock.now()
  }

  /// Fetch a response with a cache-first strategy.
  ///
  /// Requests the policy won't look up (uncacheable methods, bypassed
  /// requests) go straight to `fetcher` and leave the store untouched.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If stale/missing, fetch from network
  /// 3. On network failure, return the stale entry if the policy allows it
  /// 4. Store the live response if the policy says it is cacheable
  ///
  /// `fetcher` resolves to `Err` only for transport-level failures; any
  /// HTTP response, whatever its status, is `Ok`.
  pub async fn fetch<F, Fut, E>(
    &self,
    key: &CacheKey,
    request: &HttpRequest,
    fetcher: F,
  ) -> Result<CacheResult<StoredResponse>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<StoredResponse, E>>,
    E: std::fmt::Display,
  {
    if !self.controller.should_lookup(request) {
      debug!(method = %request.method, path = %request.path, "cache bypassed");
      return fetcher().await.map(CacheResult::from_network);
    }

    let cached = self.lookup(key);
    let had_entry = cached.is_some();

    let stale = match self.controller.should_serve(cached, self.clock.now()) {
      Freshness::Fresh(entry) => {
        debug!(%key, method = %request.method, path = %request.path, "cache hit");
        return Ok(CacheResult::from_cache(entry.response, entry.created_at));
      }
      Freshness::Stale(entry) => {
        debug!(%key, path = %request.path, "cache entry stale, revalidating");
        Some(entry)
      }
      Freshness::Miss => {
        debug!(%key, method = %request.method, path = %request.path, "cache miss");
        None
      }
    };

    match fetcher().await {
      Ok(response) => {
        if self.controller.should_cache(request, &response) {
          self.store(key, &response);
        } else if had_entry {
          // The origin answered and the old entry can't be refreshed from it
          self.evict(key);
        }
        Ok(CacheResult::from_network(response))
      }
      Err(e) => match stale {
        Some(entry) => {
          warn!(%key, path = %request.path, error = %e, "network failed, serving stale entry");
          Ok(CacheResult::offline(entry.response, entry.created_at))
        }
        None => Err(e),
      },
    }
  }

  fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
    match self.storage.get(key) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(%key, error = %e, "cache read failed, treating as miss");
        None
      }
    }
  }

  fn store(&self, key: &CacheKey, response: &StoredResponse) {
    let entry = CacheEntry::new(
      key.clone(),
      response.clone(),
      self.clock.now(),
      self.controller.policy().ttl,
    );
    match self.storage.put(&entry) {
      Ok(()) => debug!(%key, status = response.status, "cached response"),
      Err(e) => warn!(%key, error = %e, "cache write failed"),
    }
  }

  fn evict(&self, key: &CacheKey) {
    if let Err(e) = self.storage.evict(key) {
      warn!(%key, error = %e, "cache evict failed");
    }
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      controller: self.controller.clone(),
      clock: Arc::clone(&self.clock),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::{SqliteStorage, StorageStats};
  use crate::cache::traits::{CacheSource, ManualClock};
  use chrono::{Duration, TimeZone, Utc};
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn layer(allow_stale: bool) -> (CacheLayer<SqliteStorage>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
      Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));
    let policy = CachePolicy {
      allow_stale,
      ..CachePolicy::default()
    };
    let layer = CacheLayer::new(SqliteStorage::open_in_memory().unwrap(), policy)
      .with_clock(clock.clone());
    (layer, clock)
  }

  fn ok(body: &str) -> StoredResponse {
    StoredResponse::new(200, body.as_bytes().to_vec())
  }

  /// Storage whose every operation fails.
  struct BrokenStorage;

  impl CacheStorage for BrokenStorage {
    fn get(&self, _key: &CacheKey) -> color_eyre::Result<Option<CacheEntry>> {
      Err(eyre!("disk unavailable"))
    }
    fn put(&self, _entry: &CacheEntry) -> color_eyre::Result<()> {
      Err(eyre!("disk unavailable"))
    }
    fn evict(&self, _key: &CacheKey) -> color_eyre::Result<()> {
      Err(eyre!("disk unavailable"))
    }
    fn purge_expired(&self, _now: chrono::DateTime<Utc>) -> color_eyre::Result<usize> {
      Err(eyre!("disk unavailable"))
    }
    fn clear(&self) -> color_eyre::Result<usize> {
      Err(eyre!("disk unavailable"))
    }
    fn stats(&self, _now: chrono::DateTime<Utc>) -> color_eyre::Result<StorageStats> {
      Err(eyre!("disk unavailable"))
    }
  }

  #[tokio::test]
  async fn test_fresh_hit_skips_fetcher() {
    let (layer, clock) = layer(true);
    let key = CacheKey::new("k");
    let req = HttpRequest::get("/a");
    let calls = AtomicUsize::new(0);

    let first = layer
      .fetch(&key, &req, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(ok("one"))
      })
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);

    clock.advance(Duration::seconds(100));
    let second = layer
      .fetch(&key, &req, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(ok("two"))
      })
      .await
      .unwrap();

    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data.body, b"one");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_stale_entry_is_refreshed_on_success() {
    let (layer, clock) = layer(true);
    let key = CacheKey::new("k");
    let req = HttpRequest::get("/a");

    layer
      .fetch(&key, &req, || async { Ok::<_, String>(ok("old")) })
      .await
      .unwrap();
    clock.advance(Duration::seconds(400));

    let refreshed = layer
      .fetch(&key, &req, || async { Ok::<_, String>(ok("new")) })
      .await
      .unwrap();
    assert_eq!(refreshed.source, CacheSource::Network);

    let again = layer
      .fetch(&key, &req, || async { Err::<StoredResponse, _>("down".to_string()) })
      .await
      .unwrap();
    assert_eq!(again.source, CacheSource::CacheFresh);
    assert_eq!(again.data.body, b"new");
  }

  #[tokio::test]
  async fn test_transport_failure_serves_stale() {
    let (layer, clock) = layer(true);
    let key = CacheKey::new("k");
    let req = HttpRequest::get("/a");

    layer
      .fetch(&key, &req, || async { Ok::<_, String>(ok("cached")) })
      .await
      .unwrap();
    clock.advance(Duration::seconds(400));

    let result = layer
      .fetch(&key, &req, || async { Err::<StoredResponse, _>("timeout".to_string()) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.body, b"cached");
  }

  #[tokio::test]
  async fn test_transport_failure_without_allow_stale() {
    let (layer, clock) = layer(false);
    let key = CacheKey::new("k");
    let req = HttpRequest::get("/a");

    layer
      .fetch(&key, &req, || async { Ok::<_, String>(ok("cached")) })
      .await
      .unwrap();
    clock.advance(Duration::seconds(400));

    let err = layer
      .fetch(&key, &req, || async { Err::<StoredResponse, _>("timeout".to_string()) })
      .await
      .unwrap_err();
    assert_eq!(err, "timeout");
  }

  #[tokio::test]
  async fn test_uncacheable_response_evicts_expired_entry() {
    let (layer, clock) = layer(true);
    let key = CacheKey::new("k");
    let req = HttpRequest::get("/a");

    layer
      .fetch(&key, &req, || async { Ok::<_, String>(ok("cached")) })
      .await
      .unwrap();
    clock.advance(Duration::seconds(400));

    let result = layer
      .fetch(&key, &req, || async {
        Ok::<_, String>(StoredResponse::new(404, b"gone".to_vec()))
      })
      .await
      .unwrap();
    assert_eq!(result.data.status, 404);
    assert!(layer.storage().get(&key).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_uncacheable_method_never_reads_or_evicts() {
    let (layer, _clock) = layer(true);
    // Same key a path-only strategy would derive for both requests
    let key = CacheKey::new("k");

    layer
      .fetch(&key, &HttpRequest::get("/equity/orders/7"), || async {
        Ok::<_, String>(ok("order"))
      })
      .await
      .unwrap();

    let calls = AtomicUsize::new(0);
    let deleted = layer
      .fetch(&key, &HttpRequest::delete("/equity/orders/7"), || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(StoredResponse::new(200, Vec::new()))
      })
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(deleted.source, CacheSource::Network);
    assert!(deleted.data.body.is_empty());
    assert_eq!(layer.storage().get(&key).unwrap().unwrap().response.body, b"order");
  }

  #[tokio::test]
  async fn test_bypassed_request_fails_without_stale_fallback() {
    let (layer, clock) = layer(true);
    let key = CacheKey::new("k");
    let req = HttpRequest::post("/equity/orders/market");

    layer
      .fetch(&key, &req, || async { Ok::<_, String>(ok("placed")) })
      .await
      .unwrap();
    clock.advance(Duration::seconds(400));

    let err = layer
      .fetch(&key, &req.clone().uncached(), || async {
        Err::<StoredResponse, _>("timeout".to_string())
      })
      .await
      .unwrap_err();
    assert_eq!(err, "timeout");

    let calls = AtomicUsize::new(0);
    for _ in 0..2 {
      let result = layer
        .fetch(&key, &req.clone().uncached(), || async {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok::<_, String>(ok("again"))
        })
        .await
        .unwrap();
      assert_eq!(result.source, CacheSource::Network);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_store_failures_are_not_fatal() {
    let layer = CacheLayer::new(BrokenStorage, CachePolicy::default());
    let key = CacheKey::new("k");
    let req = HttpRequest::get("/a");

    let result = layer
      .fetch(&key, &req, || async { Ok::<_, String>(ok("live")) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.body, b"live");
  }
}
