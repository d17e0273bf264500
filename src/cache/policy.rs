//! Cache policy: what gets stored and what may be served.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

use super::traits::{CacheEntry, HttpRequest, StoredResponse};

/// Immutable caching rules for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
  /// Upper-case method names
  pub cacheable_methods: BTreeSet<String>,
  pub cacheable_status_codes: BTreeSet<u16>,
  /// Serve an expired entry when the live call fails at the transport level
  pub allow_stale: bool,
  /// Ignore origin cache directives; method and status alone decide
  pub force_cache: bool,
  /// Lifetime given to new entries
  pub ttl: Duration,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self {
      cacheable_methods: ["GET", "POST"].into_iter().map(String::from).collect(),
      cacheable_status_codes: [200].into_iter().collect(),
      allow_stale: true,
      force_cache: true,
      ttl: Duration::seconds(300),
    }
  }
}

/// Outcome of looking an entry up against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
  /// Serve without touching the network
  Fresh(CacheEntry),
  /// Revalidate, but keep this entry to fall back on
  Stale(CacheEntry),
  Miss,
}

/// Applies a [`CachePolicy`] to individual requests and entries.
#[derive(Debug, Clone)]
pub struct CachePolicyController {
  policy: CachePolicy,
}

impl CachePolicyController {
  pub fn new(policy: CachePolicy) -> Self {
    Self { policy }
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  pub fn is_cacheable_method(&self, method: &str) -> bool {
    self.policy.cacheable_methods.contains(&method.to_uppercase())
  }

  /// Whether the store may be consulted (or touched at all) for `request`.
  ///
  /// Requests marked with [`HttpRequest::uncached`] and methods outside the
  /// cacheable set always go straight to the network.
  pub fn should_lookup(&self, request: &HttpRequest) -> bool {
    !request.bypass_cache && self.is_cacheable_method(&request.method)
  }

  /// Whether a live response to `request` should be written to the store.
  pub fn should_cache(&self, request: &HttpRequest, response: &StoredResponse) -> bool {
    if !self.should_lookup(request) || !self.policy.cacheable_status_codes.contains(&response.status)
    {
      return false;
    }

    if self.policy.force_cache {
      return true;
    }

    let request_no_store = request
      .headers
      .get("cache-control")
      .is_some_and(|v| has_no_store(v));
    let response_no_store = response.header("cache-control").is_some_and(has_no_store);

    !request_no_store && !response_no_store
  }

  /// Classify a looked-up entry at time `now`.
  pub fn should_serve(&self, entry: Option<CacheEntry>, now: DateTime<Utc>) -> Freshness {
    match entry {
      Some(entry) if !entry.is_expired(now) => Freshness::Fresh(entry),
      Some(entry) if self.policy.allow_stale => Freshness::Stale(entry),
      _ => Freshness::Miss,
    }
  }
}

fn has_no_store(cache_control: &str) -> bool {
  cache_control
    .split(',')
    .any(|directive| directive.trim().eq_ignore_ascii_case("no-store"))
}
