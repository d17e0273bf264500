//! Cache key derivation strategies.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::traits::{CacheKey, HttpRequest};

/// Derives a cache key from a request.
///
/// Implementations must be pure functions of their inputs.
pub trait KeyStrategy: Send + Sync {
  fn derive(&self, host: &str, request: &HttpRequest) -> CacheKey;
}

/// Method, full URL and a hash of the body.
///
/// Two POSTs to the same path with different payloads get different keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyStrategy;

impl KeyStrategy for DefaultKeyStrategy {
  fn derive(&self, host: &str, request: &HttpRequest) -> CacheKey {
    let body_hash = sha256_hex(request.body.as_deref().unwrap_or_default());
    let input = format!(
      "{}\n{}\n{}",
      request.method.to_uppercase(),
      full_url(host, request),
      body_hash
    );
    CacheKey::new(sha256_hex(input.as_bytes()))
  }
}

/// Host and path only; method, query and body are ignored.
///
/// Every variant of a request to one path shares a single entry, so distinct
/// POST bodies overwrite each other. Opt-in only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathOnlyKeyStrategy;

impl KeyStrategy for PathOnlyKeyStrategy {
  fn derive(&self, host: &str, request: &HttpRequest) -> CacheKey {
    let input = format!("{}{}", host, request.path);
    CacheKey::new(sha256_hex(input.as_bytes()))
  }
}

/// Configured choice of key strategy.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategyKind {
  #[default]
  Default,
  PathOnly,
}

impl KeyStrategyKind {
  pub fn build(self) -> Box<dyn KeyStrategy> {
    match self {
      Self::Default => Box::new(DefaultKeyStrategy),
      Self::PathOnly => {
        tracing::warn!("path-only cache keys enabled; requests differing only in body share an entry");
        Box::new(PathOnlyKeyStrategy)
      }
    }
  }
}

fn full_url(host: &str, request: &HttpRequest) -> String {
  let query = request.normalized_query();
  if query.is_empty() {
    format!("{}{}", host, request.path)
  } else {
    format!("{}{}?{}", host, request.path, query)
  }
}

// SHA256 hash for stable, fixed-length keys
fn sha256_hex(data: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data);
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const HOST: &str = "demo.trading212.com";

  fn search(ticker: &str) -> HttpRequest {
    HttpRequest::post("/equity/portfolio/ticker")
      .with_json(&json!({ "ticker": ticker }))
      .unwrap()
  }

  #[test]
  fn test_default_is_deterministic() {
    let a = DefaultKeyStrategy.derive(HOST, &search("AAPL_US_EQ"));
    let b = DefaultKeyStrategy.derive(HOST, &search("AAPL_US_EQ"));
    assert_eq!(a, b);
    assert_eq!(a.as_str().len(), 64);
  }

  #[test]
  fn test_default_distinguishes_bodies() {
    let a = DefaultKeyStrategy.derive(HOST, &search("AAPL_US_EQ"));
    let b = DefaultKeyStrategy.derive(HOST, &search("MSFT_US_EQ"));
    assert_ne!(a, b);
  }

  #[test]
  fn test_default_distinguishes_method_host_and_path() {
    let get = HttpRequest::get("/equity/pies");
    let post = HttpRequest::post("/equity/pies");
    let base = DefaultKeyStrategy.derive(HOST, &get);

    assert_ne!(base, DefaultKeyStrategy.derive(HOST, &post));
    assert_ne!(base, DefaultKeyStrategy.derive("live.trading212.com", &get));
    assert_ne!(base, DefaultKeyStrategy.derive(HOST, &HttpRequest::get("/equity/orders")));
  }

  #[test]
  fn test_default_includes_query() {
    let a = HttpRequest::get("/equity/history/orders").with_query("limit", 20);
    let b = HttpRequest::get("/equity/history/orders").with_query("limit", 50);
    assert_ne!(DefaultKeyStrategy.derive(HOST, &a), DefaultKeyStrategy.derive(HOST, &b));
  }

  #[test]
  fn test_reserved_characters_in_query_values_do_not_collide() {
    let packed = HttpRequest::get("/equity/history/orders").with_query("cursor", "1&limit=5");
    let split = HttpRequest::get("/equity/history/orders")
      .with_query("cursor", 1)
      .with_query("limit", 5);
    assert_ne!(
      DefaultKeyStrategy.derive(HOST, &packed),
      DefaultKeyStrategy.derive(HOST, &split)
    );

    let eq_in_value = HttpRequest::get("/x").with_query("a", "b=c");
    let eq_in_name = HttpRequest::get("/x").with_query("a=b", "c");
    assert_ne!(
      DefaultKeyStrategy.derive(HOST, &eq_in_value),
      DefaultKeyStrategy.derive(HOST, &eq_in_name)
    );
  }

  #[test]
  fn test_headers_do_not_affect_key() {
    let a = HttpRequest::get("/equity/account/info");
    let b = HttpRequest::get("/equity/account/info").with_header("X-Trace", "1");
    assert_eq!(DefaultKeyStrategy.derive(HOST, &a), DefaultKeyStrategy.derive(HOST, &b));
  }

  #[test]
  fn test_path_only_collapses_bodies_and_methods() {
    let a = PathOnlyKeyStrategy.derive(HOST, &search("AAPL_US_EQ"));
    let b = PathOnlyKeyStrategy.derive(HOST, &search("MSFT_US_EQ"));
    let c = PathOnlyKeyStrategy.derive(HOST, &HttpRequest::get("/equity/portfolio/ticker"));
    assert_eq!(a, b);
    assert_eq!(a, c);
  }
}
