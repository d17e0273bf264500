use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::api::error::{ClientError, Result};
use crate::cache::{HttpRequest, StoredResponse};
use crate::config::Config;

/// Performs one live HTTP exchange.
///
/// Implementations return `Ok` for every HTTP answer regardless of status;
/// `Err` is reserved for failures where no answer was obtained.
#[async_trait]
pub trait Transport: Send + Sync {
  /// Base URL every request path is appended to. Part of the cache key.
  fn base_url(&self) -> &str;

  async fn send(&self, request: &HttpRequest) -> Result<StoredResponse>;
}

/// Trading 212 REST transport over reqwest.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: String,
}

impl HttpTransport {
  /// Build a transport for the configured backend and timeout.
  pub fn new(config: &Config, api_key: &str) -> Result<Self> {
    Self::with_credential(&config.base_url(), api_key, config.timeout())
  }

  /// Build a transport for `base_url`, sending `credential` as the Authorization header.
  ///
  /// A zero timeout would fail every request, so it is rejected.
  pub fn with_credential(base_url: &str, credential: &str, timeout: Duration) -> Result<Self> {
    if timeout.is_zero() {
      return Err(ClientError::InvalidRequest("timeout must be greater than zero".into()));
    }
    Url::parse(base_url).map_err(|e| ClientError::InvalidRequest(format!("bad base URL {}: {}", base_url, e)))?;

    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_str(credential)
      .map_err(|_| ClientError::InvalidRequest("API key is not a valid header value".into()))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let client = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(timeout)
      .build()?;

    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }

  fn url_for(&self, request: &HttpRequest) -> Result<Url> {
    let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))
      .map_err(|e| ClientError::InvalidRequest(format!("bad path {}: {}", request.path, e)))?;
    if !request.query.is_empty() {
      url.query_pairs_mut().extend_pairs(request.query.iter());
    }
    Ok(url)
  }
}

#[async_trait]
impl Transport for HttpTransport {
  fn base_url(&self) -> &str {
    &self.base_url
  }

  async fn send(&self, request: &HttpRequest) -> Result<StoredResponse> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|_| ClientError::InvalidRequest(format!("bad method {}", request.method)))?;
    let url = self.url_for(request)?;

    let mut builder = self.client.request(method, url);
    for (name, value) in &request.headers {
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ClientError::InvalidRequest(format!("bad header name {}", name)))?;
      let value = HeaderValue::from_str(value)
        .map_err(|_| ClientError::InvalidRequest(format!("bad value for header {}", name.as_str())))?;
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    debug!(method = %request.method, path = %request.path, status, "live response");

    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_lowercase(), v.to_string()))
      })
      .collect();
    let body = response.bytes().await?.to_vec();

    Ok(StoredResponse {
      status,
      headers,
      body,
    })
  }
}
