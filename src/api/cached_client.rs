//! Trading 212 client with transparent response caching.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::api::client::{HttpTransport, Transport};
use crate::api::error::{ClientError, Result};
use crate::api::types::{
  Account, Cash, DuplicateBucketRequest, EnqueuedReportResponse, Exchange, ExportRequest, HistoricalOrder,
  HistoryDividendItem, HistoryPage, HistoryTransactionItem, Instrument, LimitRequest, MarketRequest, Order, Pie,
  PieDetail, PieRequest, Position, PositionSearch, ReportResponse, StopLimitRequest, StopRequest,
};
use crate::cache::{
  CacheLayer, CachePolicy, CacheResult, CacheStorage, Clock, HttpRequest, KeyStrategy, NoopStorage,
  SqliteStorage, StoredResponse,
};
use crate::config::Config;

/// Storage chosen at runtime from configuration.
pub type DynStorage = Box<dyn CacheStorage>;

/// Page size bounds accepted by the history endpoints.
const HISTORY_LIMIT_MIN: u32 = 1;
const HISTORY_LIMIT_MAX: u32 = 50;

/// API client with transparent caching support.
///
/// Every request goes through the cache layer: fresh entries are served
/// without network I/O, misses and stale entries go to the transport, and a
/// transport failure falls back to a stale entry when the policy allows it.
///
/// Calls that change account state (order placement, pie changes, export
/// requests) are marked uncached and always reach the network.
pub struct CachingClient<T: Transport, S: CacheStorage> {
  transport: Arc<T>,
  cache: CacheLayer<S>,
  keys: Arc<dyn KeyStrategy>,
}

impl CachingClient<HttpTransport, DynStorage> {
  /// Create a client for the configured environment and cache settings.
  ///
  /// The credential is read once and also selects the default cache file.
  pub fn from_config(config: &Config) -> color_eyre::Result<Self> {
    let api_key = Config::get_api_key()?;
    let transport = HttpTransport::new(config, &api_key)?;
    let storage: DynStorage = if config.cache.enabled {
      Box::new(SqliteStorage::open_at(&config.cache_path(&api_key)?)?)
    } else {
      Box::new(NoopStorage)
    };

    Ok(Self::new(
      transport,
      storage,
      config.cache.policy(),
      config.cache.key_strategy.build(),
    ))
  }
}

impl<T: Transport, S: CacheStorage> CachingClient<T, S> {
  pub fn new(transport: T, storage: S, policy: CachePolicy, keys: Box<dyn KeyStrategy>) -> Self {
    Self {
      transport: Arc::new(transport),
      cache: CacheLayer::new(storage, policy),
      keys: Arc::from(keys),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.cache = self.cache.with_clock(clock);
    self
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }

  /// Run a request through the cache, returning the raw response and where it came from.
  ///
  /// Non-2xx responses are returned as data here; only transport failures
  /// with no stale entry to fall back on are errors.
  pub async fn execute_raw(&self, request: &HttpRequest) -> Result<CacheResult<StoredResponse>> {
    let key = self.keys.derive(self.transport.base_url(), request);
    let transport = Arc::clone(&self.transport);

    self
      .cache
      .fetch(&key, request, || async move { transport.send(request).await })
      .await
  }

  /// Run a request and decode the JSON body, keeping the source metadata.
  pub async fn execute_with_source<R: DeserializeOwned>(&self, request: &HttpRequest) -> Result<CacheResult<R>> {
    let result = self.execute_raw(request).await?;
    let data = decode(&result.data)?;
    Ok(result.map(|_| data))
  }

  /// Run a request and decode the JSON body.
  pub async fn execute<R: DeserializeOwned>(&self, request: &HttpRequest) -> Result<R> {
    Ok(self.execute_with_source(request).await?.data)
  }

  pub async fn get_account_info(&self) -> Result<Account> {
    self.execute(&HttpRequest::get("/equity/account/info")).await
  }

  pub async fn get_account_cash(&self) -> Result<Cash> {
    self.execute(&HttpRequest::get("/equity/account/cash")).await
  }

  pub async fn get_positions(&self) -> Result<Vec<Position>> {
    self.execute(&HttpRequest::get("/equity/portfolio")).await
  }

  pub async fn get_position(&self, ticker: &str) -> Result<Position> {
    self
      .execute(&HttpRequest::get(format!("/equity/portfolio/{}", ticker)))
      .await
  }

  /// Search for an open position by ticker (POST, cached per body).
  pub async fn search_position(&self, ticker: &str) -> Result<Position> {
    let request = json_request(HttpRequest::post("/equity/portfolio/ticker"), &PositionSearch { ticker })?;
    self.execute(&request).await
  }

  pub async fn get_orders(&self) -> Result<Vec<Order>> {
    self.execute(&HttpRequest::get("/equity/orders")).await
  }

  pub async fn get_order(&self, order_id: i64) -> Result<Order> {
    self
      .execute(&HttpRequest::get(format!("/equity/orders/{}", order_id)))
      .await
  }

  pub async fn cancel_order(&self, order_id: i64) -> Result<()> {
    self
      .execute(&HttpRequest::delete(format!("/equity/orders/{}", order_id)))
      .await
  }

  pub async fn place_market_order(&self, order: &MarketRequest) -> Result<Order> {
    self.place_order("market", order).await
  }

  pub async fn place_limit_order(&self, order: &LimitRequest) -> Result<Order> {
    self.place_order("limit", order).await
  }

  pub async fn place_stop_order(&self, order: &StopRequest) -> Result<Order> {
    self.place_order("stop", order).await
  }

  pub async fn place_stop_limit_order(&self, order: &StopLimitRequest) -> Result<Order> {
    self.place_order("stop_limit", order).await
  }

  async fn place_order<B: Serialize>(&self, kind: &str, order: &B) -> Result<Order> {
    let request = json_request(HttpRequest::post(format!("/equity/orders/{}", kind)), order)?;
    self.execute(&request.uncached()).await
  }

  pub async fn get_pies(&self) -> Result<Vec<Pie>> {
    self.execute(&HttpRequest::get("/equity/pies")).await
  }

  pub async fn get_pie(&self, pie_id: i64) -> Result<PieDetail> {
    self
      .execute(&HttpRequest::get(format!("/equity/pies/{}", pie_id)))
      .await
  }

  pub async fn create_pie(&self, pie: &PieRequest) -> Result<PieDetail> {
    let request = json_request(HttpRequest::post("/equity/pies"), pie)?;
    self.execute(&request.uncached()).await
  }

  pub async fn update_pie(&self, pie_id: i64, pie: &PieRequest) -> Result<PieDetail> {
    let request = json_request(HttpRequest::post(format!("/equity/pies/{}", pie_id)), pie)?;
    self.execute(&request.uncached()).await
  }

  pub async fn duplicate_pie(&self, pie_id: i64, duplicate: &DuplicateBucketRequest) -> Result<PieDetail> {
    let request = json_request(HttpRequest::post(format!("/equity/pies/{}/duplicate", pie_id)), duplicate)?;
    self.execute(&request.uncached()).await
  }

  pub async fn delete_pie(&self, pie_id: i64) -> Result<()> {
    self
      .execute(&HttpRequest::delete(format!("/equity/pies/{}", pie_id)))
      .await
  }

  /// One page of filled and cancelled orders, newest first.
  pub async fn get_history_orders(
    &self,
    cursor: Option<i64>,
    ticker: Option<&str>,
    limit: u32,
  ) -> Result<HistoryPage<HistoricalOrder>> {
    let mut request = history_request("/equity/history/orders", cursor.map(|c| c.to_string()), limit);
    if let Some(ticker) = ticker {
      request = request.with_query("ticker", ticker);
    }
    self.execute(&request).await
  }

  pub async fn get_history_dividends(
    &self,
    cursor: Option<i64>,
    ticker: Option<&str>,
    limit: u32,
  ) -> Result<HistoryPage<HistoryDividendItem>> {
    let mut request = history_request("/equity/history/dividends", cursor.map(|c| c.to_string()), limit);
    if let Some(ticker) = ticker {
      request = request.with_query("ticker", ticker);
    }
    self.execute(&request).await
  }

  /// Deposits, withdrawals and fees, optionally starting at `time` (ISO 8601).
  pub async fn get_history_transactions(
    &self,
    cursor: Option<&str>,
    time: Option<&str>,
    limit: u32,
  ) -> Result<HistoryPage<HistoryTransactionItem>> {
    let mut request = history_request("/equity/history/transactions", cursor.map(str::to_string), limit);
    if let Some(time) = time {
      request = request.with_query("time", time);
    }
    self.execute(&request).await
  }

  pub async fn get_reports(&self) -> Result<Vec<ReportResponse>> {
    self.execute(&HttpRequest::get("/history/exports")).await
  }

  /// Ask for a CSV export of the account history. Poll [`Self::get_reports`] for the link.
  pub async fn request_export(&self, export: &ExportRequest) -> Result<EnqueuedReportResponse> {
    let request = json_request(HttpRequest::post("/history/exports"), export)?;
    self.execute(&request.uncached()).await
  }

  pub async fn get_instruments(&self) -> Result<Vec<Instrument>> {
    self.execute(&HttpRequest::get("/equity/metadata/instruments")).await
  }

  pub async fn get_exchanges(&self) -> Result<Vec<Exchange>> {
    self.execute(&HttpRequest::get("/equity/metadata/exchanges")).await
  }
}

fn json_request<B: Serialize>(request: HttpRequest, body: &B) -> Result<HttpRequest> {
  request
    .with_json(body)
    .map_err(|e| ClientError::InvalidRequest(e.to_string()))
}

fn history_request(path: &str, cursor: Option<String>, limit: u32) -> HttpRequest {
  let request = HttpRequest::get(path).with_query("limit", limit.clamp(HISTORY_LIMIT_MIN, HISTORY_LIMIT_MAX));
  match cursor {
    Some(cursor) => request.with_query("cursor", cursor),
    None => request,
  }
}

/// Turn a stored response into `R`, surfacing non-2xx statuses.
///
/// An empty body decodes as JSON `null`.
fn decode<R: DeserializeOwned>(response: &StoredResponse) -> Result<R> {
  if !response.is_success() {
    return Err(ClientError::UpstreamStatus {
      status: response.status,
      body: String::from_utf8_lossy(&response.body).into_owned(),
    });
  }

  let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
    b"null"
  } else {
    &response.body
  };
  Ok(serde_json::from_slice(body)?)
}
