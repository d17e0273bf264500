use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
  pub currency_code: String,
  pub id: Option<i64>,
}

/// Cash balances
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cash {
  pub free: f64,
  pub total: f64,
  pub ppl: f64,
  pub result: f64,
  pub invested: f64,
  pub pie_cash: f64,
  pub blocked: Option<f64>,
}

/// Open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
  pub ticker: String,
  pub quantity: f64,
  pub average_price: Option<f64>,
  pub current_price: Option<f64>,
  pub ppl: Option<f64>,
  pub fx_ppl: Option<f64>,
  pub initial_fill_date: Option<String>,
  pub frontend: Option<String>,
  pub max_buy: Option<f64>,
  pub max_sell: Option<f64>,
  pub pie_quantity: Option<f64>,
}

/// Body of the position search endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PositionSearch<'a> {
  pub ticker: &'a str,
}

/// Pending order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: i64,
  pub ticker: String,
  #[serde(rename = "type")]
  pub order_type: Option<String>,
  pub status: Option<String>,
  pub quantity: Option<f64>,
  pub filled_quantity: Option<f64>,
  pub limit_price: Option<f64>,
  pub stop_price: Option<f64>,
  pub creation_time: Option<String>,
  pub strategy: Option<String>,
}

/// Pie summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pie {
  pub id: i64,
  pub cash: Option<f64>,
  pub progress: Option<f64>,
  pub status: Option<String>,
}

/// Pie with its instruments and settings. Kept loosely typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieDetail {
  #[serde(default)]
  pub instruments: Vec<serde_json::Value>,
  pub settings: Option<serde_json::Value>,
}

/// Tradeable instrument metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
  pub ticker: String,
  pub name: Option<String>,
  pub short_name: Option<String>,
  #[serde(rename = "type")]
  pub instrument_type: Option<String>,
  pub currency_code: Option<String>,
  pub isin: Option<String>,
}

/// Exchange and its working schedules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub working_schedules: Vec<serde_json::Value>,
}

/// One page of a history listing. `next_page_path` carries the cursor for
/// the following page, or `None` on the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage<T> {
  #[serde(default = "Vec::new")]
  pub items: Vec<T>,
  pub next_page_path: Option<String>,
}

/// Filled, cancelled or rejected order from the account history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalOrder {
  pub id: i64,
  pub ticker: Option<String>,
  #[serde(rename = "type")]
  pub order_type: Option<String>,
  pub status: Option<String>,
  pub ordered_quantity: Option<f64>,
  pub filled_quantity: Option<f64>,
  pub limit_price: Option<f64>,
  pub stop_price: Option<f64>,
  pub fill_price: Option<f64>,
  pub fill_result: Option<f64>,
  pub date_created: Option<String>,
  pub date_executed: Option<String>,
  pub date_modified: Option<String>,
  pub executor: Option<String>,
  #[serde(default)]
  pub taxes: Vec<serde_json::Value>,
}

/// Dividend paid out on a holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDividendItem {
  pub ticker: Option<String>,
  pub reference: Option<String>,
  pub quantity: Option<f64>,
  pub amount: Option<f64>,
  pub amount_in_euro: Option<f64>,
  pub gross_amount_per_share: Option<f64>,
  pub paid_on: Option<String>,
  #[serde(rename = "type")]
  pub dividend_type: Option<String>,
}

/// Deposit, withdrawal, fee or transfer on the account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryTransactionItem {
  pub reference: Option<String>,
  #[serde(rename = "type")]
  pub transaction_type: Option<String>,
  pub amount: Option<f64>,
  pub date_time: Option<String>,
}

/// Requested CSV export and its progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
  pub report_id: i64,
  pub status: Option<String>,
  pub download_link: Option<String>,
  pub time_from: Option<String>,
  pub time_to: Option<String>,
  pub data_included: Option<ReportDataIncluded>,
}

/// Acknowledgement of an export request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueuedReportResponse {
  pub report_id: i64,
}

/// Sections of the account history to put in an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportDataIncluded {
  pub include_dividends: bool,
  pub include_interest: bool,
  pub include_orders: bool,
  pub include_transactions: bool,
}

impl Default for ReportDataIncluded {
  fn default() -> Self {
    Self {
      include_dividends: true,
      include_interest: true,
      include_orders: true,
      include_transactions: true,
    }
  }
}

/// Body of the export request endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
  pub data_included: ReportDataIncluded,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub time_from: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub time_to: Option<String>,
}

/// Pie to create, or the fields of an existing pie to change
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PieRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
  /// Ticker to target weight, summing to 1
  #[serde(skip_serializing_if = "Option::is_none")]
  pub instrument_shares: Option<BTreeMap<String, f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dividend_cash_action: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_date: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub goal: Option<f64>,
}

/// Body of the pie duplication endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateBucketRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

/// How long a pending order stays on the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeValidity {
  Day,
  GoodTillCancel,
}

/// Market order. A negative quantity sells.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRequest {
  pub ticker: String,
  pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitRequest {
  pub ticker: String,
  pub quantity: f64,
  pub limit_price: f64,
  pub time_validity: TimeValidity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
  pub ticker: String,
  pub quantity: f64,
  pub stop_price: f64,
  pub time_validity: TimeValidity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopLimitRequest {
  pub ticker: String,
  pub quantity: f64,
  pub stop_price: f64,
  pub limit_price: f64,
  pub time_validity: TimeValidity,
}
