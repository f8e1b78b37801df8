//! Wire types for the Alpaca trading and market-data APIs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::OrderStatus;

/// Order submission request body (`POST /v2/orders`).
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOrderRequest {
    pub symbol: String,
    pub qty: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub time_in_force: String,
    pub client_order_id: String,
}

/// Order record returned by the trading API.
///
/// Quantities come back as JSON strings and may be absent while an order is
/// still pending at the venue.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    #[serde(default)]
    pub client_order_id: String,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub qty: Option<Decimal>,
    #[serde(default)]
    pub filled_qty: Option<Decimal>,
    #[serde(default)]
    pub filled_avg_price: Option<Decimal>,
}

impl OrderResponse {
    /// Map the venue's status string onto the order lifecycle.
    ///
    /// A fully matched quantity counts as filled even while the status
    /// string lags behind.
    pub fn lifecycle_status(&self) -> OrderStatus {
        if let (Some(filled), Some(qty)) = (self.filled_qty, self.qty) {
            if !qty.is_zero() && filled >= qty {
                return OrderStatus::Filled;
            }
        }

        match self.status.as_str() {
            "filled" => OrderStatus::Filled,
            "canceled" | "expired" | "rejected" => OrderStatus::Canceled,
            "partially_filled" => OrderStatus::PartiallyFilled,
            _ => OrderStatus::Submitted,
        }
    }
}

/// One minute bar from the market-data API.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoricalBar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: i64,
}

/// Paginated response from `GET /v2/stocks/bars`.
#[derive(Debug, Clone, Deserialize)]
pub struct BarsResponse {
    #[serde(default)]
    pub bars: std::collections::HashMap<String, Vec<HistoricalBar>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Trade tick from the streaming API (`"T": "t"` messages).
#[derive(Debug, Clone, Deserialize)]
pub struct TradeMessage {
    #[serde(rename = "S")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}
