//! Brokerage port and the Alpaca trading-API implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::debug;

use crate::models::OrderSide;

use super::types::{OrderResponse, SubmitOrderRequest};

/// Default trading endpoint; live trading overrides it via
/// `APCA_API_BASE_URL`.
pub const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The brokerage surface the pipeline depends on. Market orders only,
/// good-til-canceled, as the strategies require.
#[async_trait]
pub trait Brokerage: Send + Sync + 'static {
    /// Submit a market order and return the venue's order record.
    async fn submit_order(
        &self,
        symbol: &str,
        qty: Decimal,
        side: OrderSide,
        client_order_id: &str,
    ) -> Result<OrderResponse>;

    /// Fetch the current state of an order.
    async fn get_order(&self, order_id: &str) -> Result<OrderResponse>;
}

/// Alpaca trading REST client (paper or live, depending on the base URL).
pub struct AlpacaBroker {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl AlpacaBroker {
    pub fn new(base_url: String, api_key: String, api_secret: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            api_secret,
        })
    }

    /// Build a client from `APCA_API_KEY_ID` / `APCA_API_SECRET_KEY`,
    /// defaulting to the paper-trading endpoint.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("APCA_API_KEY_ID").context("APCA_API_KEY_ID not set")?;
        let api_secret =
            std::env::var("APCA_API_SECRET_KEY").context("APCA_API_SECRET_KEY not set")?;
        let base_url =
            std::env::var("APCA_API_BASE_URL").unwrap_or_else(|_| PAPER_TRADING_URL.to_string());

        Self::new(base_url, api_key, api_secret)
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }
}

#[async_trait]
impl Brokerage for AlpacaBroker {
    async fn submit_order(
        &self,
        symbol: &str,
        qty: Decimal,
        side: OrderSide,
        client_order_id: &str,
    ) -> Result<OrderResponse> {
        let url = format!("{}/v2/orders", self.base_url);
        let body = SubmitOrderRequest {
            symbol: symbol.to_string(),
            qty: qty.to_string(),
            side: side.as_str().to_string(),
            order_type: "market".to_string(),
            time_in_force: "gtc".to_string(),
            client_order_id: client_order_id.to_string(),
        };

        debug!(symbol = %symbol, side = %side, qty = %qty, "Submitting order");

        let response = self
            .auth(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .context("Failed to submit order")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Order submission failed: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse order response")
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderResponse> {
        let url = format!("{}/v2/orders/{}", self.base_url, order_id);

        let response = self
            .auth(self.http.get(&url))
            .send()
            .await
            .context("Failed to fetch order")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Order lookup failed: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse order response")
    }
}
