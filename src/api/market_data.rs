//! Historical market-data client: batch minute-bar retrieval.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, info};

use super::types::{BarsResponse, HistoricalBar};

pub const DATA_API_BASE: &str = "https://data.alpaca.markets";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_LIMIT: u32 = 10_000;

/// Read-only client for the historical bars endpoint.
pub struct MarketDataClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl MarketDataClient {
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

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("APCA_API_KEY_ID").context("APCA_API_KEY_ID not set")?;
        let api_secret =
            std::env::var("APCA_API_SECRET_KEY").context("APCA_API_SECRET_KEY not set")?;
        let base_url =
            std::env::var("APCA_DATA_URL").unwrap_or_else(|_| DATA_API_BASE.to_string());

        Self::new(base_url, api_key, api_secret)
    }

    /// Fetch minute bars for `symbols` between `start` and `end`, following
    /// pagination until exhausted. Transient failures (network errors, rate
    /// limits, server errors) are retried with exponential backoff.
    pub async fn fetch_minute_bars(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<HistoricalBar>>> {
        let url = format!("{}/v2/stocks/bars", self.base_url);
        let joined = symbols.join(",");

        let mut all_bars: HashMap<String, Vec<HistoricalBar>> = HashMap::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self
                .fetch_page(&url, &joined, start, end, page_token.as_deref())
                .await?;
            pages += 1;

            for (symbol, bars) in page.bars {
                all_bars.entry(symbol).or_default().extend(bars);
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        let total: usize = all_bars.values().map(Vec::len).sum();
        info!(bars = total, pages = pages, "Fetched historical bars");

        Ok(all_bars)
    }

    async fn fetch_page(
        &self,
        url: &str,
        symbols: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<BarsResponse> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..ExponentialBackoff::default()
        };

        let start = start.to_rfc3339();
        let end = end.to_rfc3339();
        let limit = PAGE_LIMIT.to_string();

        let page = backoff::future::retry(policy, || async {
            let mut request = self
                .http
                .get(url)
                .header("APCA-API-KEY-ID", &self.api_key)
                .header("APCA-API-SECRET-KEY", &self.api_secret)
                .query(&[
                    ("symbols", symbols),
                    ("timeframe", "1Min"),
                    ("start", start.as_str()),
                    ("end", end.as_str()),
                    ("limit", limit.as_str()),
                ]);
            if let Some(token) = page_token {
                request = request.query(&[("page_token", token)]);
            }

            debug!(symbols = %symbols, page_token = ?page_token, "Fetching bar page");

            let response = request
                .send()
                .await
                .map_err(|e| backoff::Error::transient(anyhow!(e)))?;

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(backoff::Error::transient(anyhow!(
                    "Bars request failed: {}",
                    status
                )));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(anyhow!(
                    "Bars request failed: {} - {}",
                    status,
                    body
                )));
            }

            response
                .json::<BarsResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(anyhow!(e)))
        })
        .await?;

        Ok(page)
    }
}
