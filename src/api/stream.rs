//! Live trade stream: subscribes to the market-data websocket and forwards
//! ticks into a bounded channel.
//!
//! Ingestion is non-blocking: when the engine falls behind, `try_send` drops
//! the tick with a warning instead of letting the websocket reader stall.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::models::Tick;

use super::types::TradeMessage;

/// SIP feed websocket endpoint.
pub const STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2/sip";

/// Websocket client for the live trade feed.
pub struct MarketStream {
    url: String,
    api_key: String,
    api_secret: String,
}

impl MarketStream {
    pub fn new(url: String, api_key: String, api_secret: String) -> Self {
        Self {
            url,
            api_key,
            api_secret,
        }
    }

    /// Build a stream client from `APCA_API_KEY_ID` / `APCA_API_SECRET_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("APCA_API_KEY_ID").context("APCA_API_KEY_ID not set")?;
        let api_secret =
            std::env::var("APCA_API_SECRET_KEY").context("APCA_API_SECRET_KEY not set")?;
        let url = std::env::var("APCA_STREAM_URL").unwrap_or_else(|_| STREAM_URL.to_string());

        Ok(Self::new(url, api_key, api_secret))
    }

    /// Connect, authenticate, subscribe to trades for `symbols`, and pump
    /// ticks into `tx` until the server closes the stream or the engine
    /// drops the receiver.
    pub async fn run(self, symbols: Vec<String>, tx: mpsc::Sender<Tick>) -> Result<()> {
        let (ws_stream, _) = connect_async(&self.url)
            .await
            .context("Failed to connect to market data stream")?;
        let (mut write, mut read) = ws_stream.split();

        let auth = json!({
            "action": "auth",
            "key": self.api_key,
            "secret": self.api_secret,
        });
        write
            .send(Message::Text(auth.to_string()))
            .await
            .context("Failed to authenticate stream")?;

        let subscribe = json!({
            "action": "subscribe",
            "trades": &symbols,
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .context("Failed to subscribe to trades")?;

        info!(symbols = ?symbols, "Subscribed to trade stream");

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if !forward_ticks(&text, &tx) {
                        debug!("Tick receiver dropped, stopping stream");
                        break;
                    }
                }
                Ok(Message::Ping(payload)) => {
                    write.send(Message::Pong(payload)).await.ok();
                }
                Ok(Message::Close(_)) => {
                    warn!("Market data stream closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(e).context("Market data stream error");
                }
            }
        }

        Ok(())
    }
}

/// Parse one stream frame and push its trade ticks into the channel.
/// Returns false once the receiver is gone.
fn forward_ticks(text: &str, tx: &mpsc::Sender<Tick>) -> bool {
    let Ok(messages) = serde_json::from_str::<Vec<Value>>(text) else {
        debug!(frame = %text, "Unparseable stream frame");
        return true;
    };

    for message in messages {
        match message.get("T").and_then(Value::as_str) {
            Some("t") => match serde_json::from_value::<TradeMessage>(message) {
                Ok(trade) => {
                    let tick = Tick {
                        symbol: trade.symbol,
                        price: trade.price,
                        timestamp: trade.timestamp,
                    };
                    match tx.try_send(tick) {
                        Ok(()) => {}
                        Err(TrySendError::Full(tick)) => {
                            warn!(symbol = %tick.symbol, "Tick queue full, dropping tick");
                        }
                        Err(TrySendError::Closed(_)) => return false,
                    }
                }
                Err(e) => warn!(error = %e, "Malformed trade message"),
            },
            Some("error") => {
                error!(message = %message, "Stream error message");
            }
            Some("subscription") => {
                debug!(message = %message, "Subscription update");
            }
            Some("success") => {
                debug!(message = %message, "Stream handshake");
            }
            _ => {}
        }
    }

    true
}
