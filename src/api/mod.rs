//! Alpaca API clients: trading, historical data, and the live trade stream.

mod broker;
mod market_data;
mod stream;
mod types;

pub use broker::{AlpacaBroker, Brokerage, PAPER_TRADING_URL};
pub use market_data::{MarketDataClient, DATA_API_BASE};
pub use stream::{MarketStream, STREAM_URL};
pub use types::{BarsResponse, HistoricalBar, OrderResponse, SubmitOrderRequest, TradeMessage};
