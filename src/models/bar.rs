//! Market data primitives: trade ticks and history bars.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single trade event from the market data stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Price bar kept in the rolling history. Immutable once appended.
///
/// Live bars are built from single trade ticks, so high and low start out
/// equal to the trade price; the batch fetch job stores real minute
/// aggregates with a full OHLCV row instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub high: f64,
    pub low: f64,
}

impl Bar {
    /// Build a degenerate single-trade bar from a tick.
    pub fn from_tick(tick: &Tick) -> Self {
        Self {
            timestamp: tick.timestamp,
            close: tick.price,
            high: tick.price,
            low: tick.price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_from_tick() {
        let tick = Tick {
            symbol: "MCD".to_string(),
            price: 290.5,
            timestamp: Utc::now(),
        };

        let bar = Bar::from_tick(&tick);
        assert_eq!(bar.close, 290.5);
        assert_eq!(bar.high, 290.5);
        assert_eq!(bar.low, 290.5);
        assert_eq!(bar.timestamp, tick.timestamp);
    }
}
