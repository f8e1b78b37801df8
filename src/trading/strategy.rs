//! Strategy evaluation: maps a history window to a directional signal.
//!
//! Signals are edge-triggered. The engine remembers, per symbol, which side
//! of the trigger level the price was on at the last evaluation and only
//! fires when that side changes, so a condition that persists across many
//! ticks produces one signal instead of an order storm.

use std::collections::HashMap;

use tracing::debug;

use crate::indicators;
use crate::models::{Bar, OrderSide, Signal};

use super::config::StrategyParams;

/// Which band zone the latest price occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BandZone {
    Below,
    Inside,
    Above,
}

/// Per-symbol edge-detection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvalState {
    /// Side of the EMA the price closed on.
    Trend(OrderSide),
    /// Bollinger zone the price closed in.
    Reversion(BandZone),
}

/// Evaluates the configured strategy for each symbol over its rolling
/// history window.
#[derive(Debug, Default)]
pub struct SignalEngine {
    state: HashMap<String, EvalState>,
}

impl SignalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one symbol against its current window.
    ///
    /// Insufficient history yields `Hold`, never an error.
    pub fn evaluate(&mut self, symbol: &str, params: &StrategyParams, window: &[Bar]) -> Signal {
        let signal = match params {
            StrategyParams::TrendFollowing {
                ema_window,
                adx_window,
                adx_threshold,
            } => self.evaluate_trend(symbol, window, *ema_window, *adx_window, *adx_threshold),
            StrategyParams::MeanReversion {
                window: period,
                num_std_dev,
            } => self.evaluate_reversion(symbol, window, *period, *num_std_dev),
        };

        if signal != Signal::Hold {
            debug!(
                symbol = %symbol,
                strategy = params.name(),
                signal = ?signal,
                "Strategy signal"
            );
        }

        signal
    }

    fn evaluate_trend(
        &mut self,
        symbol: &str,
        window: &[Bar],
        ema_window: usize,
        adx_window: usize,
        adx_threshold: f64,
    ) -> Signal {
        let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
        let highs: Vec<f64> = window.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = window.iter().map(|b| b.low).collect();

        let Ok(ema) = indicators::ema(&closes, ema_window) else {
            return Signal::Hold;
        };
        let Ok(adx) = indicators::adx(&highs, &lows, &closes, adx_window) else {
            return Signal::Hold;
        };

        let latest = match closes.last() {
            Some(price) => *price,
            None => return Signal::Hold,
        };

        let side = if latest > ema {
            OrderSide::Buy
        } else if latest < ema {
            OrderSide::Sell
        } else {
            return Signal::Hold;
        };

        // The crossover is consumed whether or not ADX confirms it; a
        // direction change during a weak trend does not fire later when the
        // trend strengthens on the same side.
        let previous = self
            .state
            .insert(symbol.to_string(), EvalState::Trend(side));
        let crossed = previous != Some(EvalState::Trend(side));

        if crossed && adx > adx_threshold {
            match side {
                OrderSide::Buy => Signal::Buy,
                OrderSide::Sell => Signal::Sell,
            }
        } else {
            Signal::Hold
        }
    }

    fn evaluate_reversion(
        &mut self,
        symbol: &str,
        window: &[Bar],
        period: usize,
        num_std_dev: f64,
    ) -> Signal {
        let closes: Vec<f64> = window.iter().map(|b| b.close).collect();

        let Ok(bands) = indicators::bollinger(&closes, period, num_std_dev) else {
            return Signal::Hold;
        };

        let latest = match closes.last() {
            Some(price) => *price,
            None => return Signal::Hold,
        };

        let zone = if latest < bands.lower {
            BandZone::Below
        } else if latest > bands.upper {
            BandZone::Above
        } else {
            BandZone::Inside
        };

        let previous = self
            .state
            .insert(symbol.to_string(), EvalState::Reversion(zone));

        if previous == Some(EvalState::Reversion(zone)) {
            return Signal::Hold;
        }

        match zone {
            BandZone::Below => Signal::Buy,
            BandZone::Above => Signal::Sell,
            BandZone::Inside => Signal::Hold,
        }
    }
}
