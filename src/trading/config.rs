//! Strategy and risk configuration.
//!
//! Parameters are fixed at startup; there is no hot reload.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::indicators::VAR_MIN_SAMPLES;

/// Per-symbol strategy selection and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyParams {
    /// EMA trend entries filtered by ADX trend strength.
    TrendFollowing {
        ema_window: usize,
        adx_window: usize,
        adx_threshold: f64,
    },

    /// Bollinger Band mean reversion.
    MeanReversion { window: usize, num_std_dev: f64 },
}

impl StrategyParams {
    /// Longest history any indicator of this strategy needs.
    pub fn lookback(&self) -> usize {
        match self {
            StrategyParams::TrendFollowing {
                ema_window,
                adx_window,
                ..
            } => (*ema_window).max(2 * *adx_window + 1),
            StrategyParams::MeanReversion { window, .. } => *window,
        }
    }

    /// History capacity for a symbol running this strategy: the strategy
    /// lookback, floored so historical VaR can become computable at all.
    pub fn history_capacity(&self) -> usize {
        self.lookback().max(VAR_MIN_SAMPLES)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyParams::TrendFollowing { .. } => "trend_following",
            StrategyParams::MeanReversion { .. } => "mean_reversion",
        }
    }
}

/// Process-wide risk limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum dollars at risk in any one position
    pub max_position_size: Decimal,

    /// Stop loss below the entry price (0.0 to 1.0)
    pub stop_loss_pct: Decimal,

    /// Take profit above the entry price (0.0 to 1.0)
    pub take_profit_pct: Decimal,

    /// Confidence level for the historical VaR calculation
    pub var_confidence_level: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: dec!(10000),
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.05),
            var_confidence_level: 0.95,
        }
    }
}

/// Full trading configuration: one strategy per instrument, process-wide
/// risk limits, and the pipeline tunables.
#[derive(Debug, Clone)]
pub struct TradingConfig {
    /// Strategy assignment per symbol
    pub strategies: HashMap<String, StrategyParams>,

    /// Risk limits shared by every symbol
    pub risk: RiskLimits,

    /// Shares per order
    pub order_qty: Decimal,

    /// Seconds between reconciliation polls for an open order
    pub reconcile_interval_secs: u64,

    /// Reconciliation polls before an order is written off as stalled
    pub max_poll_attempts: u32,

    /// Bounded tick queue depth between the stream and the engine
    pub tick_queue_depth: usize,
}

impl Default for TradingConfig {
    fn default() -> Self {
        let strategies = HashMap::from([
            (
                "MCD".to_string(),
                StrategyParams::TrendFollowing {
                    ema_window: 40,
                    adx_window: 10,
                    adx_threshold: 25.0,
                },
            ),
            (
                "KO".to_string(),
                StrategyParams::TrendFollowing {
                    ema_window: 25,
                    adx_window: 20,
                    adx_threshold: 35.0,
                },
            ),
            (
                "PEP".to_string(),
                StrategyParams::MeanReversion {
                    window: 15,
                    num_std_dev: 3.0,
                },
            ),
        ]);

        Self {
            strategies,
            risk: RiskLimits::default(),
            order_qty: dec!(1),
            reconcile_interval_secs: 1,
            max_poll_attempts: 300,
            tick_queue_depth: 1024,
        }
    }
}

impl TradingConfig {
    /// Configured symbols, sorted for stable logging and subscriptions.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.strategies.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// History capacity per symbol, derived from its strategy.
    pub fn history_capacities(&self) -> HashMap<String, usize> {
        self.strategies
            .iter()
            .map(|(symbol, params)| (symbol.clone(), params.history_capacity()))
            .collect()
    }
}
