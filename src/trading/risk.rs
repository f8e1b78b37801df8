//! Pre-trade risk gate: market data validation, VaR and exposure limits.

use std::fmt;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::indicators;
use crate::models::Bar;

use super::config::RiskLimits;

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Allow,
    Reject(RejectReason),
}

/// Why an order was refused, one variant per check.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    InvalidMarketData {
        price: f64,
    },
    VarNotComputable {
        samples: usize,
    },
    VarLimitExceeded {
        var_value: Decimal,
        limit: Decimal,
    },
    PositionLimitExceeded {
        current: Decimal,
        proposed: Decimal,
        limit: Decimal,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidMarketData { price } => {
                write!(f, "invalid market data: price {price}")
            }
            RejectReason::VarNotComputable { samples } => {
                write!(f, "insufficient data for VaR: {samples} samples")
            }
            RejectReason::VarLimitExceeded { var_value, limit } => {
                write!(f, "VaR {var_value} exceeds risk threshold {limit}")
            }
            RejectReason::PositionLimitExceeded {
                current,
                proposed,
                limit,
            } => {
                write!(
                    f,
                    "position size {current} + {proposed} exceeds maximum {limit}"
                )
            }
        }
    }
}

/// Sequential pre-trade checks, short-circuiting on the first failure.
///
/// The gate reads position state but never mutates it.
pub struct RiskGate {
    limits: RiskLimits,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Price sanity check, also applied before any signal evaluation so bad
    /// ticks never reach the history.
    pub fn validate_market_data(&self, price: f64) -> bool {
        price.is_finite() && price > 0.0
    }

    /// Run the full check sequence for a proposed order.
    ///
    /// `current_notional` must already include notional reserved by in-flight
    /// orders, so concurrent submissions cannot jointly exceed the limit.
    pub fn evaluate(
        &self,
        window: &[Bar],
        price: f64,
        quantity: Decimal,
        current_notional: Decimal,
    ) -> GateDecision {
        if !self.validate_market_data(price) {
            return GateDecision::Reject(RejectReason::InvalidMarketData { price });
        }

        let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
        let Some(var_value) =
            indicators::historical_var(&closes, self.limits.var_confidence_level)
        else {
            return GateDecision::Reject(RejectReason::VarNotComputable {
                samples: window.len(),
            });
        };

        // A VaR the Decimal type cannot represent is treated as unbounded risk.
        let var_value = Decimal::from_f64(var_value).unwrap_or(Decimal::MAX);
        if var_value > self.limits.max_position_size {
            return GateDecision::Reject(RejectReason::VarLimitExceeded {
                var_value,
                limit: self.limits.max_position_size,
            });
        }

        let price_dec = Decimal::from_f64(price).unwrap_or(Decimal::MAX);
        let proposed = quantity * price_dec;
        if current_notional + proposed > self.limits.max_position_size {
            return GateDecision::Reject(RejectReason::PositionLimitExceeded {
                current: current_notional,
                proposed,
                limit: self.limits.max_position_size,
            });
        }

        GateDecision::Allow
    }
}
