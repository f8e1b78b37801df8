//! Order lifecycle types and strategy signals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a submitted order.
///
/// `Stalled` is reached when reconciliation exhausts its poll budget without
/// observing a terminal state from the brokerage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Stalled,
}

/// Directional signal produced by a strategy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// The order side this signal maps to, if it is actionable.
    pub fn side(&self) -> Option<OrderSide> {
        match self {
            Signal::Buy => Some(OrderSide::Buy),
            Signal::Sell => Some(OrderSide::Sell),
            Signal::Hold => None,
        }
    }
}

/// An order tracked in the active registry, from submission until its
/// reconciliation task observes a terminal status.
#[derive(Debug, Clone)]
pub struct Order {
    /// Brokerage-assigned order id.
    pub id: String,
    /// Idempotency id we generated at submission time.
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub status: OrderStatus,
    pub submitted_at: DateTime<Utc>,
}

impl Order {
    /// Dollar value this order represents at its entry price.
    pub fn notional(&self) -> Decimal {
        self.quantity * self.entry_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signal_side() {
        assert_eq!(Signal::Buy.side(), Some(OrderSide::Buy));
        assert_eq!(Signal::Sell.side(), Some(OrderSide::Sell));
        assert_eq!(Signal::Hold.side(), None);
    }

    #[test]
    fn test_order_notional() {
        let order = Order {
            id: "ord-1".to_string(),
            client_order_id: "c-1".to_string(),
            symbol: "KO".to_string(),
            side: OrderSide::Buy,
            quantity: dec!(3),
            entry_price: dec!(62.50),
            status: OrderStatus::Submitted,
            submitted_at: Utc::now(),
        };

        assert_eq!(order.notional(), dec!(187.50));
    }
}
