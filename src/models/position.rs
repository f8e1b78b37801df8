//! Position ledger: per-symbol notional exposure.

use std::collections::HashMap;

use rust_decimal::Decimal;

use super::OrderSide;

/// Dollar exposure per symbol, mutated only by fill reconciliation.
///
/// Invariant: notional exposure never goes negative. Sell fills that exceed
/// the current exposure clamp it at zero.
#[derive(Debug, Default)]
pub struct PositionLedger {
    notionals: HashMap<String, Decimal>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current notional exposure for a symbol (zero if it has never traded).
    pub fn notional(&self, symbol: &str) -> Decimal {
        self.notionals
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Apply a terminal fill and return the updated notional.
    pub fn apply_fill(
        &mut self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Decimal {
        let entry = self
            .notionals
            .entry(symbol.to_string())
            .or_insert(Decimal::ZERO);
        let delta = quantity * price;

        *entry = match side {
            OrderSide::Buy => *entry + delta,
            OrderSide::Sell => (*entry - delta).max(Decimal::ZERO),
        };

        *entry
    }

    /// Symbols with non-zero exposure, for status reporting.
    pub fn open_symbols(&self) -> Vec<(&str, Decimal)> {
        self.notionals
            .iter()
            .filter(|(_, n)| !n.is_zero())
            .map(|(s, n)| (s.as_str(), *n))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buy_sell_round_trip() {
        let mut ledger = PositionLedger::new();
        let before = ledger.notional("MCD");

        ledger.apply_fill("MCD", OrderSide::Buy, dec!(1), dec!(100));
        assert_eq!(ledger.notional("MCD"), dec!(100));

        ledger.apply_fill("MCD", OrderSide::Sell, dec!(1), dec!(100));
        assert_eq!(ledger.notional("MCD"), before);
    }

    #[test]
    fn test_sell_clamps_at_zero() {
        let mut ledger = PositionLedger::new();

        ledger.apply_fill("KO", OrderSide::Buy, dec!(1), dec!(60));
        ledger.apply_fill("KO", OrderSide::Sell, dec!(5), dec!(60));

        assert_eq!(ledger.notional("KO"), Decimal::ZERO);
    }

    #[test]
    fn test_sell_with_no_position_stays_zero() {
        let mut ledger = PositionLedger::new();

        ledger.apply_fill("PEP", OrderSide::Sell, dec!(2), dec!(170));
        assert_eq!(ledger.notional("PEP"), Decimal::ZERO);
    }

    #[test]
    fn test_notional_never_negative_over_sequence() {
        let mut ledger = PositionLedger::new();
        let fills = [
            (OrderSide::Buy, dec!(1), dec!(100)),
            (OrderSide::Sell, dec!(3), dec!(100)),
            (OrderSide::Buy, dec!(2), dec!(50)),
            (OrderSide::Sell, dec!(1), dec!(500)),
            (OrderSide::Buy, dec!(1), dec!(75)),
        ];

        for (side, qty, price) in fills {
            let notional = ledger.apply_fill("MCD", side, qty, price);
            assert!(notional >= Decimal::ZERO);
        }
    }

    #[test]
    fn test_open_symbols_skips_flat_positions() {
        let mut ledger = PositionLedger::new();
        ledger.apply_fill("MCD", OrderSide::Buy, dec!(1), dec!(100));
        ledger.apply_fill("KO", OrderSide::Buy, dec!(1), dec!(60));
        ledger.apply_fill("KO", OrderSide::Sell, dec!(1), dec!(60));

        let open = ledger.open_symbols();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].0, "MCD");
    }
}
