//! Live trading engine: drives the per-tick decision pipeline.
//!
//! Tick flow: validate → history append → strategy signal → risk gate →
//! order submission. Fill reconciliation runs detached per order and settles
//! into the shared position ledger.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::api::Brokerage;
use crate::history::RollingHistory;
use crate::models::{Bar, PositionLedger, Tick};
use crate::trading::{GateDecision, OrderExecutor, RiskGate, SignalEngine, TradingConfig};

/// Owns the shared pipeline state and wires the components together.
/// Everything mutable lives here and is passed explicitly, never as
/// ambient globals.
pub struct Engine<B: Brokerage> {
    config: TradingConfig,
    history: RollingHistory,
    signals: SignalEngine,
    gate: RiskGate,
    executor: OrderExecutor<B>,
    ledger: Arc<RwLock<PositionLedger>>,
}

impl<B: Brokerage> Engine<B> {
    pub fn new(config: TradingConfig, broker: Arc<B>) -> Self {
        let ledger = Arc::new(RwLock::new(PositionLedger::new()));
        let history = RollingHistory::new(config.history_capacities());
        let executor = OrderExecutor::new(
            broker,
            ledger.clone(),
            Duration::from_secs(config.reconcile_interval_secs),
            config.max_poll_attempts,
        );
        let gate = RiskGate::new(config.risk.clone());

        Self {
            config,
            history,
            signals: SignalEngine::new(),
            gate,
            executor,
            ledger,
        }
    }

    pub fn ledger(&self) -> Arc<RwLock<PositionLedger>> {
        self.ledger.clone()
    }

    /// Consume ticks until the channel closes. Each tick runs synchronously
    /// through order submission, preserving per-symbol arrival order;
    /// reconciliation tasks interleave at await points.
    pub async fn run(&mut self, mut ticks: mpsc::Receiver<Tick>) {
        info!(symbols = ?self.config.symbols(), "Engine started");

        while let Some(tick) = ticks.recv().await {
            self.on_tick(tick).await;
        }

        let ledger = self.ledger.read().await;
        for (symbol, notional) in ledger.open_symbols() {
            info!(symbol = %symbol, notional = %notional, "Open position at shutdown");
        }

        info!("Tick stream ended, engine stopping");
    }

    /// One pass through the pipeline. Failures are logged and never abort
    /// the loop.
    pub async fn on_tick(&mut self, tick: Tick) {
        let Some(params) = self.config.strategies.get(&tick.symbol) else {
            debug!(symbol = %tick.symbol, "Tick for unconfigured symbol");
            return;
        };

        // Bad ticks are discarded before they can reach the history.
        if !self.gate.validate_market_data(tick.price) {
            warn!(
                symbol = %tick.symbol,
                price = tick.price,
                "Invalid market data, tick discarded"
            );
            return;
        }

        self.history.append(&tick.symbol, Bar::from_tick(&tick));
        let window = self.history.window(&tick.symbol);

        let signal = self.signals.evaluate(&tick.symbol, params, window);
        let Some(side) = signal.side() else {
            return;
        };

        let Some(price) = Decimal::from_f64(tick.price) else {
            warn!(
                symbol = %tick.symbol,
                price = tick.price,
                "Price not representable, tick discarded"
            );
            return;
        };

        let quantity = self.config.order_qty;
        let held = self.ledger.read().await.notional(&tick.symbol);
        let reserved = self.executor.reserved_notional(&tick.symbol).await;

        match self
            .gate
            .evaluate(window, tick.price, quantity, held + reserved)
        {
            GateDecision::Allow => {
                // Submission errors are logged inside the executor; this
                // signal's flow simply ends here and the next tick starts
                // fresh.
                let _ = self
                    .executor
                    .submit(&tick.symbol, quantity, side, price)
                    .await;
            }
            GateDecision::Reject(reason) => {
                warn!(symbol = %tick.symbol, %reason, "Order rejected by risk gate");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OrderResponse;
    use crate::trading::StrategyParams;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fills every order on the first reconciliation poll.
    #[derive(Default)]
    struct InstantFillBroker {
        submissions: AtomicU32,
        last_order: Mutex<Option<(String, Decimal)>>,
    }

    #[async_trait]
    impl Brokerage for InstantFillBroker {
        async fn submit_order(
            &self,
            symbol: &str,
            qty: Decimal,
            _side: crate::models::OrderSide,
            client_order_id: &str,
        ) -> anyhow::Result<OrderResponse> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            *self.last_order.lock().unwrap() = Some((symbol.to_string(), qty));
            Ok(OrderResponse {
                id: format!("ord-{}", client_order_id),
                client_order_id: client_order_id.to_string(),
                symbol: symbol.to_string(),
                status: "accepted".to_string(),
                qty: Some(qty),
                filled_qty: Some(Decimal::ZERO),
                filled_avg_price: None,
            })
        }

        async fn get_order(&self, order_id: &str) -> anyhow::Result<OrderResponse> {
            let (symbol, qty) = self
                .last_order
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(("MCD".to_string(), dec!(1)));
            Ok(OrderResponse {
                id: order_id.to_string(),
                client_order_id: String::new(),
                symbol,
                status: "filled".to_string(),
                qty: Some(qty),
                filled_qty: Some(qty),
                filled_avg_price: None,
            })
        }
    }

    fn reversion_config() -> TradingConfig {
        TradingConfig {
            strategies: HashMap::from([(
                "PEP".to_string(),
                StrategyParams::MeanReversion {
                    window: 15,
                    num_std_dev: 2.0,
                },
            )]),
            ..TradingConfig::default()
        }
    }

    fn tick(symbol: &str, price: f64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_invalid_ticks_never_reach_history_or_broker() {
        let broker = Arc::new(InstantFillBroker::default());
        let mut engine = Engine::new(reversion_config(), broker.clone());

        for price in [0.0, -1.0, f64::NAN] {
            engine.on_tick(tick("PEP", price)).await;
        }

        assert!(engine.history.window("PEP").is_empty());
        assert_eq!(broker.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_symbol_is_ignored() {
        let broker = Arc::new(InstantFillBroker::default());
        let mut engine = Engine::new(reversion_config(), broker.clone());

        engine.on_tick(tick("TSLA", 200.0)).await;

        assert!(engine.history.window("TSLA").is_empty());
        assert_eq!(broker.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_band_break_flows_through_to_fill() {
        let broker = Arc::new(InstantFillBroker::default());
        let mut engine = Engine::new(reversion_config(), broker.clone());

        // Enough flat history for VaR, then a sharp drop through the band.
        for _ in 0..120 {
            engine.on_tick(tick("PEP", 100.0)).await;
        }
        assert_eq!(broker.submissions.load(Ordering::SeqCst), 0);

        engine.on_tick(tick("PEP", 80.0)).await;
        assert_eq!(broker.submissions.load(Ordering::SeqCst), 1);

        // Reconciliation settles the fill into the ledger.
        let ledger = engine.ledger();
        for _ in 0..200 {
            if ledger.read().await.notional("PEP") > Decimal::ZERO {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ledger.read().await.notional("PEP"), dec!(80));
    }

    #[tokio::test]
    async fn test_insufficient_var_history_blocks_orders() {
        let broker = Arc::new(InstantFillBroker::default());
        let mut engine = Engine::new(reversion_config(), broker.clone());

        // Band break arrives before the VaR floor is met: signal fires but
        // the gate rejects it.
        for _ in 0..50 {
            engine.on_tick(tick("PEP", 100.0)).await;
        }
        engine.on_tick(tick("PEP", 80.0)).await;

        assert_eq!(broker.submissions.load(Ordering::SeqCst), 0);
    }
}
