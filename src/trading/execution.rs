//! Order execution and asynchronous fill reconciliation.
//!
//! Submission happens inline on the tick path; reconciliation runs as a
//! detached task per order so a pending fill never blocks tick processing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::Brokerage;
use crate::models::{Order, OrderSide, OrderStatus, PositionLedger};

/// Active orders keyed by brokerage order id. Orders stay registered until
/// their reconciliation task observes a terminal status.
pub type OrderRegistry = Arc<RwLock<HashMap<String, Order>>>;

pub struct OrderExecutor<B: Brokerage> {
    broker: Arc<B>,
    orders: OrderRegistry,
    ledger: Arc<RwLock<PositionLedger>>,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl<B: Brokerage> OrderExecutor<B> {
    pub fn new(
        broker: Arc<B>,
        ledger: Arc<RwLock<PositionLedger>>,
        poll_interval: Duration,
        max_poll_attempts: u32,
    ) -> Self {
        Self {
            broker,
            orders: Arc::new(RwLock::new(HashMap::new())),
            ledger,
            poll_interval,
            max_poll_attempts,
        }
    }

    pub fn orders(&self) -> OrderRegistry {
        self.orders.clone()
    }

    /// Notional reserved by in-flight buy orders for `symbol`. The risk gate
    /// counts this against the position limit so two concurrent orders
    /// cannot jointly exceed it.
    pub async fn reserved_notional(&self, symbol: &str) -> Decimal {
        self.orders
            .read()
            .await
            .values()
            .filter(|o| o.symbol == symbol && o.side == OrderSide::Buy)
            .map(Order::notional)
            .sum()
    }

    /// Submit a market order and hand it off to a reconciliation task.
    ///
    /// A submission failure terminates this signal's flow; there is no
    /// retry, the next tick's signal starts fresh.
    pub async fn submit(
        &self,
        symbol: &str,
        quantity: Decimal,
        side: OrderSide,
        entry_price: Decimal,
    ) -> Result<()> {
        let client_order_id = Uuid::new_v4().to_string();

        let response = match self
            .broker
            .submit_order(symbol, quantity, side, &client_order_id)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(symbol = %symbol, error = %e, "Order submission failed");
                return Err(e);
            }
        };

        let order = Order {
            id: response.id.clone(),
            client_order_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            entry_price,
            status: OrderStatus::Submitted,
            submitted_at: Utc::now(),
        };

        info!(
            symbol = %symbol,
            order_id = %order.id,
            client_order_id = %order.client_order_id,
            side = %side,
            qty = %quantity,
            price = %entry_price,
            "Order placed"
        );

        self.orders.write().await.insert(order.id.clone(), order.clone());
        self.spawn_reconciler(order);

        Ok(())
    }

    fn spawn_reconciler(&self, order: Order) {
        let broker = self.broker.clone();
        let orders = self.orders.clone();
        let ledger = self.ledger.clone();
        let poll_interval = self.poll_interval;
        let max_attempts = self.max_poll_attempts;

        tokio::spawn(async move {
            reconcile_order(broker, orders, ledger, order, poll_interval, max_attempts).await;
        });
    }
}

/// Poll the brokerage until the order reaches a terminal state, then settle
/// it. The poll budget bounds the loop: an order the venue never resolves is
/// written off as `Stalled` instead of living as an immortal task.
async fn reconcile_order<B: Brokerage>(
    broker: Arc<B>,
    orders: OrderRegistry,
    ledger: Arc<RwLock<PositionLedger>>,
    mut order: Order,
    poll_interval: Duration,
    max_attempts: u32,
) {
    let mut ticker = interval(poll_interval);

    for _ in 0..max_attempts {
        ticker.tick().await;

        let response = match broker.get_order(&order.id).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    order_id = %order.id,
                    symbol = %order.symbol,
                    error = %e,
                    "Order status poll failed, retrying"
                );
                continue;
            }
        };

        match response.lifecycle_status() {
            OrderStatus::Filled => {
                let fill_price = response.filled_avg_price.unwrap_or(order.entry_price);
                // Ledger first, then deregistration: a concurrent gate read
                // between the two can only over-count exposure, never
                // under-count it.
                let notional = {
                    let mut ledger = ledger.write().await;
                    ledger.apply_fill(&order.symbol, order.side, order.quantity, fill_price)
                };
                orders.write().await.remove(&order.id);

                info!(
                    symbol = %order.symbol,
                    order_id = %order.id,
                    fill_price = %fill_price,
                    notional = %notional,
                    "Order filled, position updated"
                );
                return;
            }
            OrderStatus::Canceled => {
                orders.write().await.remove(&order.id);
                warn!(
                    symbol = %order.symbol,
                    order_id = %order.id,
                    "Order canceled, no position change"
                );
                return;
            }
            OrderStatus::PartiallyFilled => {
                if order.status != OrderStatus::PartiallyFilled {
                    debug!(
                        symbol = %order.symbol,
                        order_id = %order.id,
                        filled = ?response.filled_qty,
                        "Order partially filled"
                    );
                }
                order.status = OrderStatus::PartiallyFilled;
                if let Some(tracked) = orders.write().await.get_mut(&order.id) {
                    tracked.status = OrderStatus::PartiallyFilled;
                }
            }
            _ => {}
        }
    }

    order.status = OrderStatus::Stalled;
    orders.write().await.remove(&order.id);
    error!(
        symbol = %order.symbol,
        order_id = %order.id,
        status = ?order.status,
        attempts = max_attempts,
        pending_secs = (Utc::now() - order.submitted_at).num_seconds(),
        "Order reconciliation stalled, giving up"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OrderResponse;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Scripted brokerage: returns canned status responses in sequence and
    /// repeats the last one once the script runs out.
    struct ScriptedBroker {
        statuses: Mutex<Vec<OrderResponse>>,
        submissions: Mutex<u32>,
        polls: Mutex<u32>,
    }

    impl ScriptedBroker {
        fn new(statuses: Vec<OrderResponse>) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses),
                submissions: Mutex::new(0),
                polls: Mutex::new(0),
            })
        }

        fn response(status: &str, qty: Decimal, filled: Decimal) -> OrderResponse {
            OrderResponse {
                id: "ord-1".to_string(),
                client_order_id: String::new(),
                symbol: "MCD".to_string(),
                status: status.to_string(),
                qty: Some(qty),
                filled_qty: Some(filled),
                filled_avg_price: None,
            }
        }
    }

    #[async_trait]
    impl Brokerage for ScriptedBroker {
        async fn submit_order(
            &self,
            symbol: &str,
            qty: Decimal,
            _side: OrderSide,
            client_order_id: &str,
        ) -> anyhow::Result<OrderResponse> {
            *self.submissions.lock().unwrap() += 1;
            Ok(OrderResponse {
                id: "ord-1".to_string(),
                client_order_id: client_order_id.to_string(),
                symbol: symbol.to_string(),
                status: "accepted".to_string(),
                qty: Some(qty),
                filled_qty: Some(Decimal::ZERO),
                filled_avg_price: None,
            })
        }

        async fn get_order(&self, _order_id: &str) -> anyhow::Result<OrderResponse> {
            *self.polls.lock().unwrap() += 1;
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                Ok(statuses.remove(0))
            } else {
                Ok(statuses[0].clone())
            }
        }
    }

    fn executor(broker: Arc<ScriptedBroker>, max_attempts: u32) -> OrderExecutor<ScriptedBroker> {
        OrderExecutor::new(
            broker,
            Arc::new(RwLock::new(PositionLedger::new())),
            Duration::from_millis(5),
            max_attempts,
        )
    }

    async fn wait_for_empty_registry(orders: &OrderRegistry) {
        for _ in 0..200 {
            if orders.read().await.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("reconciliation did not terminate");
    }

    #[tokio::test]
    async fn test_fill_updates_ledger_and_deregisters() {
        let broker = ScriptedBroker::new(vec![ScriptedBroker::response(
            "filled",
            dec!(1),
            dec!(1),
        )]);
        let exec = executor(broker, 10);
        let ledger = exec.ledger.clone();

        exec.submit("MCD", dec!(1), OrderSide::Buy, dec!(100))
            .await
            .unwrap();

        wait_for_empty_registry(&exec.orders()).await;
        assert_eq!(ledger.read().await.notional("MCD"), dec!(100));
    }

    #[tokio::test]
    async fn test_canceled_order_leaves_ledger_untouched() {
        let broker = ScriptedBroker::new(vec![ScriptedBroker::response(
            "canceled",
            dec!(1),
            dec!(0),
        )]);
        let exec = executor(broker.clone(), 10);
        let ledger = exec.ledger.clone();

        exec.submit("MCD", dec!(1), OrderSide::Buy, dec!(100))
            .await
            .unwrap();

        wait_for_empty_registry(&exec.orders()).await;
        assert_eq!(ledger.read().await.notional("MCD"), Decimal::ZERO);
        // Canceled on the first poll: the task must not keep polling.
        assert_eq!(*broker.polls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_partial_fill_then_full_fill() {
        let broker = ScriptedBroker::new(vec![
            ScriptedBroker::response("partially_filled", dec!(2), dec!(1)),
            ScriptedBroker::response("filled", dec!(2), dec!(2)),
        ]);
        let exec = executor(broker, 10);
        let ledger = exec.ledger.clone();

        exec.submit("MCD", dec!(2), OrderSide::Buy, dec!(50))
            .await
            .unwrap();

        wait_for_empty_registry(&exec.orders()).await;
        assert_eq!(ledger.read().await.notional("MCD"), dec!(100));
    }

    #[tokio::test]
    async fn test_stalled_order_gives_up_without_ledger_change() {
        // Never reaches a terminal state.
        let broker = ScriptedBroker::new(vec![ScriptedBroker::response(
            "accepted",
            dec!(1),
            dec!(0),
        )]);
        let exec = executor(broker.clone(), 5);
        let ledger = exec.ledger.clone();

        exec.submit("MCD", dec!(1), OrderSide::Buy, dec!(100))
            .await
            .unwrap();

        wait_for_empty_registry(&exec.orders()).await;
        assert_eq!(ledger.read().await.notional("MCD"), Decimal::ZERO);
        assert_eq!(*broker.polls.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_reserved_notional_tracks_open_buys() {
        // Order stays open long enough to observe the reservation.
        let broker = ScriptedBroker::new(vec![ScriptedBroker::response(
            "accepted",
            dec!(1),
            dec!(0),
        )]);
        let exec = OrderExecutor::new(
            broker,
            Arc::new(RwLock::new(PositionLedger::new())),
            Duration::from_secs(60),
            2,
        );

        exec.submit("MCD", dec!(2), OrderSide::Buy, dec!(300))
            .await
            .unwrap();

        assert_eq!(exec.reserved_notional("MCD").await, dec!(600));
        assert_eq!(exec.reserved_notional("KO").await, Decimal::ZERO);
    }
}
