//! Data models for ticks, bars, orders, signals, and positions.

mod bar;
mod order;
mod position;

pub use bar::{Bar, Tick};
pub use order::{Order, OrderSide, OrderStatus, Signal};
pub use position::PositionLedger;
