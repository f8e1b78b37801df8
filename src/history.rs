//! Rolling per-symbol bar history with bounded capacity.

use std::collections::HashMap;

use crate::models::Bar;

/// Bounded FIFO sequence of bars for one symbol.
///
/// Invariant: length never exceeds capacity; the oldest bar is evicted on
/// overflow.
#[derive(Debug)]
struct SymbolHistory {
    bars: Vec<Bar>,
    capacity: usize,
}

impl SymbolHistory {
    fn new(capacity: usize) -> Self {
        Self {
            bars: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    fn append(&mut self, bar: Bar) {
        if self.bars.len() >= self.capacity {
            self.bars.remove(0);
        }
        self.bars.push(bar);
    }
}

/// Per-symbol bounded bar histories. Capacities are fixed at configuration
/// time; ticks for unconfigured symbols are ignored.
#[derive(Debug)]
pub struct RollingHistory {
    histories: HashMap<String, SymbolHistory>,
}

impl RollingHistory {
    pub fn new(capacities: HashMap<String, usize>) -> Self {
        let histories = capacities
            .into_iter()
            .map(|(symbol, capacity)| (symbol, SymbolHistory::new(capacity)))
            .collect();

        Self { histories }
    }

    /// Append a bar, evicting the oldest entry once the window is full.
    pub fn append(&mut self, symbol: &str, bar: Bar) {
        if let Some(history) = self.histories.get_mut(symbol) {
            history.append(bar);
        }
    }

    /// Read-only view of the current window, oldest bar first.
    pub fn window(&self, symbol: &str) -> &[Bar] {
        self.histories
            .get(symbol)
            .map(|h| h.bars.as_slice())
            .unwrap_or(&[])
    }

    pub fn capacity(&self, symbol: &str) -> Option<usize> {
        self.histories.get(symbol).map(|h| h.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(close: f64) -> Bar {
        Bar {
            timestamp: Utc::now(),
            close,
            high: close,
            low: close,
        }
    }

    fn history(symbol: &str, capacity: usize) -> RollingHistory {
        RollingHistory::new(HashMap::from([(symbol.to_string(), capacity)]))
    }

    #[test]
    fn test_window_grows_until_capacity() {
        let mut history = history("MCD", 3);

        history.append("MCD", bar(1.0));
        history.append("MCD", bar(2.0));
        assert_eq!(history.window("MCD").len(), 2);
    }

    #[test]
    fn test_oldest_bar_evicted_on_overflow() {
        let mut history = history("MCD", 3);

        for close in [1.0, 2.0, 3.0, 4.0] {
            history.append("MCD", bar(close));
        }

        let window = history.window("MCD");
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].close, 2.0);
        assert_eq!(window[2].close, 4.0);
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut history = history("KO", 10);

        for i in 0..500 {
            history.append("KO", bar(i as f64));
            assert!(history.window("KO").len() <= 10);
        }
    }

    #[test]
    fn test_unconfigured_symbol_is_ignored() {
        let mut history = history("MCD", 3);

        history.append("TSLA", bar(1.0));
        assert!(history.window("TSLA").is_empty());
        assert!(history.capacity("TSLA").is_none());
    }
}
