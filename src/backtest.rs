//! Offline backtesting and brute-force parameter search over stored bars.
//!
//! Batch counterpart to the live engine: replays 15-minute resampled bars
//! through the same indicator and signal code with a long-only all-in book.
//! Single-threaded by design.

use chrono::{DateTime, Duration, DurationRound, Utc};
use tracing::debug;

use crate::db::BarRow;
use crate::models::{Bar, Signal};
use crate::trading::{SignalEngine, StrategyParams};

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// Starting cash for each run
    pub initial_cash: f64,

    /// Commission per trade, as a fraction of traded value
    pub commission: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_cash: 10_000.0,
            commission: 0.002,
        }
    }
}

/// Result of one parameterized run.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub symbol: String,
    pub params: StrategyParams,
    pub trades: u32,
    pub final_equity: f64,
    pub return_pct: f64,
}

pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    /// Aggregate minute rows into 15-minute buckets: high is the bucket
    /// maximum, low the minimum, close the last minute's close. Rows with
    /// unparseable timestamps are skipped.
    pub fn resample_15min(rows: &[BarRow]) -> Vec<Bar> {
        let mut bars: Vec<Bar> = Vec::new();
        let mut current: Option<(DateTime<Utc>, Bar)> = None;

        for row in rows {
            let Ok(ts) = row.parsed_timestamp() else {
                continue;
            };
            let Ok(bucket) = ts.duration_trunc(Duration::minutes(15)) else {
                continue;
            };

            match &mut current {
                Some((key, bar)) if *key == bucket => {
                    bar.high = bar.high.max(row.high);
                    bar.low = bar.low.min(row.low);
                    bar.close = row.close;
                }
                _ => {
                    if let Some((_, finished)) = current.take() {
                        bars.push(finished);
                    }
                    current = Some((
                        bucket,
                        Bar {
                            timestamp: bucket,
                            close: row.close,
                            high: row.high,
                            low: row.low,
                        },
                    ));
                }
            }
        }

        if let Some((_, finished)) = current.take() {
            bars.push(finished);
        }

        bars
    }

    /// Replay one parameterization over a bar series. Buys go all-in, sells
    /// flatten the book; signals come from the same engine the live pipeline
    /// uses.
    pub fn run(&self, symbol: &str, params: &StrategyParams, bars: &[Bar]) -> BacktestReport {
        let capacity = params.lookback().max(2);
        let mut signals = SignalEngine::new();
        let mut window: Vec<Bar> = Vec::with_capacity(capacity);

        let mut cash = self.config.initial_cash;
        let mut shares = 0.0f64;
        let mut trades = 0u32;

        for bar in bars {
            if window.len() >= capacity {
                window.remove(0);
            }
            window.push(*bar);

            match signals.evaluate(symbol, params, &window) {
                Signal::Buy if shares == 0.0 && bar.close > 0.0 => {
                    shares = cash * (1.0 - self.config.commission) / bar.close;
                    cash = 0.0;
                    trades += 1;
                }
                Signal::Sell if shares > 0.0 => {
                    cash = shares * bar.close * (1.0 - self.config.commission);
                    shares = 0.0;
                    trades += 1;
                }
                _ => {}
            }
        }

        let last_close = bars.last().map(|b| b.close).unwrap_or(0.0);
        let final_equity = cash + shares * last_close;
        let return_pct = (final_equity - self.config.initial_cash) / self.config.initial_cash * 100.0;

        BacktestReport {
            symbol: symbol.to_string(),
            params: params.clone(),
            trades,
            final_equity,
            return_pct,
        }
    }

    /// Brute-force the trend-following grid and keep the best run by return.
    pub fn optimize_trend(&self, symbol: &str, bars: &[Bar]) -> Option<BacktestReport> {
        let mut best: Option<BacktestReport> = None;

        for ema_window in (10..50).step_by(5) {
            for adx_window in (10..30).step_by(5) {
                for adx_threshold in (20..40).step_by(5) {
                    let params = StrategyParams::TrendFollowing {
                        ema_window,
                        adx_window,
                        adx_threshold: adx_threshold as f64,
                    };
                    let report = self.run(symbol, &params, bars);
                    debug!(
                        symbol = %symbol,
                        ?params,
                        return_pct = report.return_pct,
                        "Trend grid point"
                    );
                    if best
                        .as_ref()
                        .map_or(true, |b| report.return_pct > b.return_pct)
                    {
                        best = Some(report);
                    }
                }
            }
        }

        best
    }

    /// Brute-force the mean-reversion grid and keep the best run by return.
    pub fn optimize_mean_reversion(&self, symbol: &str, bars: &[Bar]) -> Option<BacktestReport> {
        let mut best: Option<BacktestReport> = None;

        for window in (10..50).step_by(5) {
            for num_std_dev in 1..=3 {
                let params = StrategyParams::MeanReversion {
                    window,
                    num_std_dev: num_std_dev as f64,
                };
                let report = self.run(symbol, &params, bars);
                debug!(
                    symbol = %symbol,
                    ?params,
                    return_pct = report.return_pct,
                    "Mean-reversion grid point"
                );
                if best
                    .as_ref()
                    .map_or(true, |b| report.return_pct > b.return_pct)
                {
                    best = Some(report);
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(hour: u32, minute: u32, close: f64) -> BarRow {
        BarRow {
            timestamp: Utc
                .with_ymd_and_hms(2023, 5, 15, hour, minute, 0)
                .unwrap()
                .to_rfc3339(),
            symbol: "MCD".to_string(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100,
        }
    }

    fn flat_bar(close: f64) -> Bar {
        Bar {
            timestamp: Utc::now(),
            close,
            high: close,
            low: close,
        }
    }

    #[test]
    fn test_resample_aggregates_buckets() {
        let mut rows: Vec<BarRow> = (0..15).map(|m| row(9, 30 + m, 100.0 + m as f64)).collect();
        rows.push(row(9, 45, 200.0));

        let bars = Backtester::resample_15min(&rows);
        assert_eq!(bars.len(), 2);

        // First bucket covers 9:30-9:44.
        assert_eq!(bars[0].close, 114.0);
        assert_eq!(bars[0].high, 115.0);
        assert_eq!(bars[0].low, 99.0);

        assert_eq!(bars[1].close, 200.0);
    }

    #[test]
    fn test_run_with_too_little_history_trades_nothing() {
        let backtester = Backtester::new(BacktestConfig::default());
        let params = StrategyParams::MeanReversion {
            window: 15,
            num_std_dev: 2.0,
        };
        let bars: Vec<Bar> = (0..5).map(|_| flat_bar(100.0)).collect();

        let report = backtester.run("MCD", &params, &bars);
        assert_eq!(report.trades, 0);
        assert_eq!(report.final_equity, backtester.config.initial_cash);
    }

    #[test]
    fn test_run_mean_reversion_round_trip() {
        let backtester = Backtester::new(BacktestConfig::default());
        let params = StrategyParams::MeanReversion {
            window: 15,
            num_std_dev: 2.0,
        };

        let mut closes = vec![100.0; 20];
        closes.push(80.0); // breaks the lower band: buy
        closes.push(120.0); // breaks the upper band: sell
        let bars: Vec<Bar> = closes.into_iter().map(flat_bar).collect();

        let report = backtester.run("PEP", &params, &bars);
        assert_eq!(report.trades, 2);
        assert!(report.final_equity > backtester.config.initial_cash);
        assert!(report.return_pct > 0.0);
    }

    #[test]
    fn test_optimize_returns_best_grid_point() {
        let backtester = Backtester::new(BacktestConfig::default());
        let bars: Vec<Bar> = (1..=200).map(|i| flat_bar(i as f64)).collect();

        let trend = backtester.optimize_trend("MCD", &bars);
        assert!(trend.is_some());

        let reversion = backtester.optimize_mean_reversion("MCD", &bars);
        assert!(reversion.is_some());
    }
}
