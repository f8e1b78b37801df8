//! Technical indicators computed over a history window.
//!
//! Every function here is pure: it takes a slice of samples and returns a
//! value, with no state retained between calls. Callers own the windowing.

use statrs::statistics::Statistics;
use thiserror::Error;

/// Minimum number of closes before historical VaR is considered computable.
pub const VAR_MIN_SAMPLES: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum IndicatorError {
    #[error("{name} requires at least {required} samples (got {got})")]
    InsufficientData {
        name: &'static str,
        required: usize,
        got: usize,
    },
}

/// Exponential moving average over the full series, seeded with the simple
/// average of the first `period` samples.
pub fn ema(closes: &[f64], period: usize) -> Result<f64, IndicatorError> {
    if period == 0 || closes.len() < period {
        return Err(IndicatorError::InsufficientData {
            name: "EMA",
            required: period.max(1),
            got: closes.len(),
        });
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut value = closes[..period].iter().sum::<f64>() / period as f64;
    for close in &closes[period..] {
        value = alpha * close + (1.0 - alpha) * value;
    }

    Ok(value)
}

/// Average Directional Index with Wilder smoothing.
///
/// Needs `2 * period + 1` samples: `period` true ranges to seed the smoothed
/// sums plus `period` DX values to seed the ADX itself.
pub fn adx(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
) -> Result<f64, IndicatorError> {
    let n = closes.len();
    let required = 2 * period.max(1) + 1;
    if period == 0 || n < required || highs.len() != n || lows.len() != n {
        return Err(IndicatorError::InsufficientData {
            name: "ADX",
            required,
            got: n.min(highs.len()).min(lows.len()),
        });
    }

    let p = period as f64;
    let mut tr = Vec::with_capacity(n - 1);
    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);

    for i in 1..n {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });

        let range = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
        tr.push(range);
    }

    let mut atr: f64 = tr[..period].iter().sum();
    let mut plus: f64 = plus_dm[..period].iter().sum();
    let mut minus: f64 = minus_dm[..period].iter().sum();

    let mut dxs = Vec::with_capacity(tr.len() - period + 1);
    dxs.push(dx_value(plus, minus, atr));
    for i in period..tr.len() {
        atr = atr - atr / p + tr[i];
        plus = plus - plus / p + plus_dm[i];
        minus = minus - minus / p + minus_dm[i];
        dxs.push(dx_value(plus, minus, atr));
    }

    let mut adx = dxs[..period].iter().sum::<f64>() / p;
    for dx in &dxs[period..] {
        adx = (adx * (p - 1.0) + dx) / p;
    }

    Ok(adx)
}

fn dx_value(plus: f64, minus: f64, atr: f64) -> f64 {
    // A dead-flat window has zero true range; treat it as no directional
    // movement rather than dividing by zero.
    if atr <= 0.0 {
        return 0.0;
    }
    let di_plus = 100.0 * plus / atr;
    let di_minus = 100.0 * minus / atr;
    let sum = di_plus + di_minus;
    if sum == 0.0 {
        0.0
    } else {
        100.0 * (di_plus - di_minus).abs() / sum
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger Bands over the most recent `period` closes: simple moving
/// average plus/minus `num_std_dev` population standard deviations.
pub fn bollinger(
    closes: &[f64],
    period: usize,
    num_std_dev: f64,
) -> Result<BollingerBands, IndicatorError> {
    if period == 0 || closes.len() < period {
        return Err(IndicatorError::InsufficientData {
            name: "Bollinger Bands",
            required: period.max(1),
            got: closes.len(),
        });
    }

    let window = &closes[closes.len() - period..];
    let middle = window.mean();
    let band = num_std_dev * window.population_std_dev();

    Ok(BollingerBands {
        upper: middle + band,
        middle,
        lower: middle - band,
    })
}

/// Historical Value-at-Risk as a monetary amount.
///
/// Computes log returns over the series, takes the `(1 - confidence)`
/// quantile, and converts it to dollars at the latest price. Soft-fails to
/// `None` below [`VAR_MIN_SAMPLES`] closes so the risk gate can degrade to
/// "no trade" instead of aborting the pipeline.
pub fn historical_var(closes: &[f64], confidence_level: f64) -> Option<f64> {
    if closes.len() < VAR_MIN_SAMPLES {
        return None;
    }

    let mut returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    returns.sort_by(|a, b| a.total_cmp(b));

    let quantile = percentile(&returns, (1.0 - confidence_level) * 100.0);
    let last_price = *closes.last()?;

    Some(last_price * quantile.abs())
}

/// Percentile of a sorted series with linear interpolation between the two
/// closest ranks.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let rank = pct.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }

    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}
