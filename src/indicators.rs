//! Technical indicators
//!
//! Slice-in, series-out implementations of the indicators the screener needs.
//! Moving averages go through the `ta` crate; dispersion statistics through
//! `statrs`.

use statrs::statistics::Statistics;
use ta::indicators::SimpleMovingAverage;
use ta::Next;

/// Trading days used to annualize daily volatility
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let sma_val = indicator.next(value);
            (i + 1 >= period).then_some(sma_val)
        })
        .collect()
}

/// Mean of the last `period` values, `None` if there are fewer
pub fn trailing_mean(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Calculate Average True Range as the rolling simple mean of true range
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(high, low, close);
    sma(&tr, period)
}

/// Simple close-to-close returns
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Annualized historical volatility (%) of the last `period` daily returns
///
/// Uses the sample standard deviation. `None` when fewer than two returns are
/// available.
pub fn historical_volatility(closes: &[f64], period: usize) -> Option<f64> {
    if period < 2 || closes.len() < period + 1 {
        return None;
    }
    let returns = simple_returns(&closes[closes.len() - period - 1..]);
    if returns.len() < 2 {
        return None;
    }
    let daily = returns.iter().std_dev();
    daily
        .is_finite()
        .then(|| daily * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}

/// Percent return over the last `horizon` bars
pub fn horizon_return(closes: &[f64], horizon: usize) -> Option<f64> {
    if horizon == 0 || closes.len() <= horizon {
        return None;
    }
    let last = *closes.last()?;
    let base = closes[closes.len() - 1 - horizon];
    if base <= 0.0 {
        return None;
    }
    Some((last / base - 1.0) * 100.0)
}

/// Values that are strictly greater than the `span` neighbours on each side
pub fn pivot_highs(values: &[f64], span: usize) -> Vec<f64> {
    pivots(values, span, |candidate, other| candidate > other)
}

/// Values that are strictly less than the `span` neighbours on each side
pub fn pivot_lows(values: &[f64], span: usize) -> Vec<f64> {
    pivots(values, span, |candidate, other| candidate < other)
}

fn pivots(values: &[f64], span: usize, dominates: impl Fn(f64, f64) -> bool) -> Vec<f64> {
    if span == 0 || values.len() < 2 * span + 1 {
        return Vec::new();
    }

    (span..values.len() - span)
        .filter(|&i| {
            (i - span..=i + span)
                .filter(|&j| j != i)
                .all(|j| dominates(values[i], values[j]))
        })
        .map(|i| values[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_relative_eq!(result[2].unwrap(), 2.0);
        assert_relative_eq!(result[3].unwrap(), 3.0);
        assert_relative_eq!(result[4].unwrap(), 4.0);
    }

    #[test]
    fn test_trailing_mean() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(trailing_mean(&values, 2), Some(3.5));
        assert_eq!(trailing_mean(&values, 5), None);
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let high = vec![10.0, 12.0];
        let low = vec![9.0, 11.5];
        let close = vec![9.5, 12.0];
        let tr = true_range(&high, &low, &close);
        assert_eq!(tr[0], 1.0);
        // gap up: |12 - 9.5| dominates 12 - 11.5
        assert_eq!(tr[1], 2.5);
    }

    #[test]
    fn test_atr_is_mean_of_true_range() {
        let high = vec![11.0, 12.0, 13.0, 14.0];
        let low = vec![10.0, 11.0, 12.0, 13.0];
        let close = vec![10.5, 11.5, 12.5, 13.5];
        let atr_values = atr(&high, &low, &close, 2);
        // true ranges: 1.0, 1.5, 1.5, 1.5
        assert_eq!(atr_values[0], None);
        assert_relative_eq!(atr_values[1].unwrap(), 1.25);
        assert_relative_eq!(atr_values[3].unwrap(), 1.5);
    }

    #[test]
    fn test_historical_volatility_flat_series_is_zero() {
        let closes = vec![100.0; 30];
        assert_relative_eq!(historical_volatility(&closes, 20).unwrap(), 0.0);
        assert!(historical_volatility(&closes[..5], 20).is_none());
    }

    #[test]
    fn test_horizon_return() {
        let closes = vec![100.0, 105.0, 110.0];
        assert_relative_eq!(horizon_return(&closes, 2).unwrap(), 10.0);
        assert!(horizon_return(&closes, 3).is_none());
    }

    #[test]
    fn test_pivots() {
        let values = vec![1.0, 3.0, 2.0, 5.0, 1.0, 4.0, 0.5];
        assert_eq!(pivot_highs(&values, 1), vec![3.0, 5.0, 4.0]);
        assert_eq!(pivot_lows(&values, 1), vec![2.0, 1.0]);
        assert!(pivot_highs(&values, 4).is_empty());
    }
}
