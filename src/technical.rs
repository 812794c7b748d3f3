//! Technical metrics
//!
//! Derives the per-symbol [`TechnicalSnapshot`] (ATR, support/resistance,
//! moving averages, volatility rank, volume activity) and the
//! benchmark-relative [`Outperformance`] from a price history. Everything here
//! is a pure function of its inputs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ScoringConfig, TechnicalConfig};
use crate::indicators::{
    atr, historical_volatility, horizon_return, pivot_highs, pivot_lows, trailing_mean,
};
use crate::PriceSeries;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("insufficient history: {available} bars available, {required} required")]
    InsufficientHistory { required: usize, available: usize },

    #[error("{metric} is not a finite number")]
    NonFinite { metric: &'static str },
}

/// Volatility classification from annualized historical volatility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityRank {
    Low,
    Medium,
    High,
}

impl VolatilityRank {
    pub fn classify(annualized_pct: f64, config: &TechnicalConfig) -> Self {
        if annualized_pct < config.volatility_low_below {
            VolatilityRank::Low
        } else if annualized_pct < config.volatility_medium_below {
            VolatilityRank::Medium
        } else {
            VolatilityRank::High
        }
    }
}

impl std::fmt::Display for VolatilityRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolatilityRank::Low => write!(f, "LOW"),
            VolatilityRank::Medium => write!(f, "MEDIUM"),
            VolatilityRank::High => write!(f, "HIGH"),
        }
    }
}

/// Per-run technical view of one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub current_price: f64,
    pub atr: f64,
    pub support: f64,
    pub resistance: f64,
    /// Annualized historical volatility (%)
    pub historical_volatility: f64,
    pub volatility_rank: VolatilityRank,
    pub ma21: f64,
    pub ma50: f64,
    pub ma200: f64,
    pub avg_volume_5d: f64,
    pub avg_volume_30d: f64,
    /// Short-vs-long average volume change (%)
    pub volume_surge_pct: f64,
}

impl TechnicalSnapshot {
    /// Compute the snapshot from a series with at least `min_history_bars` bars
    pub fn compute(series: &PriceSeries, config: &TechnicalConfig) -> Result<Self, MetricsError> {
        if series.len() < config.min_history_bars {
            return Err(MetricsError::InsufficientHistory {
                required: config.min_history_bars,
                available: series.len(),
            });
        }

        let highs = series.highs();
        let lows = series.lows();
        let closes = series.closes();
        let volumes = series.volumes();

        let current_price = finite("current_price", series.last_close())?;
        let current_atr = finite(
            "atr",
            atr(&highs, &lows, &closes, config.atr_period)
                .last()
                .and_then(|&x| x),
        )?;
        let (support, resistance) = support_resistance(&highs, &lows, config);
        let hv = finite(
            "historical_volatility",
            historical_volatility(&closes, config.volatility_period),
        )?;

        let ma21 = finite("ma_short", trailing_mean(&closes, config.ma_short))?;
        let ma50 = finite("ma_mid", trailing_mean(&closes, config.ma_mid))?;
        let ma200 = finite("ma_long", trailing_mean(&closes, config.ma_long))?;

        let avg_volume_5d = finite("avg_volume_short", trailing_mean(&volumes, config.volume_short))?;
        let avg_volume_30d = finite("avg_volume_long", trailing_mean(&volumes, config.volume_long))?;
        let volume_surge_pct = if avg_volume_30d > 0.0 {
            (avg_volume_5d / avg_volume_30d - 1.0) * 100.0
        } else {
            0.0
        };

        Ok(TechnicalSnapshot {
            current_price,
            atr: current_atr,
            support: finite("support", Some(support))?,
            resistance: finite("resistance", Some(resistance))?,
            historical_volatility: hv,
            volatility_rank: VolatilityRank::classify(hv, config),
            ma21,
            ma50,
            ma200,
            avg_volume_5d,
            avg_volume_30d,
            volume_surge_pct,
        })
    }
}

fn finite(metric: &'static str, value: Option<f64>) -> Result<f64, MetricsError> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(MetricsError::NonFinite { metric }),
    }
}

/// Support and resistance over the configured lookback
///
/// Each level is the mean of the most recent pivot lows (highs). With no pivot
/// in the window the level falls back to the window minimum (maximum).
pub fn support_resistance(highs: &[f64], lows: &[f64], config: &TechnicalConfig) -> (f64, f64) {
    let start = highs.len().saturating_sub(config.sr_lookback);
    let window_highs = &highs[start..];
    let window_lows = &lows[start..];

    let resistance = recent_mean(&pivot_highs(window_highs, config.sr_pivot_span), config.sr_pivot_count)
        .unwrap_or_else(|| window_highs.iter().copied().fold(f64::MIN, f64::max));
    let support = recent_mean(&pivot_lows(window_lows, config.sr_pivot_span), config.sr_pivot_count)
        .unwrap_or_else(|| window_lows.iter().copied().fold(f64::MAX, f64::min));

    (support, resistance)
}

fn recent_mean(levels: &[f64], count: usize) -> Option<f64> {
    if levels.is_empty() || count == 0 {
        return None;
    }
    let recent = &levels[levels.len().saturating_sub(count)..];
    Some(recent.iter().sum::<f64>() / recent.len() as f64)
}

/// Benchmark-relative return spread (percentage points) per horizon
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Outperformance {
    pub d20: f64,
    pub d60: f64,
    pub d90: f64,
}

impl Outperformance {
    /// Compare the symbol's closes with the benchmark's over the scoring horizons
    ///
    /// Horizons are counted in bars from the end of each series.
    pub fn compute(
        closes: &[f64],
        benchmark_closes: &[f64],
        scoring: &ScoringConfig,
    ) -> Result<Self, MetricsError> {
        let spread = |horizon: usize| -> Result<f64, MetricsError> {
            let required = horizon + 1;
            let own = horizon_return(closes, horizon).ok_or(MetricsError::InsufficientHistory {
                required,
                available: closes.len(),
            })?;
            let bench = horizon_return(benchmark_closes, horizon).ok_or(
                MetricsError::InsufficientHistory {
                    required,
                    available: benchmark_closes.len(),
                },
            )?;
            finite("outperformance", Some(own - bench))
        };

        Ok(Outperformance {
            d20: spread(scoring.momentum_20d.horizon_days)?,
            d60: spread(scoring.momentum_60d.horizon_days)?,
            d90: spread(scoring.momentum_90d.horizon_days)?,
        })
    }
}
