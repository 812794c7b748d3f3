//! Configuration management
//!
//! Handles loading and parsing of the JSON configuration file with environment
//! variable overrides. Every section has defaults, so an empty `{}` file is a
//! valid configuration. The resulting [`Config`] is immutable and passed by
//! reference into every component.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::technical::VolatilityRank;
use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub technical: TechnicalConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub consistency: ConsistencyConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SCREENER_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("SCREENER_DATA_DIR") {
            self.data.data_dir = dir;
        }
        if let Ok(path) = std::env::var("SCREENER_STORE_PATH") {
            self.data.store_path = path;
        }
        if let Ok(risk) = std::env::var("SCREENER_MAX_RISK") {
            self.risk.max_allowed_risk = risk
                .parse()
                .with_context(|| format!("Invalid SCREENER_MAX_RISK: {}", risk))?;
        }
        Ok(())
    }

    /// Reject configurations that would break pipeline invariants
    pub fn validate(&self) -> Result<()> {
        let t = &self.technical;
        if t.atr_period == 0 || t.volatility_period < 2 || t.sr_lookback < 3 {
            bail!("technical periods must be positive (volatility_period >= 2, sr_lookback >= 3)");
        }
        if t.min_history_bars < t.ma_long || t.min_history_bars <= 90 {
            bail!(
                "min_history_bars ({}) must cover the long moving average and the 90-day horizon",
                t.min_history_bars
            );
        }
        if !(t.ma_short < t.ma_mid && t.ma_mid < t.ma_long) {
            bail!("moving average periods must be strictly increasing");
        }

        if self.risk.max_allowed_risk <= 0.0 {
            bail!("risk.max_allowed_risk must be positive");
        }
        if self.risk.min_target_pct > self.risk.max_target_pct {
            bail!("risk.min_target_pct must not exceed risk.max_target_pct");
        }

        for curve in [
            &self.scoring.momentum_20d,
            &self.scoring.momentum_60d,
            &self.scoring.momentum_90d,
        ] {
            if !(0.0 < curve.healthy && curve.healthy < curve.caution && curve.caution < curve.exhaustion)
            {
                bail!(
                    "momentum thresholds for {}d must satisfy 0 < healthy < caution < exhaustion",
                    curve.horizon_days
                );
            }
        }

        let c = &self.consistency;
        if c.window_size < c.recent_span || c.recent_span < 2 {
            bail!("consistency.window_size must be >= recent_span >= 2");
        }
        if !(c.emerging_min >= 2
            && c.emerging_min < c.strong_candidate_min
            && c.strong_candidate_min < c.consistent_winner_min)
        {
            bail!("consistency category thresholds must satisfy 2 <= emerging < strong < consistent");
        }

        let r = &self.rotation;
        if r.critical_below > r.healthy_above {
            bail!("rotation.critical_below must not exceed rotation.healthy_above");
        }
        Ok(())
    }

    /// SHA-256 fingerprint of the effective configuration, stamped on every run
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// Input/output locations for the bundled adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: String,
    pub benchmark_symbol: String,
    /// Symbols to screen; empty means every CSV found in `data_dir`
    pub universe: Vec<String>,
    pub fundamentals_file: Option<String>,
    pub portfolio_file: Option<String>,
    pub store_path: String,
    pub json_backup_path: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            data_dir: "data".to_string(),
            benchmark_symbol: "SPY".to_string(),
            universe: Vec::new(),
            fundamentals_file: None,
            portfolio_file: None,
            store_path: "state/runs.db".to_string(),
            json_backup_path: None,
        }
    }
}

impl DataConfig {
    pub fn benchmark(&self) -> Symbol {
        Symbol::new(&self.benchmark_symbol)
    }
}

/// Technical metric periods and volatility bands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalConfig {
    pub min_history_bars: usize,
    pub atr_period: usize,
    /// Bars scanned for support/resistance pivots
    pub sr_lookback: usize,
    /// Bars on each side a pivot must dominate
    pub sr_pivot_span: usize,
    /// Number of most recent pivots averaged
    pub sr_pivot_count: usize,
    pub volatility_period: usize,
    /// Annualized volatility (%) below which the rank is LOW
    pub volatility_low_below: f64,
    /// Annualized volatility (%) below which the rank is MEDIUM
    pub volatility_medium_below: f64,
    pub ma_short: usize,
    pub ma_mid: usize,
    pub ma_long: usize,
    pub volume_short: usize,
    pub volume_long: usize,
}

impl Default for TechnicalConfig {
    fn default() -> Self {
        TechnicalConfig {
            min_history_bars: 200,
            atr_period: 20,
            sr_lookback: 60,
            sr_pivot_span: 2,
            sr_pivot_count: 3,
            volatility_period: 20,
            volatility_low_below: 20.0,
            volatility_medium_below: 35.0,
            ma_short: 21,
            ma_mid: 50,
            ma_long: 200,
            volume_short: 5,
            volume_long: 30,
        }
    }
}

/// Which candidate stop becomes the final stop before the distance floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSelection {
    /// Highest candidate price: closest stop, least capital at risk
    Tightest,
    /// Lowest candidate price: most distant stop
    Widest,
}

/// Per-volatility-rank values (ATR stop multipliers, scoring bonuses)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ByVolatility {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl ByVolatility {
    pub fn for_rank(&self, rank: VolatilityRank) -> f64 {
        match rank {
            VolatilityRank::Low => self.low,
            VolatilityRank::Medium => self.medium,
            VolatilityRank::High => self.high,
        }
    }
}

/// Stop-loss and take-profit parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Maximum admissible risk (% of price between entry and stop)
    pub max_allowed_risk: f64,
    pub stop_selection: StopSelection,
    pub atr_stop_multipliers: ByVolatility,
    /// Multiplier applied to support and moving-average stops
    pub level_buffer: f64,
    /// MA21 stop applies when price is above MA21 by less than this (%)
    pub ma21_proximity_pct: f64,
    /// MA50 stop applies when price is above MA50 by less than this (%)
    pub ma50_proximity_pct: f64,
    /// Stop is never closer than this to the price (%)
    pub min_stop_distance_pct: f64,
    /// Stop distance used when no candidate exists (%)
    pub fallback_stop_pct: f64,
    pub strong_score_above: f64,
    pub moderate_score_from: f64,
    pub strong_atr_multiplier: f64,
    pub moderate_atr_multiplier: f64,
    pub weak_atr_multiplier: f64,
    pub min_target_pct: f64,
    pub max_target_pct: f64,
    pub resistance_buffer: f64,
    /// Floor for the risk denominator of the risk/reward ratio
    pub min_risk_denominator: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            max_allowed_risk: 10.0,
            stop_selection: StopSelection::Tightest,
            atr_stop_multipliers: ByVolatility {
                low: 1.2,
                medium: 1.5,
                high: 1.8,
            },
            level_buffer: 0.985,
            ma21_proximity_pct: 6.0,
            ma50_proximity_pct: 9.0,
            min_stop_distance_pct: 3.0,
            fallback_stop_pct: 20.0,
            strong_score_above: 100.0,
            moderate_score_from: 60.0,
            strong_atr_multiplier: 3.0,
            moderate_atr_multiplier: 2.5,
            weak_atr_multiplier: 2.0,
            min_target_pct: 8.0,
            max_target_pct: 100.0,
            resistance_buffer: 0.98,
            min_risk_denominator: 0.1,
        }
    }
}

impl RiskConfig {
    pub fn with_max_allowed_risk(mut self, risk: f64) -> Self {
        self.max_allowed_risk = risk;
        self
    }

    pub fn with_stop_selection(mut self, selection: StopSelection) -> Self {
        self.stop_selection = selection;
        self
    }

    pub fn with_min_stop_distance(mut self, pct: f64) -> Self {
        self.min_stop_distance_pct = pct;
        self
    }
}

/// Thresholds of one sustainable-momentum curve
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MomentumCurve {
    pub horizon_days: usize,
    pub healthy: f64,
    pub caution: f64,
    pub exhaustion: f64,
    pub base_weight: f64,
}

/// Scoring weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub momentum_20d: MomentumCurve,
    pub momentum_60d: MomentumCurve,
    pub momentum_90d: MomentumCurve,
    pub risk_bonus_multiplier: f64,
    pub fundamental_weight: f64,
    pub volatility_bonus: ByVolatility,
    /// Points per percent of 5d-vs-30d volume surge
    pub volume_score_rate: f64,
    pub volume_score_min: f64,
    pub volume_score_max: f64,
    pub rr_weight: f64,
    pub rr_cap: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            momentum_20d: MomentumCurve {
                horizon_days: 20,
                healthy: 20.0,
                caution: 35.0,
                exhaustion: 60.0,
                base_weight: 1.0,
            },
            momentum_60d: MomentumCurve {
                horizon_days: 60,
                healthy: 30.0,
                caution: 55.0,
                exhaustion: 85.0,
                base_weight: 0.8,
            },
            momentum_90d: MomentumCurve {
                horizon_days: 90,
                healthy: 40.0,
                caution: 70.0,
                exhaustion: 100.0,
                base_weight: 0.6,
            },
            risk_bonus_multiplier: 1.5,
            fundamental_weight: 0.8,
            volatility_bonus: ByVolatility {
                low: 15.0,
                medium: 5.0,
                high: 0.0,
            },
            volume_score_rate: 0.2,
            volume_score_min: -10.0,
            volume_score_max: 20.0,
            rr_weight: 12.0,
            rr_cap: 60.0,
        }
    }
}

/// Admission thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_avg_volume: f64,
    pub min_outperformance_20d: f64,
    pub min_outperformance_60d: f64,
    pub min_outperformance_90d: f64,
    /// MA50 rebound: price must be at least `ma50 * rebound_floor`
    pub rebound_floor: f64,
    /// MA50 rebound: price must be at most `ma21 * rebound_ceiling`
    pub rebound_ceiling: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            min_avg_volume: 1_000_000.0,
            min_outperformance_20d: 2.0,
            min_outperformance_60d: 5.0,
            min_outperformance_90d: 8.0,
            rebound_floor: 1.02,
            rebound_ceiling: 1.07,
        }
    }
}

/// Rolling window and category thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    pub window_size: usize,
    pub consistent_winner_min: usize,
    pub strong_candidate_min: usize,
    pub emerging_min: usize,
    pub streak_weight: f64,
    /// Bonus for presence in the current run
    pub recent_bonus: f64,
    /// Extra bonus for presence in at least 2 of the last `recent_span` runs
    pub recent_majority_bonus: f64,
    pub recent_span: usize,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        ConsistencyConfig {
            window_size: 7,
            consistent_winner_min: 5,
            strong_candidate_min: 3,
            emerging_min: 2,
            streak_weight: 30.0,
            recent_bonus: 10.0,
            recent_majority_bonus: 10.0,
            recent_span: 3,
        }
    }
}

/// A `(threshold, value)` step; the first step whose threshold is met wins
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tier {
    pub at_least: f64,
    pub value: f64,
}

/// Pick the value of the first tier whose threshold `x` reaches, else `fallback`
pub fn tiered(tiers: &[Tier], x: f64, fallback: f64) -> f64 {
    tiers
        .iter()
        .find(|t| x >= t.at_least)
        .map(|t| t.value)
        .unwrap_or(fallback)
}

/// Rotation scoring, health penalties and decision thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Final score mapped to the full 100 points of screening quality
    pub score_normalizer: f64,
    pub max_fundamental_score: f64,
    pub strength_weight_20d: f64,
    pub strength_weight_60d: f64,
    pub strength_weight_90d: f64,
    /// Penalty by number of trailing runs absent (index 0 = one run)
    pub absence_penalties: Vec<f64>,
    /// Drawdown tiers, most severe first (`at_least` is the magnitude in %)
    pub drawdown_penalties: Vec<Tier>,
    pub elevated_risk_pct: f64,
    pub elevated_risk_penalty: f64,
    pub negative_outperformance_penalty: f64,
    pub healthy_above: f64,
    pub critical_below: f64,
    pub strong_hold_score: f64,
    pub hold_score: f64,
    pub warning_watch_score: f64,
    pub very_high_confidence_above: f64,
    pub high_confidence_above: f64,
    pub medium_confidence_above: f64,
    pub take_profit: TakeProfitRefreshConfig,
}

impl Default for RotationConfig {
    fn default() -> Self {
        RotationConfig {
            score_normalizer: 300.0,
            max_fundamental_score: 30.0,
            strength_weight_20d: 0.3,
            strength_weight_60d: 0.5,
            strength_weight_90d: 0.2,
            absence_penalties: vec![15.0, 30.0, 50.0],
            drawdown_penalties: vec![
                Tier { at_least: 15.0, value: 40.0 },
                Tier { at_least: 10.0, value: 25.0 },
                Tier { at_least: 5.0, value: 10.0 },
            ],
            elevated_risk_pct: 8.0,
            elevated_risk_penalty: 15.0,
            negative_outperformance_penalty: 10.0,
            healthy_above: 70.0,
            critical_below: 40.0,
            strong_hold_score: 300.0,
            hold_score: 200.0,
            warning_watch_score: 250.0,
            very_high_confidence_above: 350.0,
            high_confidence_above: 250.0,
            medium_confidence_above: 150.0,
            take_profit: TakeProfitRefreshConfig::default(),
        }
    }
}

/// Refreshed take-profit blend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeProfitRefreshConfig {
    /// Target gain (%) by 60d outperformance, largest first
    pub outperformance_tiers: Vec<Tier>,
    pub base_target_pct: f64,
    /// Stop distance assumed to span this many ATRs
    pub implied_atr_divisor: f64,
    pub atr_target_multiple: f64,
    /// Multiplicative bonus by advanced score, largest first
    pub score_bonus_tiers: Vec<Tier>,
    pub base_score_bonus: f64,
    pub min_reward_to_risk: f64,
}

impl Default for TakeProfitRefreshConfig {
    fn default() -> Self {
        TakeProfitRefreshConfig {
            outperformance_tiers: vec![
                Tier { at_least: 50.0, value: 30.0 },
                Tier { at_least: 30.0, value: 22.0 },
                Tier { at_least: 15.0, value: 15.0 },
            ],
            base_target_pct: 10.0,
            implied_atr_divisor: 1.5,
            atr_target_multiple: 4.0,
            score_bonus_tiers: vec![
                Tier { at_least: 350.0, value: 1.08 },
                Tier { at_least: 250.0, value: 1.05 },
                Tier { at_least: 150.0, value: 1.03 },
            ],
            base_score_bonus: 1.02,
            min_reward_to_risk: 2.0,
        }
    }
}
