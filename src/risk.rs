//! Risk level calculator
//!
//! Turns a [`TechnicalSnapshot`] into a stop-loss and a take-profit level and
//! reports the resulting risk/reward ratio.
//!
//! # Stop selection
//!
//! Candidate stops come from ATR distance, support, and the 21/50-day moving
//! averages. [`StopSelection::Tightest`] keeps the highest candidate (least
//! capital at risk); [`StopSelection::Widest`] keeps the lowest. Either way the
//! stop is then pushed to at least `min_stop_distance_pct` below the price:
//!
//! ```text
//! final_stop = min(selected, price * (1 - min_stop_distance_pct / 100))
//! risk_pct   = (price - final_stop) / price * 100
//! ```
//!
//! All levels are percentages of the current price, so the calculator is
//! currency-agnostic.

use serde::{Deserialize, Serialize};

use crate::config::{RiskConfig, StopSelection};
use crate::technical::TechnicalSnapshot;

/// Source of a candidate stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    Atr,
    Support,
    Ma21,
    Ma50,
    /// Stop was pushed down to the minimum distance
    MinDistance,
    /// No candidate existed
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLoss {
    pub stop_price: f64,
    pub risk_percentage: f64,
    /// Candidate sources considered, plus `MinDistance` when the floor applied
    pub methods_used: Vec<StopMethod>,
    /// Candidate that won the selection before the floor
    pub selected_method: StopMethod,
    pub enforced_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MomentumStrength {
    Strong,
    Moderate,
    Weak,
}

/// How the final target was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMethod {
    AtrBased,
    MinEnforced,
    MaxCapped,
    ResistanceAdjusted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeProfit {
    pub target_price: f64,
    pub upside_percentage: f64,
    pub momentum_strength: MomentumStrength,
    pub atr_multiplier_used: f64,
    pub method_note: TargetMethod,
}

/// Stop-loss / take-profit calculator
#[derive(Debug, Clone, Default)]
pub struct RiskCalculator {
    config: RiskConfig,
}

impl RiskCalculator {
    pub fn from_config(config: RiskConfig) -> Self {
        RiskCalculator { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Build candidate stops from the snapshot
    pub fn stop_candidates(&self, snap: &TechnicalSnapshot) -> Vec<(StopMethod, f64)> {
        let cfg = &self.config;
        let price = snap.current_price;
        let mut candidates = Vec::with_capacity(4);

        if snap.atr > 0.0 {
            let multiplier = cfg.atr_stop_multipliers.for_rank(snap.volatility_rank);
            let stop = price - snap.atr * multiplier;
            if stop > 0.0 {
                candidates.push((StopMethod::Atr, stop));
            }
        }

        if snap.support > 0.0 && snap.support < price {
            candidates.push((StopMethod::Support, snap.support * cfg.level_buffer));
        }

        if above_by_less_than(price, snap.ma21, cfg.ma21_proximity_pct) {
            candidates.push((StopMethod::Ma21, snap.ma21 * cfg.level_buffer));
        }

        // pullback-to-MA50 entries get a stop just under the average
        if above_by_less_than(price, snap.ma50, cfg.ma50_proximity_pct) {
            candidates.push((StopMethod::Ma50, snap.ma50 * cfg.level_buffer));
        }

        candidates
    }

    /// Compute the final stop for the snapshot's current price
    pub fn stop_loss(&self, snap: &TechnicalSnapshot) -> StopLoss {
        let cfg = &self.config;
        let price = snap.current_price;
        let candidates = self.stop_candidates(snap);

        let selected = match cfg.stop_selection {
            StopSelection::Tightest => candidates
                .iter()
                .copied()
                .max_by(|a, b| a.1.total_cmp(&b.1)),
            StopSelection::Widest => candidates
                .iter()
                .copied()
                .min_by(|a, b| a.1.total_cmp(&b.1)),
        };

        let Some((selected_method, selected_stop)) = selected else {
            let stop_price = price * (1.0 - cfg.fallback_stop_pct / 100.0);
            tracing::debug!(
                "No stop candidates at price {:.2}, enforcing {:.1}% fallback",
                price,
                cfg.fallback_stop_pct
            );
            return StopLoss {
                stop_price,
                risk_percentage: cfg.fallback_stop_pct,
                methods_used: vec![StopMethod::Fallback],
                selected_method: StopMethod::Fallback,
                enforced_fallback: true,
            };
        };

        let mut methods_used: Vec<StopMethod> = candidates.iter().map(|(m, _)| *m).collect();
        let floor = price * (1.0 - cfg.min_stop_distance_pct / 100.0);
        let stop_price = if selected_stop > floor {
            methods_used.push(StopMethod::MinDistance);
            floor
        } else {
            selected_stop
        };

        StopLoss {
            stop_price,
            risk_percentage: (price - stop_price) / price * 100.0,
            methods_used,
            selected_method,
            enforced_fallback: false,
        }
    }

    /// ATR multiplier tier for a technical score
    pub fn target_tier(&self, technical_score: f64) -> (f64, MomentumStrength) {
        let cfg = &self.config;
        if technical_score > cfg.strong_score_above {
            (cfg.strong_atr_multiplier, MomentumStrength::Strong)
        } else if technical_score >= cfg.moderate_score_from {
            (cfg.moderate_atr_multiplier, MomentumStrength::Moderate)
        } else {
            (cfg.weak_atr_multiplier, MomentumStrength::Weak)
        }
    }

    /// Compute the take-profit target; a resistance-based target may only raise it
    pub fn take_profit(&self, snap: &TechnicalSnapshot, technical_score: f64) -> TakeProfit {
        let cfg = &self.config;
        let price = snap.current_price;
        let (multiplier, momentum_strength) = self.target_tier(technical_score);

        let raw = price + snap.atr.max(0.0) * multiplier;
        let min_target = price * (1.0 + cfg.min_target_pct / 100.0);
        let max_target = price * (1.0 + cfg.max_target_pct / 100.0);

        let (mut target_price, mut method_note) = if raw < min_target {
            (min_target, TargetMethod::MinEnforced)
        } else if raw > max_target {
            (max_target, TargetMethod::MaxCapped)
        } else {
            (raw, TargetMethod::AtrBased)
        };

        let resistance_target = snap.resistance * cfg.resistance_buffer;
        if resistance_target > target_price && resistance_target <= max_target {
            target_price = resistance_target;
            method_note = TargetMethod::ResistanceAdjusted;
        }

        TakeProfit {
            target_price,
            upside_percentage: (target_price / price - 1.0) * 100.0,
            momentum_strength,
            atr_multiplier_used: multiplier,
            method_note,
        }
    }

    /// Upside over risk with a floored denominator; always finite and >= 0
    pub fn risk_reward_ratio(&self, upside_percentage: f64, risk_percentage: f64) -> f64 {
        let ratio = upside_percentage / risk_percentage.max(self.config.min_risk_denominator);
        if ratio.is_finite() {
            ratio.max(0.0)
        } else {
            0.0
        }
    }
}

/// True when `price` is above `level` by strictly less than `pct` percent
fn above_by_less_than(price: f64, level: f64, pct: f64) -> bool {
    level > 0.0 && price > level && (price / level - 1.0) * 100.0 < pct
}
