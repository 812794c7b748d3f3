//! Scoring engine
//!
//! Composite ranking score for a candidate:
//!
//! ```text
//! technical = momentum(20d) + momentum(60d) + momentum(90d)
//!           + (max_allowed_risk - risk_pct) * 1.5
//!           + fundamental_score * 0.8
//!           + volatility_bonus + volume_score
//! final     = technical + min(risk_reward * rr_weight, rr_cap)
//! ```
//!
//! Momentum is scored with a diminishing-returns curve so that parabolic,
//! exhausted moves do not outrank steady outperformers.

use serde::{Deserialize, Serialize};

use crate::config::{MomentumCurve, ScoringConfig};
use crate::technical::{Outperformance, TechnicalSnapshot};
use crate::Fundamentals;

/// Marginal rate (in base weights) entering the transition band
const TRANSITION_START_RATE: f64 = 0.7;
/// Marginal rate (in base weights) leaving the transition band
const TRANSITION_END_RATE: f64 = 0.4;
/// Marginal rate inside the caution band
const CAUTION_RATE: f64 = 0.2;
/// Marginal rate past the exhaustion threshold
const EXHAUSTION_RATE: f64 = 0.05;
/// Cap on the exhaustion tail, in base weights
const EXHAUSTION_CAP: f64 = 2.0;

/// Highest value [`fundamental_score`] can return
pub const MAX_FUNDAMENTAL_SCORE: f64 = 30.0;

/// Score a benchmark outperformance (percentage points) on one horizon's curve
///
/// Four regimes with strictly decreasing marginal weight: linear up to
/// `healthy`, a linearly shrinking rate up to `caution`, a flat reduced rate up
/// to `exhaustion`, then a small capped tail. Zero or negative input scores 0.
pub fn sustainable_momentum_score(outperformance: f64, curve: &MomentumCurve) -> f64 {
    if outperformance.is_nan() || outperformance <= 0.0 {
        return 0.0;
    }
    let w = curve.base_weight;
    let x = outperformance;

    let mut score = x.min(curve.healthy) * w;
    if x <= curve.healthy {
        return score;
    }

    let band = curve.caution - curve.healthy;
    let d = x.min(curve.caution) - curve.healthy;
    score += w
        * (TRANSITION_START_RATE * d
            - (TRANSITION_START_RATE - TRANSITION_END_RATE) * d * d / (2.0 * band));
    if x <= curve.caution {
        return score;
    }

    score += w * CAUTION_RATE * (x.min(curve.exhaustion) - curve.caution);
    if x <= curve.exhaustion {
        return score;
    }

    score + (w * EXHAUSTION_RATE * (x - curve.exhaustion)).min(w * EXHAUSTION_CAP)
}

/// Quality points (0..=30) from whatever fundamentals are known
pub fn fundamental_score(fundamentals: Option<&Fundamentals>) -> f64 {
    let Some(f) = fundamentals else {
        return 0.0;
    };

    let earnings = match f.quarterly_earnings_growth {
        Some(g) if g > 25.0 => 10.0,
        Some(g) if g > 10.0 => 6.0,
        Some(g) if g > 0.0 => 3.0,
        _ => 0.0,
    };
    let revenue = match f.revenue_growth {
        Some(g) if g > 20.0 => 8.0,
        Some(g) if g > 10.0 => 5.0,
        Some(g) if g > 0.0 => 2.0,
        _ => 0.0,
    };
    let roe = match f.return_on_equity {
        Some(r) if r > 20.0 => 7.0,
        Some(r) if r > 15.0 => 5.0,
        Some(r) if r > 10.0 => 3.0,
        _ => 0.0,
    };
    let positive = if f.earnings_positive_flag == Some(true) {
        5.0
    } else {
        0.0
    };

    earnings + revenue + roe + positive
}

/// Every term of the final score, kept for reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub momentum_20d: f64,
    pub momentum_60d: f64,
    pub momentum_90d: f64,
    pub risk_bonus: f64,
    pub fundamental_component: f64,
    pub volatility_bonus: f64,
    pub volume_score: f64,
    pub technical_score: f64,
    pub risk_reward_ratio: f64,
    pub rr_contribution: f64,
    pub final_score: f64,
}

/// Applies the scoring formulas with an explicit configuration
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
    max_allowed_risk: f64,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig, max_allowed_risk: f64) -> Self {
        ScoringEngine {
            config,
            max_allowed_risk,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn volume_score(&self, volume_surge_pct: f64) -> f64 {
        (volume_surge_pct * self.config.volume_score_rate)
            .clamp(self.config.volume_score_min, self.config.volume_score_max)
    }

    /// Technical score terms; the risk/reward part is filled by [`Self::finalize`]
    pub fn technical(
        &self,
        snap: &TechnicalSnapshot,
        perf: &Outperformance,
        risk_percentage: f64,
        fundamental_score: f64,
    ) -> ScoreBreakdown {
        let cfg = &self.config;
        let momentum_20d = sustainable_momentum_score(perf.d20, &cfg.momentum_20d);
        let momentum_60d = sustainable_momentum_score(perf.d60, &cfg.momentum_60d);
        let momentum_90d = sustainable_momentum_score(perf.d90, &cfg.momentum_90d);
        let risk_bonus = (self.max_allowed_risk - risk_percentage) * cfg.risk_bonus_multiplier;
        let fundamental_component = fundamental_score * cfg.fundamental_weight;
        let volatility_bonus = cfg.volatility_bonus.for_rank(snap.volatility_rank);
        let volume_score = self.volume_score(snap.volume_surge_pct);

        let technical_score = momentum_20d
            + momentum_60d
            + momentum_90d
            + risk_bonus
            + fundamental_component
            + volatility_bonus
            + volume_score;

        ScoreBreakdown {
            momentum_20d,
            momentum_60d,
            momentum_90d,
            risk_bonus,
            fundamental_component,
            volatility_bonus,
            volume_score,
            technical_score,
            ..ScoreBreakdown::default()
        }
    }

    /// Fold the capped risk/reward contribution into the final score
    pub fn finalize(&self, mut breakdown: ScoreBreakdown, risk_reward_ratio: f64) -> ScoreBreakdown {
        let rr_contribution = (risk_reward_ratio * self.config.rr_weight).min(self.config.rr_cap);
        breakdown.risk_reward_ratio = risk_reward_ratio;
        breakdown.rr_contribution = rr_contribution;
        breakdown.final_score = breakdown.technical_score + rr_contribution;
        breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technical::VolatilityRank;
    use approx::assert_relative_eq;

    fn curve_20d() -> MomentumCurve {
        ScoringConfig::default().momentum_20d
    }

    fn snapshot(rank: VolatilityRank, surge: f64) -> TechnicalSnapshot {
        TechnicalSnapshot {
            current_price: 100.0,
            atr: 2.0,
            support: 95.0,
            resistance: 110.0,
            historical_volatility: 25.0,
            volatility_rank: rank,
            ma21: 98.0,
            ma50: 95.0,
            ma200: 90.0,
            avg_volume_5d: 2_000_000.0,
            avg_volume_30d: 2_000_000.0,
            volume_surge_pct: surge,
        }
    }

    #[test]
    fn test_momentum_regime_boundaries() {
        let c = curve_20d();
        assert_eq!(sustainable_momentum_score(-5.0, &c), 0.0);
        assert_eq!(sustainable_momentum_score(0.0, &c), 0.0);
        assert_relative_eq!(sustainable_momentum_score(10.0, &c), 10.0);
        assert_relative_eq!(sustainable_momentum_score(20.0, &c), 20.0);
        // 20 + 0.7*15 - 0.15*15
        assert_relative_eq!(sustainable_momentum_score(35.0, &c), 28.25, epsilon = 1e-9);
        assert_relative_eq!(sustainable_momentum_score(60.0, &c), 33.25, epsilon = 1e-9);
        // tail capped at 2 base weights
        assert_relative_eq!(sustainable_momentum_score(500.0, &c), 35.25, epsilon = 1e-9);
    }

    #[test]
    fn test_momentum_growth_rate_diminishes_by_regime() {
        let c = curve_20d();
        let rate = |a: f64, b: f64| {
            (sustainable_momentum_score(b, &c) - sustainable_momentum_score(a, &c)) / (b - a)
        };
        let healthy = rate(5.0, 15.0);
        let transition_early = rate(20.5, 21.5);
        let transition_late = rate(33.5, 34.5);
        let caution = rate(40.0, 50.0);
        let exhaustion = rate(61.0, 70.0);

        assert!(healthy > transition_early);
        assert!(transition_early > transition_late);
        assert!(transition_late > caution);
        assert!(caution > exhaustion);
        assert!(exhaustion > 0.0);
    }

    #[test]
    fn test_longer_horizons_less_sensitive() {
        let cfg = ScoringConfig::default();
        let x = 25.0;
        assert!(
            sustainable_momentum_score(x, &cfg.momentum_20d)
                > sustainable_momentum_score(x, &cfg.momentum_90d)
        );
    }

    #[test]
    fn test_fundamental_score() {
        assert_eq!(fundamental_score(None), 0.0);
        assert_eq!(fundamental_score(Some(&Fundamentals::default())), 0.0);

        let strong = Fundamentals {
            quarterly_earnings_growth: Some(40.0),
            revenue_growth: Some(25.0),
            return_on_equity: Some(22.0),
            earnings_positive_flag: Some(true),
        };
        assert_eq!(fundamental_score(Some(&strong)), MAX_FUNDAMENTAL_SCORE);

        let partial = Fundamentals {
            revenue_growth: Some(12.0),
            ..Fundamentals::default()
        };
        assert_eq!(fundamental_score(Some(&partial)), 5.0);
    }

    #[test]
    fn test_volume_score_clamped() {
        let engine = ScoringEngine::new(ScoringConfig::default(), 10.0);
        assert_relative_eq!(engine.volume_score(50.0), 10.0);
        assert_eq!(engine.volume_score(500.0), 20.0);
        assert_eq!(engine.volume_score(-90.0), -10.0);
    }

    #[test]
    fn test_technical_and_final_score() {
        let engine = ScoringEngine::new(ScoringConfig::default(), 10.0);
        let perf = Outperformance {
            d20: 10.0,
            d60: 20.0,
            d90: 30.0,
        };
        let snap = snapshot(VolatilityRank::Low, 25.0);
        let breakdown = engine.technical(&snap, &perf, 4.0, 20.0);

        assert_relative_eq!(breakdown.momentum_20d, 10.0);
        assert_relative_eq!(breakdown.momentum_60d, 16.0);
        assert_relative_eq!(breakdown.momentum_90d, 18.0, epsilon = 1e-9);
        assert_relative_eq!(breakdown.risk_bonus, 9.0);
        assert_relative_eq!(breakdown.fundamental_component, 16.0);
        assert_eq!(breakdown.volatility_bonus, 15.0);
        assert_relative_eq!(breakdown.volume_score, 5.0);
        assert_relative_eq!(breakdown.technical_score, 89.0, epsilon = 1e-9);

        let finalized = engine.finalize(breakdown.clone(), 2.0);
        assert_relative_eq!(finalized.rr_contribution, 24.0);
        assert_relative_eq!(finalized.final_score, 113.0, epsilon = 1e-9);

        // the R/R contribution is capped
        let capped = engine.finalize(breakdown, 20.0);
        assert_eq!(capped.rr_contribution, 60.0);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn momentum_score_non_decreasing(a in -20.0f64..200.0, delta in 0.0f64..50.0) {
                let cfg = ScoringConfig::default();
                for curve in [cfg.momentum_20d, cfg.momentum_60d, cfg.momentum_90d] {
                    let lo = sustainable_momentum_score(a, &curve);
                    let hi = sustainable_momentum_score(a + delta, &curve);
                    prop_assert!(hi + 1e-12 >= lo);
                    prop_assert!(lo >= 0.0);
                }
            }
        }
    }
}
