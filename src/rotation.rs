//! Rotation decision engine
//!
//! Combines the held positions, the consistency report and the latest run into
//! per-holding actions, a ranked list of new opportunities and a watchlist.
//!
//! # Advanced score (max 450)
//!
//! | component        | max | source                                        |
//! |------------------|-----|-----------------------------------------------|
//! | consistency      | 100 | frequency / window                            |
//! | momentum         | 100 | longest streak / window, bonus if present now |
//! | screening quality| 150 | normalized final score + outperformance/risk  |
//! | fundamentals     |  50 | fundamental score                             |
//! | market strength  |  50 | weighted 20d/60d/90d outperformance           |
//!
//! # Decision table
//!
//! | health   | advanced score        | action          |
//! |----------|-----------------------|-----------------|
//! | any      | absent from last run  | URGENT_EXIT     |
//! | CRITICAL | any                   | URGENT_EXIT     |
//! | WARNING  | >= 250                | WATCH_CAREFULLY |
//! | WARNING  | < 250                 | CONSIDER_EXIT   |
//! | HEALTHY  | >= 300                | STRONG_HOLD     |
//! | HEALTHY  | >= 200                | HOLD            |
//! | HEALTHY  | < 200                 | WATCH_CAREFULLY |
//!
//! Non-held symbols are only surfaced while they pass the latest screen; a
//! symbol that dropped out is never offered as a buy.

use chrono::NaiveDate;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{tiered, RotationConfig};
use crate::consistency::{Category, ConsistencyRecord, ConsistencyReport, TrendLabel};
use crate::screener::{CandidateResult, ScreeningRun};
use crate::{Holding, Portfolio, Symbol};

const CONSISTENCY_MAX: f64 = 100.0;
const MOMENTUM_STREAK_POINTS: f64 = 80.0;
const MOMENTUM_PRESENT_BONUS: f64 = 20.0;
const QUALITY_SCORE_MAX: f64 = 100.0;
const QUALITY_EDGE_MAX: f64 = 50.0;
const QUALITY_MAX: f64 = 150.0;
const FUNDAMENTALS_MAX: f64 = 50.0;
const MARKET_STRENGTH_MAX: f64 = 50.0;

/// Upper bound of [`AdvancedScore::total`]
pub const ADVANCED_SCORE_MAX: f64 = 450.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedScore {
    pub consistency: f64,
    pub momentum: f64,
    pub quality: f64,
    pub fundamentals: f64,
    pub market_strength: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthBand {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAssessment {
    pub score: f64,
    pub band: HealthBand,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    StrongHold,
    Hold,
    WatchCarefully,
    ConsiderExit,
    UrgentExit,
}

impl Action {
    pub fn is_exit(&self) -> bool {
        matches!(self, Action::ConsiderExit | Action::UrgentExit)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::StrongHold => "STRONG_HOLD",
            Action::Hold => "HOLD",
            Action::WatchCarefully => "WATCH_CAREFULLY",
            Action::ConsiderExit => "CONSIDER_EXIT",
            Action::UrgentExit => "URGENT_EXIT",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    VeryHigh,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Confidence::VeryHigh => "VERY_HIGH",
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        };
        f.pad(name)
    }
}

/// The three target estimates and the blended result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefreshedTakeProfit {
    pub target_price: f64,
    pub upside_percentage: f64,
    pub outperformance_target: f64,
    pub volatility_target: f64,
    pub score_multiplier: f64,
    /// Minimum reward-to-risk target; wins when the blend is lower
    pub floor_target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationRecommendation {
    pub symbol: Symbol,
    pub action: Action,
    pub reason: String,
    pub advanced_score: AdvancedScore,
    pub health: HealthAssessment,
    /// Change vs entry price (%), when a current price is known
    pub change_pct: Option<f64>,
    pub refreshed_take_profit: Option<RefreshedTakeProfit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub symbol: Symbol,
    pub confidence: Confidence,
    pub advanced_score: AdvancedScore,
    pub category: Category,
    pub trend: TrendLabel,
    pub refreshed_take_profit: Option<RefreshedTakeProfit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationPlan {
    pub run_date: NaiveDate,
    pub holdings: Vec<RotationRecommendation>,
    /// Non-held symbols in the latest run with MEDIUM confidence and above, best first
    pub opportunities: Vec<Opportunity>,
    /// Non-held symbols in the latest run with LOW confidence
    pub watchlist: Vec<Opportunity>,
}

impl RotationPlan {
    pub fn exits(&self) -> impl Iterator<Item = &RotationRecommendation> {
        self.holdings.iter().filter(|r| r.action.is_exit())
    }
}

#[derive(Debug, Clone)]
pub struct RotationEngine {
    config: RotationConfig,
    window_size: usize,
}

impl RotationEngine {
    pub fn new(config: RotationConfig, window_size: usize) -> Self {
        RotationEngine {
            config,
            window_size: window_size.max(1),
        }
    }

    pub fn advanced_score(
        &self,
        record: Option<&ConsistencyRecord>,
        candidate: Option<&CandidateResult>,
    ) -> AdvancedScore {
        let cfg = &self.config;
        let window = self.window_size as f64;

        let (frequency, streak) = record
            .map(|r| (r.frequency as f64, r.longest_streak as f64))
            .unwrap_or((0.0, 0.0));
        let consistency = (frequency / window * CONSISTENCY_MAX).min(CONSISTENCY_MAX);
        let present_bonus = if candidate.is_some() {
            MOMENTUM_PRESENT_BONUS
        } else {
            0.0
        };
        let momentum = (streak / window * MOMENTUM_STREAK_POINTS + present_bonus)
            .min(MOMENTUM_STREAK_POINTS + MOMENTUM_PRESENT_BONUS);

        let (quality, fundamentals, market_strength) = match candidate {
            Some(c) => {
                let normalized = (c.final_score() / cfg.score_normalizer * 100.0).min(QUALITY_SCORE_MAX);
                let edge = (c.outperformance.d60 / c.stop_loss.risk_percentage.max(1.0) * 10.0)
                    .clamp(0.0, QUALITY_EDGE_MAX);
                let quality = (normalized + edge).clamp(0.0, QUALITY_MAX);

                let fundamentals = (c.fundamental_score / cfg.max_fundamental_score * FUNDAMENTALS_MAX)
                    .clamp(0.0, FUNDAMENTALS_MAX);

                let perf = &c.outperformance;
                let strength = (cfg.strength_weight_20d * perf.d20
                    + cfg.strength_weight_60d * perf.d60
                    + cfg.strength_weight_90d * perf.d90)
                    .clamp(0.0, MARKET_STRENGTH_MAX);

                (quality, fundamentals, strength)
            }
            None => (0.0, 0.0, 0.0),
        };

        AdvancedScore {
            consistency,
            momentum,
            quality,
            fundamentals,
            market_strength,
            total: consistency + momentum + quality + fundamentals + market_strength,
        }
    }

    /// Health of a held position
    ///
    /// Without a current candidate only the absence penalty can be assessed.
    pub fn health(
        &self,
        holding: &Holding,
        record: Option<&ConsistencyRecord>,
        candidate: Option<&CandidateResult>,
    ) -> HealthAssessment {
        let cfg = &self.config;
        let mut score: f64 = 100.0;
        let mut warnings = Vec::new();

        let absent_runs = record.map_or(self.window_size, |r| r.trailing_absence);
        if absent_runs > 0 && !cfg.absence_penalties.is_empty() {
            let idx = absent_runs.min(cfg.absence_penalties.len()) - 1;
            score -= cfg.absence_penalties[idx];
            warnings.push(format!("absent from the last {} run(s)", absent_runs));
        }

        if let Some(c) = candidate {
            let drawdown = -holding.change_pct(c.current_price());
            let penalty = tiered(&cfg.drawdown_penalties, drawdown, 0.0);
            if penalty > 0.0 {
                score -= penalty;
                warnings.push(format!("drawdown {:.1}% from entry", drawdown));
            }

            if c.stop_loss.risk_percentage > cfg.elevated_risk_pct {
                score -= cfg.elevated_risk_penalty;
                warnings.push(format!("elevated risk {:.1}%", c.stop_loss.risk_percentage));
            }

            if c.outperformance.d20 < 0.0 {
                score -= cfg.negative_outperformance_penalty;
                warnings.push(format!("lagging benchmark over 20d ({:.1}%)", c.outperformance.d20));
            }
        }

        let score = score.clamp(0.0, 100.0);
        let band = if score > cfg.healthy_above {
            HealthBand::Healthy
        } else if score < cfg.critical_below {
            HealthBand::Critical
        } else {
            HealthBand::Warning
        };

        HealthAssessment {
            score,
            band,
            warnings,
        }
    }

    pub fn decide(&self, present: bool, health: &HealthAssessment, score: f64) -> (Action, String) {
        let cfg = &self.config;
        if !present {
            return (
                Action::UrgentExit,
                "absent from the latest screening run".to_string(),
            );
        }

        match health.band {
            HealthBand::Critical => (
                Action::UrgentExit,
                format!("health critical ({:.0})", health.score),
            ),
            HealthBand::Warning if score >= cfg.warning_watch_score => (
                Action::WatchCarefully,
                format!("health warning ({:.0}) but strong score {:.0}", health.score, score),
            ),
            HealthBand::Warning => (
                Action::ConsiderExit,
                format!("health warning ({:.0}) and weak score {:.0}", health.score, score),
            ),
            HealthBand::Healthy if score >= cfg.strong_hold_score => (
                Action::StrongHold,
                format!("healthy with very strong score {:.0}", score),
            ),
            HealthBand::Healthy if score >= cfg.hold_score => (
                Action::Hold,
                format!("healthy with solid score {:.0}", score),
            ),
            HealthBand::Healthy => (
                Action::WatchCarefully,
                format!("healthy but weak score {:.0}", score),
            ),
        }
    }

    pub fn confidence(&self, score: f64) -> Confidence {
        let cfg = &self.config;
        if score > cfg.very_high_confidence_above {
            Confidence::VeryHigh
        } else if score > cfg.high_confidence_above {
            Confidence::High
        } else if score > cfg.medium_confidence_above {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// Blend of outperformance, volatility and score targets with a reward-to-risk floor
    pub fn refreshed_take_profit(&self, candidate: &CandidateResult, score: f64) -> RefreshedTakeProfit {
        let cfg = &self.config.take_profit;
        let price = candidate.current_price();
        let risk_pct = candidate.stop_loss.risk_percentage;

        let target_pct = tiered(
            &cfg.outperformance_tiers,
            candidate.outperformance.d60,
            cfg.base_target_pct,
        );
        let outperformance_target = price * (1.0 + target_pct / 100.0);

        let implied_atr = price * risk_pct / 100.0 / cfg.implied_atr_divisor;
        let volatility_target = price + cfg.atr_target_multiple * implied_atr;

        let score_multiplier = tiered(&cfg.score_bonus_tiers, score, cfg.base_score_bonus);
        let combined = outperformance_target.min(volatility_target) * score_multiplier;

        let floor_target = price + cfg.min_reward_to_risk * (price - candidate.stop_loss.stop_price);
        let target_price = combined.max(floor_target);

        RefreshedTakeProfit {
            target_price,
            upside_percentage: (target_price / price - 1.0) * 100.0,
            outperformance_target,
            volatility_target,
            score_multiplier,
            floor_target,
        }
    }

    pub fn recommend(
        &self,
        symbol: &Symbol,
        holding: &Holding,
        report: &ConsistencyReport,
        latest: &ScreeningRun,
    ) -> RotationRecommendation {
        let record = report.get(symbol);
        let candidate = latest.get(symbol);

        let advanced_score = self.advanced_score(record, candidate);
        let health = self.health(holding, record, candidate);
        let (action, reason) = self.decide(candidate.is_some(), &health, advanced_score.total);

        RotationRecommendation {
            symbol: symbol.clone(),
            action,
            reason,
            advanced_score,
            change_pct: candidate.map(|c| holding.change_pct(c.current_price())),
            refreshed_take_profit: candidate
                .map(|c| self.refreshed_take_profit(c, advanced_score.total)),
            health,
        }
    }

    pub fn plan(
        &self,
        portfolio: &Portfolio,
        report: &ConsistencyReport,
        latest: &ScreeningRun,
    ) -> RotationPlan {
        let holdings: Vec<RotationRecommendation> = portfolio
            .iter()
            .map(|(symbol, holding)| self.recommend(symbol, holding, report, latest))
            .collect();

        let mut opportunities = Vec::new();
        let mut watchlist = Vec::new();
        for record in report.records.iter().filter(|r| !portfolio.contains_key(&r.symbol)) {
            // a symbol that just failed the screen is not a buy, whatever its history
            let Some(candidate) = latest.get(&record.symbol) else {
                continue;
            };
            let advanced_score = self.advanced_score(Some(record), Some(candidate));
            let confidence = self.confidence(advanced_score.total);
            let opportunity = Opportunity {
                symbol: record.symbol.clone(),
                confidence,
                advanced_score,
                category: record.category,
                trend: record.trend,
                refreshed_take_profit: Some(self.refreshed_take_profit(candidate, advanced_score.total)),
            };

            if confidence == Confidence::Low {
                watchlist.push(opportunity);
            } else {
                opportunities.push(opportunity);
            }
        }

        let by_score = |a: &Opportunity, b: &Opportunity| {
            OrderedFloat(b.advanced_score.total)
                .cmp(&OrderedFloat(a.advanced_score.total))
                .then_with(|| a.symbol.cmp(&b.symbol))
        };
        let opportunities = opportunities.into_iter().sorted_by(by_score).collect();
        let watchlist = watchlist.into_iter().sorted_by(by_score).collect();

        let plan = RotationPlan {
            run_date: latest.run_date,
            holdings,
            opportunities,
            watchlist,
        };

        for rec in plan.exits() {
            warn!("{}: {} ({})", rec.symbol, rec.action, rec.reason);
        }
        info!(
            "Rotation: {} holdings reviewed, {} exits, {} opportunities, {} on watchlist",
            plan.holdings.len(),
            plan.exits().count(),
            plan.opportunities.len(),
            plan.watchlist.len()
        );

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::{ConsistencyTracker, RunWindow};
    use crate::screener::tests_support::candidate;
    use crate::Money;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn engine() -> RotationEngine {
        RotationEngine::new(RotationConfig::default(), 7)
    }

    fn holding(entry_price: f64) -> Holding {
        Holding {
            shares: Money::from_f64(10.0),
            entry_price: Money::from_f64(entry_price),
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        }
    }

    fn record(symbol: &str, frequency: usize, streak: usize, trailing_absence: usize) -> ConsistencyRecord {
        ConsistencyRecord {
            symbol: Symbol::new(symbol),
            frequency,
            run_indices_appeared: Vec::new(),
            longest_streak: streak,
            present_now: trailing_absence == 0,
            trailing_absence,
            consistency_score: 0.0,
            category: Category::ConsistentWinner,
            trend: TrendLabel::Accelerating,
        }
    }

    /// Seven runs: `symbols_by_run[i]` lists the candidates of run i
    fn history(symbols_by_run: &[&[(&str, f64)]]) -> Vec<ScreeningRun> {
        symbols_by_run
            .iter()
            .enumerate()
            .map(|(i, symbols)| {
                let date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap() + Duration::days(i as i64);
                let mut run = ScreeningRun::empty(date);
                run.candidates = symbols.iter().map(|(s, score)| candidate(s, *score)).collect();
                run
            })
            .collect()
    }

    #[test]
    fn test_advanced_score_components() {
        let c = candidate("AAA", 300.0);
        let score = engine().advanced_score(Some(&record("AAA", 7, 7, 0)), Some(&c));

        assert_relative_eq!(score.consistency, 100.0);
        assert_relative_eq!(score.momentum, 100.0);
        // 100 + 20/5*10
        assert_relative_eq!(score.quality, 140.0);
        assert_relative_eq!(score.fundamentals, 25.0);
        assert_relative_eq!(score.market_strength, 17.8, epsilon = 1e-9);
        assert_relative_eq!(score.total, 382.8, epsilon = 1e-9);
        assert!(score.total <= ADVANCED_SCORE_MAX);
    }

    #[test]
    fn test_absent_symbol_scores_history_only() {
        let score = engine().advanced_score(Some(&record("OLD", 5, 5, 2)), None);
        assert_relative_eq!(score.consistency, 500.0 / 7.0, epsilon = 1e-9);
        assert_relative_eq!(score.momentum, 400.0 / 7.0, epsilon = 1e-9);
        assert_eq!(score.quality, 0.0);
        assert_eq!(score.market_strength, 0.0);
    }

    #[test]
    fn test_health_penalties() {
        let e = engine();
        let c = candidate("AAA", 300.0);

        let healthy = e.health(&holding(90.0), Some(&record("AAA", 7, 7, 0)), Some(&c));
        assert_eq!(healthy.score, 100.0);
        assert_eq!(healthy.band, HealthBand::Healthy);
        assert!(healthy.warnings.is_empty());

        let mut risky = c.clone();
        risky.stop_loss.risk_percentage = 9.0;
        // 13% drawdown (-25) and elevated risk (-15)
        let warning = e.health(&holding(115.0), Some(&record("AAA", 7, 7, 0)), Some(&risky));
        assert_relative_eq!(warning.score, 60.0);
        assert_eq!(warning.band, HealthBand::Warning);
        assert_eq!(warning.warnings.len(), 2);

        risky.outperformance.d20 = -2.0;
        // 20% drawdown (-40), risk (-15), lagging (-10)
        let critical = e.health(&holding(125.0), Some(&record("AAA", 7, 7, 0)), Some(&risky));
        assert_relative_eq!(critical.score, 35.0);
        assert_eq!(critical.band, HealthBand::Critical);

        let absent = e.health(&holding(100.0), Some(&record("AAA", 4, 4, 3)), None);
        assert_eq!(absent.score, 50.0);
        assert_eq!(absent.band, HealthBand::Warning);
    }

    #[test]
    fn test_decision_table() {
        let e = engine();
        let health = |score: f64, band: HealthBand| HealthAssessment {
            score,
            band,
            warnings: Vec::new(),
        };

        assert_eq!(e.decide(false, &health(100.0, HealthBand::Healthy), 440.0).0, Action::UrgentExit);
        assert_eq!(e.decide(true, &health(30.0, HealthBand::Critical), 440.0).0, Action::UrgentExit);
        assert_eq!(e.decide(true, &health(60.0, HealthBand::Warning), 250.0).0, Action::WatchCarefully);
        assert_eq!(e.decide(true, &health(60.0, HealthBand::Warning), 249.0).0, Action::ConsiderExit);
        assert_eq!(e.decide(true, &health(90.0, HealthBand::Healthy), 300.0).0, Action::StrongHold);
        assert_eq!(e.decide(true, &health(90.0, HealthBand::Healthy), 200.0).0, Action::Hold);
        assert_eq!(e.decide(true, &health(90.0, HealthBand::Healthy), 199.0).0, Action::WatchCarefully);
    }

    #[test]
    fn test_confidence_tiers() {
        let e = engine();
        assert_eq!(e.confidence(351.0), Confidence::VeryHigh);
        assert_eq!(e.confidence(350.0), Confidence::High);
        assert_eq!(e.confidence(250.5), Confidence::High);
        assert_eq!(e.confidence(151.0), Confidence::Medium);
        assert_eq!(e.confidence(150.0), Confidence::Low);
    }

    #[test]
    fn test_refreshed_take_profit_blend() {
        let e = engine();
        let c = candidate("AAA", 300.0);
        let tp = e.refreshed_take_profit(&c, 382.8);

        assert_relative_eq!(tp.outperformance_target, 115.0, epsilon = 1e-9);
        // 100 + 4 * (100 * 5% / 1.5)
        assert_relative_eq!(tp.volatility_target, 100.0 + 40.0 / 3.0, epsilon = 1e-9);
        assert_eq!(tp.score_multiplier, 1.08);
        assert_relative_eq!(tp.target_price, (100.0 + 40.0 / 3.0) * 1.08, epsilon = 1e-9);
        assert_relative_eq!(tp.floor_target, 110.0, epsilon = 1e-9);
    }

    #[test]
    fn test_refreshed_take_profit_floor_wins() {
        let e = engine();
        let mut c = candidate("WIDE", 100.0);
        c.stop_loss.stop_price = 90.0;
        c.stop_loss.risk_percentage = 10.0;
        c.outperformance.d60 = 5.0;
        let tp = e.refreshed_take_profit(&c, 100.0);

        // min(110, 126.67) * 1.02 = 112.2 < 2:1 floor of 120
        assert_relative_eq!(tp.target_price, 120.0, epsilon = 1e-9);
        assert_relative_eq!(tp.upside_percentage, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_plan_forces_exit_for_absent_holding() {
        let runs = history(&[
            &[("GONE", 300.0), ("STAR", 300.0)],
            &[("GONE", 300.0), ("STAR", 300.0)],
            &[("GONE", 300.0), ("STAR", 300.0)],
            &[("GONE", 300.0), ("STAR", 300.0)],
            &[("GONE", 300.0), ("STAR", 300.0)],
            &[("GONE", 300.0), ("STAR", 300.0)],
            &[("STAR", 300.0), ("FRESH", 40.0)],
        ]);
        let latest = runs[6].clone();
        let tracker = ConsistencyTracker::default();
        let report = tracker.report(&RunWindow::from_runs(&runs, 7));

        let mut portfolio = Portfolio::new();
        portfolio.insert(Symbol::new("GONE"), holding(90.0));
        portfolio.insert(Symbol::new("STAR"), holding(90.0));

        let plan = engine().plan(&portfolio, &report, &latest);

        let gone = plan.holdings.iter().find(|r| r.symbol.as_str() == "GONE").unwrap();
        assert_eq!(gone.action, Action::UrgentExit);
        assert!(gone.refreshed_take_profit.is_none());

        let star = plan.holdings.iter().find(|r| r.symbol.as_str() == "STAR").unwrap();
        assert_eq!(star.action, Action::StrongHold);
        assert!(star.refreshed_take_profit.is_some());

        assert_eq!(plan.exits().count(), 1);
        assert!(plan.opportunities.is_empty());
        // a single weak appearance lands on the watchlist
        assert_eq!(plan.watchlist.len(), 1);
        assert_eq!(plan.watchlist[0].symbol.as_str(), "FRESH");
        assert_eq!(plan.watchlist[0].confidence, Confidence::Low);
    }

    #[test]
    fn test_opportunities_ranked_by_score() {
        let runs = history(&[
            &[("BBB", 300.0), ("AAA", 300.0)],
            &[("BBB", 300.0), ("AAA", 300.0)],
            &[("BBB", 300.0), ("AAA", 300.0), ("CCC", 300.0)],
            &[("BBB", 300.0), ("AAA", 300.0), ("CCC", 300.0)],
            &[("BBB", 300.0), ("AAA", 300.0), ("CCC", 300.0)],
            &[("BBB", 300.0), ("AAA", 300.0), ("CCC", 300.0)],
            &[("BBB", 300.0), ("AAA", 300.0), ("CCC", 300.0)],
        ]);
        let report = ConsistencyTracker::default().report(&RunWindow::from_runs(&runs, 7));
        let plan = engine().plan(&Portfolio::new(), &report, &runs[6]);

        let order: Vec<&str> = plan.opportunities.iter().map(|o| o.symbol.as_str()).collect();
        assert_eq!(order, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(plan.opportunities[0].confidence, Confidence::VeryHigh);
        assert!(plan.opportunities.iter().all(|o| o.refreshed_take_profit.is_some()));
    }

    #[test]
    fn test_dropped_symbol_is_not_an_opportunity() {
        let strong: &[(&str, f64)] = &[("AAA", 300.0), ("BBB", 300.0)];
        let runs = history(&[strong, strong, strong, strong, strong, strong, &[("BBB", 300.0)]]);
        let report = ConsistencyTracker::default().report(&RunWindow::from_runs(&runs, 7));

        // history alone would rate AAA well above LOW
        let aaa = report.get(&Symbol::new("AAA")).unwrap();
        assert!(engine().advanced_score(Some(aaa), None).total > 150.0);

        let plan = engine().plan(&Portfolio::new(), &report, &runs[6]);
        let surfaced: Vec<&str> = plan
            .opportunities
            .iter()
            .chain(plan.watchlist.iter())
            .map(|o| o.symbol.as_str())
            .collect();
        assert_eq!(surfaced, vec!["BBB"]);
        assert!(plan.opportunities.iter().all(|o| o.refreshed_take_profit.is_some()));
    }
}
