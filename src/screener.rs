//! Candidate filter
//!
//! Evaluates every symbol of the universe in parallel, applies the admission
//! predicates in a fixed order, and emits a deterministically ranked
//! [`ScreeningRun`]. A failing symbol is rejected with a typed
//! [`RejectionReason`]; it never aborts the batch.

use chrono::NaiveDate;
use indicatif::ProgressBar;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, FilterConfig, TechnicalConfig};
use crate::data::MarketDataProvider;
use crate::risk::{RiskCalculator, StopLoss, TakeProfit};
use crate::scoring::{fundamental_score, ScoreBreakdown, ScoringEngine};
use crate::technical::{MetricsError, Outperformance, TechnicalSnapshot};
use crate::{Fundamentals, PriceSeries, Symbol};

/// Funnel stage at which a symbol dropped out
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    Data,
    History,
    Trend,
    Volume,
    Outperformance,
    Risk,
    Fundamentals,
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FilterStage::Data => "data",
            FilterStage::History => "history",
            FilterStage::Trend => "trend",
            FilterStage::Volume => "volume",
            FilterStage::Outperformance => "outperformance",
            FilterStage::Risk => "risk",
            FilterStage::Fundamentals => "fundamentals",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectionReason {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("bar {bars_back} back is dated {date}, benchmark has {benchmark_date}")]
    DatesMisaligned {
        bars_back: usize,
        date: NaiveDate,
        benchmark_date: NaiveDate,
    },

    #[error("insufficient history: {available} bars, {required} required")]
    InsufficientHistory { required: usize, available: usize },

    #[error("metric computation failed: {0}")]
    Metrics(String),

    #[error("moving averages not stacked (ma21 {ma21:.2}, ma50 {ma50:.2}, ma200 {ma200:.2})")]
    TrendNotAligned { ma21: f64, ma50: f64, ma200: f64 },

    #[error("price {price:.2} neither above ma21 {ma21:.2} nor in the ma50 rebound zone")]
    NoEntryPosition { price: f64, ma21: f64, ma50: f64 },

    #[error("30-day average volume {average:.0} below {minimum:.0}")]
    LowVolume { average: f64, minimum: f64 },

    #[error("{horizon}d outperformance {value:.2}% not above {minimum:.2}%")]
    Underperforming {
        horizon: usize,
        value: f64,
        minimum: f64,
    },

    #[error("risk {risk_percentage:.2}% exceeds {max_allowed:.2}%")]
    RiskTooHigh {
        risk_percentage: f64,
        max_allowed: f64,
    },

    #[error("negative quarterly earnings")]
    NegativeEarnings,
}

impl RejectionReason {
    pub fn stage(&self) -> FilterStage {
        match self {
            RejectionReason::DataUnavailable(_) | RejectionReason::DatesMisaligned { .. } => {
                FilterStage::Data
            }
            RejectionReason::InsufficientHistory { .. } => FilterStage::History,
            RejectionReason::Metrics(_) => FilterStage::Data,
            RejectionReason::TrendNotAligned { .. } | RejectionReason::NoEntryPosition { .. } => {
                FilterStage::Trend
            }
            RejectionReason::LowVolume { .. } => FilterStage::Volume,
            RejectionReason::Underperforming { .. } => FilterStage::Outperformance,
            RejectionReason::RiskTooHigh { .. } => FilterStage::Risk,
            RejectionReason::NegativeEarnings => FilterStage::Fundamentals,
        }
    }
}

impl From<MetricsError> for RejectionReason {
    fn from(err: MetricsError) -> Self {
        match err {
            MetricsError::InsufficientHistory {
                required,
                available,
            } => RejectionReason::InsufficientHistory {
                required,
                available,
            },
            other => RejectionReason::Metrics(other.to_string()),
        }
    }
}

/// Per-stage rejection counts for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterFunnel {
    pub evaluated: usize,
    pub admitted: usize,
    pub rejected: BTreeMap<FilterStage, usize>,
}

impl FilterFunnel {
    pub fn record_rejection(&mut self, reason: &RejectionReason) {
        *self.rejected.entry(reason.stage()).or_insert(0) += 1;
    }

    pub fn rejected_at(&self, stage: FilterStage) -> usize {
        self.rejected.get(&stage).copied().unwrap_or(0)
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }

    /// Share of evaluated symbols admitted (%)
    pub fn admission_rate(&self) -> f64 {
        if self.evaluated == 0 {
            return 0.0;
        }
        self.admitted as f64 / self.evaluated as f64 * 100.0
    }
}

/// One admitted symbol with every level and score term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub symbol: Symbol,
    pub snapshot: TechnicalSnapshot,
    pub outperformance: Outperformance,
    pub stop_loss: StopLoss,
    pub take_profit: TakeProfit,
    pub risk_reward_ratio: f64,
    pub fundamental_score: f64,
    pub score: ScoreBreakdown,
}

impl CandidateResult {
    pub fn final_score(&self) -> f64 {
        self.score.final_score
    }

    pub fn current_price(&self) -> f64 {
        self.snapshot.current_price
    }
}

/// Ranked candidates for one run date; the unit persisted across runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningRun {
    pub run_date: NaiveDate,
    /// Fingerprint of the config that produced the run
    #[serde(default)]
    pub config_hash: String,
    pub candidates: Vec<CandidateResult>,
    #[serde(default)]
    pub funnel: FilterFunnel,
}

impl ScreeningRun {
    /// A slot with no symbols (missing or unreadable history)
    pub fn empty(run_date: NaiveDate) -> Self {
        ScreeningRun {
            run_date,
            config_hash: String::new(),
            candidates: Vec::new(),
            funnel: FilterFunnel::default(),
        }
    }

    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.candidates.iter().map(|c| c.symbol.clone()).collect()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.candidates.iter().any(|c| &c.symbol == symbol)
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&CandidateResult> {
        self.candidates.iter().find(|c| &c.symbol == symbol)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Sort by final score descending, ties by symbol ascending
pub fn rank_candidates(candidates: Vec<CandidateResult>) -> Vec<CandidateResult> {
    candidates
        .into_iter()
        .sorted_by(|a, b| {
            OrderedFloat(b.final_score())
                .cmp(&OrderedFloat(a.final_score()))
                .then_with(|| a.symbol.cmp(&b.symbol))
        })
        .collect()
}

/// Applies the admission predicates and scores survivors
#[derive(Debug, Clone)]
pub struct Screener {
    technical: TechnicalConfig,
    filter: FilterConfig,
    risk: RiskCalculator,
    scoring: ScoringEngine,
    config_hash: String,
}

impl Screener {
    pub fn new(config: &Config) -> Self {
        Screener {
            technical: config.technical.clone(),
            filter: config.filter.clone(),
            risk: RiskCalculator::from_config(config.risk.clone()),
            scoring: ScoringEngine::new(config.scoring.clone(), config.risk.max_allowed_risk),
            config_hash: config.fingerprint(),
        }
    }

    /// Evaluate one symbol; the first failing predicate is returned
    pub fn evaluate(
        &self,
        series: &PriceSeries,
        benchmark_closes: &[f64],
        fundamentals: Option<&Fundamentals>,
    ) -> Result<CandidateResult, RejectionReason> {
        self.check_history(series)?;
        series
            .validate()
            .map_err(|e| RejectionReason::DataUnavailable(e.to_string()))?;

        let snap = TechnicalSnapshot::compute(series, &self.technical)?;
        self.check_trend(&snap)?;

        if snap.avg_volume_30d < self.filter.min_avg_volume {
            return Err(RejectionReason::LowVolume {
                average: snap.avg_volume_30d,
                minimum: self.filter.min_avg_volume,
            });
        }

        let outperformance =
            Outperformance::compute(&series.closes(), benchmark_closes, self.scoring_config())?;
        self.check_outperformance(&outperformance)?;

        let stop_loss = self.risk.stop_loss(&snap);
        let max_allowed = self.risk.config().max_allowed_risk;
        if stop_loss.risk_percentage > max_allowed {
            return Err(RejectionReason::RiskTooHigh {
                risk_percentage: stop_loss.risk_percentage,
                max_allowed,
            });
        }

        if fundamentals.and_then(|f| f.earnings_positive_flag) == Some(false) {
            return Err(RejectionReason::NegativeEarnings);
        }
        let fundamental_score = fundamental_score(fundamentals);

        let breakdown = self.scoring.technical(
            &snap,
            &outperformance,
            stop_loss.risk_percentage,
            fundamental_score,
        );
        let take_profit = self.risk.take_profit(&snap, breakdown.technical_score);
        let risk_reward_ratio = self
            .risk
            .risk_reward_ratio(take_profit.upside_percentage, stop_loss.risk_percentage);
        let score = self.scoring.finalize(breakdown, risk_reward_ratio);

        Ok(CandidateResult {
            symbol: series.symbol.clone(),
            snapshot: snap,
            outperformance,
            stop_loss,
            take_profit,
            risk_reward_ratio,
            fundamental_score,
            score,
        })
    }

    fn check_history(&self, series: &PriceSeries) -> Result<(), RejectionReason> {
        if series.len() < self.technical.min_history_bars {
            return Err(RejectionReason::InsufficientHistory {
                required: self.technical.min_history_bars,
                available: series.len(),
            });
        }
        Ok(())
    }

    /// Outperformance compares bars counted from the end, so the symbol must
    /// share the benchmark's dates at the last bar and at the longest horizon
    pub fn check_dates(&self, series: &PriceSeries, benchmark: &PriceSeries) -> Result<(), RejectionReason> {
        let scoring = self.scoring_config();
        let longest = [
            scoring.momentum_20d.horizon_days,
            scoring.momentum_60d.horizon_days,
            scoring.momentum_90d.horizon_days,
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        for bars_back in [0, longest] {
            let (Some(own), Some(bench)) = (
                series.candles.iter().rev().nth(bars_back),
                benchmark.candles.iter().rev().nth(bars_back),
            ) else {
                continue;
            };
            if own.date != bench.date {
                return Err(RejectionReason::DatesMisaligned {
                    bars_back,
                    date: own.date,
                    benchmark_date: bench.date,
                });
            }
        }
        Ok(())
    }

    fn scoring_config(&self) -> &crate::config::ScoringConfig {
        self.scoring.config()
    }

    fn check_trend(&self, snap: &TechnicalSnapshot) -> Result<(), RejectionReason> {
        let TechnicalSnapshot {
            current_price: price,
            ma21,
            ma50,
            ma200,
            ..
        } = *snap;

        if !(ma21 > ma50 && ma50 > ma200) {
            return Err(RejectionReason::TrendNotAligned { ma21, ma50, ma200 });
        }

        let above_ma21 = price > ma21;
        let ma50_rebound =
            price >= ma50 * self.filter.rebound_floor && price <= ma21 * self.filter.rebound_ceiling;
        if !(above_ma21 || ma50_rebound) {
            return Err(RejectionReason::NoEntryPosition { price, ma21, ma50 });
        }
        Ok(())
    }

    fn check_outperformance(&self, perf: &Outperformance) -> Result<(), RejectionReason> {
        let scoring = self.scoring_config();
        let checks = [
            (scoring.momentum_20d.horizon_days, perf.d20, self.filter.min_outperformance_20d),
            (scoring.momentum_60d.horizon_days, perf.d60, self.filter.min_outperformance_60d),
            (scoring.momentum_90d.horizon_days, perf.d90, self.filter.min_outperformance_90d),
        ];
        for (horizon, value, minimum) in checks {
            if value <= minimum {
                return Err(RejectionReason::Underperforming {
                    horizon,
                    value,
                    minimum,
                });
            }
        }
        Ok(())
    }

    /// Screen the provider's universe against an already-loaded benchmark
    pub fn screen<P: MarketDataProvider + ?Sized>(
        &self,
        provider: &P,
        benchmark: &PriceSeries,
        run_date: NaiveDate,
        progress: Option<&ProgressBar>,
    ) -> ScreeningRun {
        let universe = provider.universe();
        let benchmark_closes = benchmark.closes();
        info!("Screening {} symbols against {}", universe.len(), benchmark.symbol);

        let outcomes: Vec<(Symbol, Result<CandidateResult, RejectionReason>)> = universe
            .par_iter()
            .map(|symbol| {
                let outcome = provider
                    .price_series(symbol)
                    .map_err(|e| RejectionReason::DataUnavailable(e.to_string()))
                    .and_then(|series| {
                        self.check_history(&series)?;
                        self.check_dates(&series, benchmark)?;
                        let fundamentals = provider.fundamentals(symbol);
                        self.evaluate(&series, &benchmark_closes, fundamentals.as_ref())
                    });
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                (symbol.clone(), outcome)
            })
            .collect();

        let mut funnel = FilterFunnel {
            evaluated: outcomes.len(),
            ..FilterFunnel::default()
        };
        let mut admitted = Vec::new();
        for (symbol, outcome) in outcomes {
            match outcome {
                Ok(candidate) => admitted.push(candidate),
                Err(reason) => {
                    debug!("{} rejected: {}", symbol, reason);
                    funnel.record_rejection(&reason);
                }
            }
        }
        funnel.admitted = admitted.len();

        info!(
            "Admitted {}/{} symbols ({:.1}%)",
            funnel.admitted,
            funnel.evaluated,
            funnel.admission_rate()
        );

        ScreeningRun {
            run_date,
            config_hash: self.config_hash.clone(),
            candidates: rank_candidates(admitted),
            funnel,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::risk::{MomentumStrength, StopMethod, TargetMethod};
    use crate::technical::VolatilityRank;

    /// Admitted candidate at price 100 with a 5% stop and a 15% target
    pub(crate) fn candidate(symbol: &str, final_score: f64) -> CandidateResult {
        CandidateResult {
            symbol: Symbol::new(symbol),
            snapshot: TechnicalSnapshot {
                current_price: 100.0,
                atr: 2.5,
                support: 95.0,
                resistance: 112.0,
                historical_volatility: 22.0,
                volatility_rank: VolatilityRank::Medium,
                ma21: 97.0,
                ma50: 92.0,
                ma200: 80.0,
                avg_volume_5d: 2_500_000.0,
                avg_volume_30d: 2_000_000.0,
                volume_surge_pct: 25.0,
            },
            outperformance: Outperformance {
                d20: 6.0,
                d60: 20.0,
                d90: 30.0,
            },
            stop_loss: StopLoss {
                stop_price: 95.0,
                risk_percentage: 5.0,
                methods_used: vec![StopMethod::Atr, StopMethod::Support],
                selected_method: StopMethod::Atr,
                enforced_fallback: false,
            },
            take_profit: TakeProfit {
                target_price: 115.0,
                upside_percentage: 15.0,
                momentum_strength: MomentumStrength::Strong,
                atr_multiplier_used: 3.0,
                method_note: TargetMethod::AtrBased,
            },
            risk_reward_ratio: 3.0,
            fundamental_score: 15.0,
            score: ScoreBreakdown {
                final_score,
                ..ScoreBreakdown::default()
            },
        }
    }
}
