//! Run cycle
//!
//! One complete run: benchmark → screen → window → consistency → rotation →
//! persist. The run is persisted only after every stage succeeded, so a
//! failed cycle leaves the store untouched.

use chrono::NaiveDate;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::consistency::{ConsistencyReport, ConsistencyTracker, RunWindow};
use crate::data::{DataError, MarketDataProvider};
use crate::rotation::{RotationEngine, RotationPlan};
use crate::screener::{Screener, ScreeningRun};
use crate::store::{RunStore, StoreError};
use crate::Portfolio;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("benchmark series unavailable: {0}")]
    BenchmarkUnavailable(#[source] DataError),

    #[error("benchmark has {available} bars, {required} required")]
    BenchmarkTooShort { required: usize, available: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything one cycle produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub run: ScreeningRun,
    pub consistency: ConsistencyReport,
    pub plan: RotationPlan,
}

pub struct RunCycle {
    screener: Screener,
    tracker: ConsistencyTracker,
    rotation: RotationEngine,
    required_benchmark_bars: usize,
    progress: Option<ProgressBar>,
}

impl RunCycle {
    pub fn new(config: &Config) -> Self {
        let scoring = &config.scoring;
        let longest_horizon = [
            scoring.momentum_20d.horizon_days,
            scoring.momentum_60d.horizon_days,
            scoring.momentum_90d.horizon_days,
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        RunCycle {
            screener: Screener::new(config),
            tracker: ConsistencyTracker::new(config.consistency.clone()),
            rotation: RotationEngine::new(config.rotation.clone(), config.consistency.window_size),
            required_benchmark_bars: longest_horizon + 1,
            progress: None,
        }
    }

    /// Report per-symbol progress on the given bar
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn execute<P, S>(
        &self,
        provider: &P,
        store: &S,
        portfolio: &Portfolio,
        run_date: NaiveDate,
    ) -> Result<CycleOutcome, PipelineError>
    where
        P: MarketDataProvider + ?Sized,
        S: RunStore + ?Sized,
    {
        let benchmark = provider
            .benchmark_series()
            .map_err(PipelineError::BenchmarkUnavailable)?;
        if benchmark.len() < self.required_benchmark_bars {
            return Err(PipelineError::BenchmarkTooShort {
                required: self.required_benchmark_bars,
                available: benchmark.len(),
            });
        }

        let run = self
            .screener
            .screen(provider, &benchmark, run_date, self.progress.as_ref());
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        // only earlier runs, so the current run is always the newest slot
        let window_size = self.tracker.window_size();
        let prior = store.get_runs_before(run_date, window_size.saturating_sub(1))?;

        let window = RunWindow::with_current(&prior, &run, window_size);
        let consistency = self.tracker.report(&window);
        let plan = self.rotation.plan(portfolio, &consistency, &run);

        store.append_run(&run)?;
        info!(
            "Cycle {} complete: {} candidates, {} symbols tracked, {} holdings reviewed",
            run_date,
            run.len(),
            consistency.records.len(),
            plan.holdings.len()
        );

        Ok(CycleOutcome {
            run,
            consistency,
            plan,
        })
    }

    /// Consistency report over stored runs only, the latest acting as current
    pub fn stored_report<S: RunStore + ?Sized>(&self, store: &S) -> Result<Option<ConsistencyReport>, PipelineError> {
        let runs = store.get_recent_runs(self.tracker.window_size())?;
        if runs.is_empty() {
            return Ok(None);
        }
        let window = RunWindow::from_runs(&runs, self.tracker.window_size());
        Ok(Some(self.tracker.report(&window)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryDataProvider;
    use crate::store::MemoryRunStore;
    use crate::{Candle, PriceSeries, Symbol};
    use chrono::Duration;

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + Duration::days(i as i64)
    }

    fn series(symbol: &str, bars: usize, daily: f64) -> PriceSeries {
        let candles = (0..bars)
            .map(|i| {
                let wiggle = if i % 4 < 2 { 1.004 } else { 0.996 };
                let close = 50.0 * (1.0 + daily).powi(i as i32) * wiggle;
                Candle::new_unchecked(day(i), close, close * 1.01, close * 0.99, close, 3_000_000.0)
            })
            .collect();
        PriceSeries::new(Symbol::new(symbol), candles)
    }

    #[test]
    fn test_missing_benchmark_is_fatal_and_persists_nothing() {
        let provider = MemoryDataProvider::new().with_series(series("AAA", 260, 0.004));
        let store = MemoryRunStore::new();
        let cycle = RunCycle::new(&Config::default());

        let result = cycle.execute(&provider, &store, &Portfolio::new(), day(260));
        assert!(matches!(result, Err(PipelineError::BenchmarkUnavailable(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_short_benchmark_is_fatal() {
        let provider = MemoryDataProvider::new()
            .with_benchmark(series("SPY", 40, 0.0))
            .with_series(series("AAA", 260, 0.004));
        let store = MemoryRunStore::new();
        let result = RunCycle::new(&Config::default()).execute(&provider, &store, &Portfolio::new(), day(260));

        assert!(matches!(
            result,
            Err(PipelineError::BenchmarkTooShort { required: 91, available: 40 })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_cycle_persists_run_and_tracks_window() {
        let provider = MemoryDataProvider::new()
            .with_benchmark(series("SPY", 260, 0.0))
            .with_series(series("AAA", 260, 0.004))
            .with_series(series("BBB", 260, -0.002));
        let store = MemoryRunStore::new();
        let cycle = RunCycle::new(&Config::default());

        for i in 0..3 {
            let outcome = cycle
                .execute(&provider, &store, &Portfolio::new(), day(300 + i))
                .unwrap();
            assert_eq!(outcome.run.symbols().len(), 1);
            let record = outcome.consistency.get(&Symbol::new("AAA")).unwrap();
            assert_eq!(record.frequency, i + 1);
        }
        assert_eq!(store.len(), 3);

        // re-running a date replaces it instead of double counting
        let rerun = cycle
            .execute(&provider, &store, &Portfolio::new(), day(302))
            .unwrap();
        assert_eq!(rerun.consistency.get(&Symbol::new("AAA")).unwrap().frequency, 3);
        assert_eq!(store.len(), 3);

        let report = cycle.stored_report(&store).unwrap().unwrap();
        assert_eq!(report.get(&Symbol::new("AAA")).unwrap().frequency, 3);
    }

    #[test]
    fn test_backdated_run_only_sees_earlier_runs() {
        let store = MemoryRunStore::new();
        let cycle = RunCycle::new(&Config::default());
        let leading = MemoryDataProvider::new()
            .with_benchmark(series("SPY", 260, 0.0))
            .with_series(series("AAA", 260, 0.004));
        let lagging = MemoryDataProvider::new()
            .with_benchmark(series("SPY", 260, 0.0))
            .with_series(series("AAA", 260, -0.002));

        // AAA qualifies on 300..=304, not on 305 and 306
        for i in 0..7 {
            let provider = if i < 5 { &leading } else { &lagging };
            cycle.execute(provider, &store, &Portfolio::new(), day(300 + i)).unwrap();
        }

        let rerun = cycle
            .execute(&leading, &store, &Portfolio::new(), day(302))
            .unwrap();
        let dates = &rerun.consistency.run_dates;
        assert_eq!(dates.last().copied().flatten(), Some(day(302)));
        let known: Vec<NaiveDate> = dates.iter().flatten().copied().collect();
        assert!(known.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(known, vec![day(300), day(301), day(302)]);

        let record = rerun.consistency.get(&Symbol::new("AAA")).unwrap();
        assert!(record.present_now);
        assert_eq!(record.frequency, 3);
        assert_eq!(record.run_indices_appeared, vec![5, 6, 7]);
        assert_eq!(store.len(), 7);
    }
}
