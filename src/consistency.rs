//! Consistency tracker
//!
//! Aggregates the rolling window of runs into per-symbol frequency, streak,
//! score, category and trend. Records are rebuilt from the window on every
//! run; nothing is updated incrementally.

use chrono::NaiveDate;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::ConsistencyConfig;
use crate::screener::ScreeningRun;
use crate::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ConsistentWinner,
    StrongCandidate,
    Emerging,
    NewlyEmerged,
    Disappeared,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::ConsistentWinner => "consistent_winner",
            Category::StrongCandidate => "strong_candidate",
            Category::Emerging => "emerging",
            Category::NewlyEmerged => "newly_emerged",
            Category::Disappeared => "disappeared",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendLabel {
    Accelerating,
    Strengthening,
    Emerging,
    Fading,
    Stable,
}

impl std::fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrendLabel::Accelerating => "ACCELERATING",
            TrendLabel::Strengthening => "STRENGTHENING",
            TrendLabel::Emerging => "EMERGING",
            TrendLabel::Fading => "FADING",
            TrendLabel::Stable => "STABLE",
        };
        f.pad(name)
    }
}

/// Symbol sets of the last W runs, oldest first; the current run is the last slot
#[derive(Debug, Clone, PartialEq)]
pub struct RunWindow {
    slots: Vec<BTreeSet<Symbol>>,
    dates: Vec<Option<NaiveDate>>,
}

impl RunWindow {
    /// Take the last `size` runs (oldest first), padding missing slots with empty runs
    pub fn from_runs<'a>(runs: impl IntoIterator<Item = &'a ScreeningRun>, size: usize) -> Self {
        let runs: Vec<&ScreeningRun> = runs.into_iter().collect();
        let kept = &runs[runs.len().saturating_sub(size)..];
        let padding = size - kept.len();

        let slots = std::iter::repeat_with(BTreeSet::new)
            .take(padding)
            .chain(kept.iter().map(|run| run.symbols()))
            .collect();
        let dates = std::iter::repeat(None)
            .take(padding)
            .chain(kept.iter().map(|run| Some(run.run_date)))
            .collect();

        RunWindow { slots, dates }
    }

    /// Window of `prior` runs followed by `current`
    pub fn with_current(prior: &[ScreeningRun], current: &ScreeningRun, size: usize) -> Self {
        Self::from_runs(prior.iter().chain(std::iter::once(current)), size)
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn dates(&self) -> &[Option<NaiveDate>] {
        &self.dates
    }

    /// Presence per slot, oldest first
    pub fn presence(&self, symbol: &Symbol) -> Vec<bool> {
        self.slots.iter().map(|slot| slot.contains(symbol)).collect()
    }

    pub fn all_symbols(&self) -> BTreeSet<Symbol> {
        self.slots.iter().flatten().cloned().collect()
    }

    fn slot_from_end(&self, back: usize) -> Option<&BTreeSet<Symbol>> {
        self.slots.len().checked_sub(back + 1).map(|i| &self.slots[i])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyRecord {
    pub symbol: Symbol,
    pub frequency: usize,
    /// 1-based slot positions, ascending
    pub run_indices_appeared: Vec<usize>,
    pub longest_streak: usize,
    pub present_now: bool,
    /// Consecutive most recent runs the symbol was missing from
    pub trailing_absence: usize,
    pub consistency_score: f64,
    pub category: Category,
    pub trend: TrendLabel,
}

/// Symbols entering, leaving and staying between the last two runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendChanges {
    pub new_entries: Vec<Symbol>,
    pub dropped: Vec<Symbol>,
    pub continuing: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub window_size: usize,
    pub run_dates: Vec<Option<NaiveDate>>,
    /// Sorted by consistency score descending, ties by symbol
    pub records: Vec<ConsistencyRecord>,
    pub categories: BTreeMap<Category, Vec<Symbol>>,
    pub changes: TrendChanges,
}

impl ConsistencyReport {
    pub fn get(&self, symbol: &Symbol) -> Option<&ConsistencyRecord> {
        self.records.iter().find(|r| &r.symbol == symbol)
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &ConsistencyRecord> {
        self.records.iter().filter(move |r| r.category == category)
    }
}

/// Longest run of consecutive `true` values
fn longest_streak(presence: &[bool]) -> usize {
    presence
        .iter()
        .fold((0usize, 0usize), |(best, current), &present| {
            let current = if present { current + 1 } else { 0 };
            (best.max(current), current)
        })
        .0
}

#[derive(Debug, Clone, Default)]
pub struct ConsistencyTracker {
    config: ConsistencyConfig,
}

impl ConsistencyTracker {
    pub fn new(config: ConsistencyConfig) -> Self {
        ConsistencyTracker { config }
    }

    pub fn window_size(&self) -> usize {
        self.config.window_size
    }

    pub fn categorize(&self, frequency: usize, present_now: bool) -> Category {
        let cfg = &self.config;
        if frequency >= cfg.consistent_winner_min {
            Category::ConsistentWinner
        } else if frequency >= cfg.strong_candidate_min {
            Category::StrongCandidate
        } else if frequency >= cfg.emerging_min {
            Category::Emerging
        } else if present_now {
            Category::NewlyEmerged
        } else {
            Category::Disappeared
        }
    }

    /// Classify presence over the most recent slots (oldest first, current last)
    pub fn trend(&self, presence: &[bool]) -> TrendLabel {
        let span = self.config.recent_span.min(presence.len());
        let recent = &presence[presence.len() - span..];
        let present_now = recent.last().copied().unwrap_or(false);
        let present_before = recent.len() >= 2 && recent[recent.len() - 2];
        let count = recent.iter().filter(|&&p| p).count();

        if span > 0 && count == span {
            TrendLabel::Accelerating
        } else if count >= 2 {
            TrendLabel::Strengthening
        } else if present_now {
            TrendLabel::Emerging
        } else if !present_before {
            TrendLabel::Fading
        } else {
            TrendLabel::Stable
        }
    }

    pub fn record(&self, window: &RunWindow, symbol: &Symbol) -> ConsistencyRecord {
        let cfg = &self.config;
        let presence = window.presence(symbol);
        let size = presence.len();

        let run_indices_appeared: Vec<usize> = presence
            .iter()
            .positions(|&p| p)
            .map(|i| i + 1)
            .collect();
        let frequency = run_indices_appeared.len();
        let streak = longest_streak(&presence);
        let present_now = presence.last().copied().unwrap_or(false);
        let trailing_absence = presence.iter().rev().take_while(|&&p| !p).count();

        let recent = &presence[size.saturating_sub(cfg.recent_span)..];
        let mut recency = 0.0;
        if present_now {
            recency += cfg.recent_bonus;
        }
        if recent.iter().filter(|&&p| p).count() >= 2 {
            recency += cfg.recent_majority_bonus;
        }

        let consistency_score = if frequency == 0 || size == 0 {
            0.0
        } else {
            frequency as f64 / size as f64 * 100.0
                + streak as f64 / frequency as f64 * cfg.streak_weight
                + recency
        };

        ConsistencyRecord {
            symbol: symbol.clone(),
            frequency,
            run_indices_appeared,
            longest_streak: streak,
            present_now,
            trailing_absence,
            consistency_score,
            category: self.categorize(frequency, present_now),
            trend: self.trend(&presence),
        }
    }

    /// Full report over every symbol seen anywhere in the window
    pub fn report(&self, window: &RunWindow) -> ConsistencyReport {
        let records: Vec<ConsistencyRecord> = window
            .all_symbols()
            .iter()
            .map(|symbol| self.record(window, symbol))
            .sorted_by(|a, b| {
                OrderedFloat(b.consistency_score)
                    .cmp(&OrderedFloat(a.consistency_score))
                    .then_with(|| a.symbol.cmp(&b.symbol))
            })
            .collect();

        let mut categories: BTreeMap<Category, Vec<Symbol>> = BTreeMap::new();
        for record in &records {
            categories
                .entry(record.category)
                .or_default()
                .push(record.symbol.clone());
        }

        ConsistencyReport {
            window_size: window.size(),
            run_dates: window.dates().to_vec(),
            records,
            categories,
            changes: trend_changes(window),
        }
    }
}

fn trend_changes(window: &RunWindow) -> TrendChanges {
    let empty = BTreeSet::new();
    let current = window.slot_from_end(0).unwrap_or(&empty);
    let previous = window.slot_from_end(1).unwrap_or(&empty);

    TrendChanges {
        new_entries: current.difference(previous).cloned().collect(),
        dropped: previous.difference(current).cloned().collect(),
        continuing: current.intersection(previous).cloned().collect(),
    }
}
