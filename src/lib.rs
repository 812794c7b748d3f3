//! Momentum Screener
//!
//! Screens a universe of instruments for sustainable benchmark-beating
//! momentum, computes risk-managed stop and target levels, tracks how
//! persistently each symbol qualifies across runs, and turns that history into
//! hold/exit/buy decisions for an existing portfolio.

pub mod config;
pub mod consistency;
pub mod data;
pub mod indicators;
pub mod pipeline;
pub mod risk;
pub mod rotation;
pub mod scoring;
pub mod screener;
pub mod store;
pub mod symbols;
pub mod technical;
pub mod types;

pub use config::Config;
pub use consistency::{Category, ConsistencyRecord, ConsistencyReport, ConsistencyTracker, TrendLabel};
pub use pipeline::{CycleOutcome, PipelineError, RunCycle};
pub use rotation::{Action, Confidence, RotationPlan, RotationRecommendation};
pub use screener::{CandidateResult, RejectionReason, Screener, ScreeningRun};
pub use store::{MemoryRunStore, RunStore, SqliteRunStore};
pub use types::*;
