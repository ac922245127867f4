//! Match orchestration and batch auto-reconciliation

pub mod auto;
pub mod engine;

pub use auto::{AutoReconcileOptions, AutoReconcileReport, MatchSuggestion, SkippedLine};
pub use engine::{
    MatchOptions, MatchOrchestrator, MatchOutcome, ReconciliationEngine, UnreconcileOutcome,
};
