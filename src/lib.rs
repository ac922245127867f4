//! # Reconciliation Core
//!
//! A bank statement reconciliation engine: proposes confidence-scored
//! candidate matches between imported bank lines and internally recorded
//! ledger transactions, confirms and reverses matches while keeping both
//! sides' status flags consistent, runs unattended batch
//! auto-reconciliation, and reports balance discrepancies.
//!
//! ## Features
//!
//! - **Multi-factor match scoring**: amount, date, description overlap,
//!   and reference factors with configurable weights
//! - **Candidate search**: ranked, deterministic, read-only
//! - **Atomic match orchestration**: confirm, reverse, and bulk-reverse
//!   with a uniqueness backstop against concurrent double-claims
//! - **Batch auto-reconciliation**: threshold-driven, with in-run
//!   reservation and a non-mutating dry-run mode
//! - **Status & balance reporting**: progress, unreconciled totals, and
//!   bank-vs-book discrepancy
//! - **Storage abstraction**: database-agnostic design with trait-based
//!   stores; an in-memory backend ships in `utils`
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{MemoryStorage, ReconciliationEngine};
//!
//! // Seed MemoryStorage (or implement the store traits for your own
//! // backend), then drive everything through the engine:
//! let engine = ReconciliationEngine::new(MemoryStorage::new());
//! # let _ = engine;
//! ```

pub mod matching;
pub mod reconciliation;
pub mod status;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use matching::*;
pub use reconciliation::*;
pub use status::*;
pub use traits::*;
pub use types::*;
pub use utils::MemoryStorage;
