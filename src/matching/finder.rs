//! Candidate search for one bank line
//!
//! Scores every unreconciled ledger transaction near the bank line's date
//! and returns the compatible ones ranked by confidence. Read-only.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::matching::scorer::{score_match, MatchFactors, ScoringConfig};
use crate::traits::ReconciliationStorage;
use crate::types::*;

/// Search window settings for the candidate finder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinderConfig {
    /// Half-width in days of the initial search window around the line date
    pub date_window_days: i64,
    /// Half-width used when the initial window yields too few rows
    pub widened_window_days: i64,
    /// Minimum rows before the window is widened
    pub min_candidates: usize,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            date_window_days: 30,
            widened_window_days: 90,
            min_candidates: 3,
        }
    }
}

/// One ranked candidate match for a bank line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub ledger_transaction_id: String,
    /// Confidence in [0, 100]
    pub score: f64,
    pub factors: MatchFactors,
    /// Ledger transaction date, used for deterministic tie-breaking
    pub date: chrono::NaiveDate,
}

/// Finds and ranks potential ledger matches for bank lines
pub struct CandidateFinder<S: ReconciliationStorage> {
    storage: S,
    scoring: ScoringConfig,
    config: FinderConfig,
}

impl<S: ReconciliationStorage> CandidateFinder<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            scoring: ScoringConfig::default(),
            config: FinderConfig::default(),
        }
    }

    pub fn with_config(storage: S, scoring: ScoringConfig, config: FinderConfig) -> Self {
        Self {
            storage,
            scoring,
            config,
        }
    }

    pub fn scoring_config(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Find ranked candidate matches for one bank line.
    ///
    /// Fails with [`ReconError::AlreadyReconciled`] when the line is
    /// matched, excluded, or flagged reconciled. Candidates are sorted by
    /// score descending, then date ascending, then id ascending, so the
    /// ordering is fully deterministic for a fixed data set.
    pub async fn find_potential_matches(
        &self,
        bank_line_id: &str,
    ) -> ReconResult<Vec<MatchCandidate>> {
        let line = self
            .storage
            .find_bank_line(bank_line_id)
            .await?
            .ok_or_else(|| ReconError::not_found(EntityKind::BankLine, bank_line_id))?;

        if !line.is_matchable() {
            return Err(ReconError::AlreadyReconciled(format!(
                "bank line {} is {:?}",
                line.id, line.reconciliation_status
            )));
        }

        let account = self
            .storage
            .find_account(&line.account_id)
            .await?
            .ok_or_else(|| ReconError::not_found(EntityKind::Account, &line.account_id))?;

        let mut transactions = self
            .candidates_in_window(&account.owner_id, &line, self.config.date_window_days)
            .await?;
        if transactions.len() < self.config.min_candidates
            && self.config.widened_window_days > self.config.date_window_days
        {
            transactions = self
                .candidates_in_window(&account.owner_id, &line, self.config.widened_window_days)
                .await?;
        }

        let mut candidates: Vec<MatchCandidate> = transactions
            .iter()
            .map(|txn| {
                let score = score_match(&self.scoring, &line, txn);
                MatchCandidate {
                    ledger_transaction_id: txn.id.clone(),
                    score: score.total,
                    factors: score.factors,
                    date: txn.date,
                }
            })
            .filter(|candidate| candidate.score > 0.0)
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.date.cmp(&b.date))
                .then_with(|| a.ledger_transaction_id.cmp(&b.ledger_transaction_id))
        });

        Ok(candidates)
    }

    async fn candidates_in_window(
        &self,
        owner_id: &str,
        line: &BankLine,
        half_width_days: i64,
    ) -> ReconResult<Vec<LedgerTransaction>> {
        let start = line.date - Duration::days(half_width_days);
        let end = line.date + Duration::days(half_width_days);
        self.storage
            .list_unreconciled_transactions(owner_id, Some(start), Some(end))
            .await
    }
}
