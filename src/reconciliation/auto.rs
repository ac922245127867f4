//! Unattended batch auto-reconciliation
//!
//! Walks an account's unreconciled bank lines in a deterministic order
//! and confirms the best candidate for each when it clears the caller's
//! confidence threshold. Supports a non-mutating dry-run mode.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::reconciliation::engine::{MatchOptions, ReconciliationEngine};
use crate::traits::{BankLineFilter, ReconciliationStorage};
use crate::types::*;
use crate::utils::validation::validate_confidence;

/// Settings for one auto-reconciliation run
#[derive(Debug, Clone)]
pub struct AutoReconcileOptions {
    /// Minimum candidate score (0-100) required to confirm a match
    pub min_confidence: f64,
    /// Record suggestions instead of writing matches
    pub dry_run: bool,
    /// Cap on bank lines processed, so a large account cannot run
    /// unbounded
    pub max_items: Option<usize>,
}

impl Default for AutoReconcileOptions {
    fn default() -> Self {
        Self {
            min_confidence: 80.0,
            dry_run: false,
            max_items: None,
        }
    }
}

/// A match the runner would have made in dry-run mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub bank_line_id: String,
    pub ledger_transaction_id: String,
    pub score: f64,
}

/// A bank line the runner passed over, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub bank_line_id: String,
    pub reason: String,
}

/// Outcome of one auto-reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoReconcileReport {
    /// Matches confirmed (always 0 in dry-run mode)
    pub matched_count: usize,
    /// Populated only in dry-run mode
    pub suggestions: Vec<MatchSuggestion>,
    pub skipped: Vec<SkippedLine>,
}

impl<S: ReconciliationStorage + Clone> ReconciliationEngine<S> {
    /// Auto-reconcile an account's unreconciled bank lines.
    ///
    /// Lines are processed ascending by date then id. A ledger
    /// transaction consumed (or, in dry-run mode, suggested) earlier in
    /// the run is reserved and never offered to a later line, so one run
    /// never double-claims. The reservation is scoped to this run only;
    /// the storage uniqueness constraint remains the cross-run backstop.
    pub async fn auto_reconcile(
        &mut self,
        account_id: &str,
        user_id: &str,
        options: AutoReconcileOptions,
    ) -> ReconResult<AutoReconcileReport> {
        validate_confidence(options.min_confidence)?;
        let account = self
            .storage
            .find_account(account_id)
            .await?
            .ok_or_else(|| ReconError::not_found(EntityKind::Account, account_id))?;
        if account.owner_id != user_id {
            return Err(ReconError::AccessDenied(format!(
                "account {} does not belong to user {}",
                account.id, user_id
            )));
        }

        let mut lines = self
            .storage
            .list_bank_lines(account_id, BankLineFilter::matchable())
            .await?;
        lines.retain(|l| l.reconciliation_status != BankLineStatus::Excluded);
        lines.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        if let Some(cap) = options.max_items {
            lines.truncate(cap);
        }

        let mut report = AutoReconcileReport::default();
        let mut reserved: HashSet<String> = HashSet::new();

        for line in lines {
            let candidates = match self.finder.find_potential_matches(&line.id).await {
                Ok(candidates) => candidates,
                Err(ReconError::AlreadyReconciled(reason)) => {
                    report.skipped.push(SkippedLine {
                        bank_line_id: line.id,
                        reason,
                    });
                    continue;
                }
                Err(other) => return Err(other),
            };

            let best = candidates
                .into_iter()
                .find(|c| !reserved.contains(&c.ledger_transaction_id));
            let Some(best) = best else {
                report.skipped.push(SkippedLine {
                    bank_line_id: line.id,
                    reason: "no candidates available".to_string(),
                });
                continue;
            };
            if best.score < options.min_confidence {
                report.skipped.push(SkippedLine {
                    bank_line_id: line.id,
                    reason: format!(
                        "best candidate scored {:.1}, below threshold {:.1}",
                        best.score, options.min_confidence
                    ),
                });
                continue;
            }

            if options.dry_run {
                reserved.insert(best.ledger_transaction_id.clone());
                report.suggestions.push(MatchSuggestion {
                    bank_line_id: line.id,
                    ledger_transaction_id: best.ledger_transaction_id,
                    score: best.score,
                });
                continue;
            }

            match self
                .orchestrator
                .create_match(
                    &line.id,
                    &best.ledger_transaction_id,
                    user_id,
                    MatchOptions::default(),
                )
                .await
            {
                Ok(_) => {
                    reserved.insert(best.ledger_transaction_id);
                    report.matched_count += 1;
                }
                // Lost a race with a concurrent writer; skip, don't abort.
                Err(ReconError::AlreadyReconciled(reason))
                | Err(ReconError::ConcurrencyConflict(reason)) => {
                    reserved.insert(best.ledger_transaction_id);
                    report.skipped.push(SkippedLine {
                        bank_line_id: line.id,
                        reason,
                    });
                }
                Err(other) => return Err(other),
            }
        }

        debug!(
            account = %account_id,
            matched = report.matched_count,
            suggested = report.suggestions.len(),
            skipped = report.skipped.len(),
            dry_run = options.dry_run,
            "auto-reconciliation run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::engine::ReconciliationEngine;
    use crate::traits::{BankLineStore, LedgerTransactionStore};
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded_storage() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.put_account(Account {
            id: "acc1".to_string(),
            owner_id: "user1".to_string(),
            name: "Current".to_string(),
        });
        storage
    }

    fn credit_line(storage: &MemoryStorage, id: &str, day: u32, amount: i64, desc: &str) {
        storage.put_bank_line(BankLine::new(
            id.to_string(),
            "acc1".to_string(),
            date(2026, 1, day),
            desc.to_string(),
            Direction::Credit,
            amount,
        ));
    }

    fn income_txn(storage: &MemoryStorage, id: &str, day: u32, amount: i64, desc: &str) {
        storage.put_ledger_transaction(LedgerTransaction::new(
            id.to_string(),
            "user1".to_string(),
            LedgerKind::Income,
            date(2026, 1, day),
            desc.to_string(),
            amount,
        ));
    }

    #[tokio::test]
    async fn matches_high_confidence_lines() {
        let storage = seeded_storage();
        credit_line(&storage, "bl1", 10, 25000, "Invoice settlement Zenith Ltd");
        credit_line(&storage, "bl2", 12, 40000, "Retainer payment Apex Media");
        income_txn(&storage, "tx1", 10, 25000, "Invoice settlement Zenith Ltd");
        income_txn(&storage, "tx2", 12, 40000, "Retainer payment Apex Media");
        let mut engine = ReconciliationEngine::new(storage.clone());

        let report = engine
            .auto_reconcile("acc1", "user1", AutoReconcileOptions::default())
            .await
            .unwrap();
        assert_eq!(report.matched_count, 2);
        assert!(report.suggestions.is_empty());
        assert!(report.skipped.is_empty());
        assert_eq!(storage.reconciliation_count(), 2);
    }

    #[tokio::test]
    async fn consumed_transaction_is_not_offered_again() {
        let storage = seeded_storage();
        // Two identical lines competing for one ledger transaction.
        credit_line(&storage, "bl1", 10, 25000, "Invoice settlement Zenith Ltd");
        credit_line(&storage, "bl2", 10, 25000, "Invoice settlement Zenith Ltd");
        income_txn(&storage, "tx1", 10, 25000, "Invoice settlement Zenith Ltd");
        let mut engine = ReconciliationEngine::new(storage.clone());

        let report = engine
            .auto_reconcile("acc1", "user1", AutoReconcileOptions::default())
            .await
            .unwrap();
        assert_eq!(report.matched_count, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].bank_line_id, "bl2");
        assert_eq!(storage.reconciliation_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let storage = seeded_storage();
        credit_line(&storage, "bl1", 10, 25000, "Invoice settlement Zenith Ltd");
        income_txn(&storage, "tx1", 10, 25000, "Invoice settlement Zenith Ltd");
        let mut engine = ReconciliationEngine::new(storage.clone());

        let report = engine
            .auto_reconcile(
                "acc1",
                "user1",
                AutoReconcileOptions {
                    dry_run: true,
                    ..AutoReconcileOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(report.matched_count, 0);
        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.suggestions[0].bank_line_id, "bl1");
        assert_eq!(report.suggestions[0].ledger_transaction_id, "tx1");

        // Zero rows written, zero status flags touched.
        assert_eq!(storage.reconciliation_count(), 0);
        let line = storage.find_bank_line("bl1").await.unwrap().unwrap();
        assert_eq!(line.reconciliation_status, BankLineStatus::Unmatched);
        assert!(!line.is_reconciled);
        let txn = storage.find_ledger_transaction("tx1").await.unwrap().unwrap();
        assert_eq!(txn.status, LedgerStatus::Cleared);
    }

    #[tokio::test]
    async fn dry_run_reserves_within_the_run() {
        let storage = seeded_storage();
        credit_line(&storage, "bl1", 10, 25000, "Invoice settlement Zenith Ltd");
        credit_line(&storage, "bl2", 10, 25000, "Invoice settlement Zenith Ltd");
        income_txn(&storage, "tx1", 10, 25000, "Invoice settlement Zenith Ltd");
        let mut engine = ReconciliationEngine::new(storage);

        let report = engine
            .auto_reconcile(
                "acc1",
                "user1",
                AutoReconcileOptions {
                    dry_run: true,
                    ..AutoReconcileOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn low_confidence_candidates_are_skipped() {
        let storage = seeded_storage();
        credit_line(&storage, "bl1", 10, 25000, "Invoice settlement Zenith Ltd");
        // Wrong amount, distant date, unrelated description.
        income_txn(&storage, "tx1", 30, 26500, "Something else entirely");
        let mut engine = ReconciliationEngine::new(storage.clone());

        let report = engine
            .auto_reconcile(
                "acc1",
                "user1",
                AutoReconcileOptions {
                    min_confidence: 90.0,
                    ..AutoReconcileOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(report.matched_count, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(storage.reconciliation_count(), 0);
    }

    #[tokio::test]
    async fn max_items_caps_the_run() {
        let storage = seeded_storage();
        for i in 1..=4u32 {
            credit_line(
                &storage,
                &format!("bl{i}"),
                10 + i,
                10000,
                "Weekly subscription payout",
            );
            income_txn(
                &storage,
                &format!("tx{i}"),
                10 + i,
                10000,
                "Weekly subscription payout",
            );
        }
        let mut engine = ReconciliationEngine::new(storage.clone());

        let report = engine
            .auto_reconcile(
                "acc1",
                "user1",
                AutoReconcileOptions {
                    max_items: Some(2),
                    ..AutoReconcileOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(report.matched_count, 2);
        assert_eq!(storage.reconciliation_count(), 2);
        // Lines are processed ascending by date, so the earliest two won.
        for id in ["bl1", "bl2"] {
            let line = storage.find_bank_line(id).await.unwrap().unwrap();
            assert!(line.is_reconciled);
        }
    }

    #[tokio::test]
    async fn invalid_threshold_is_rejected() {
        let storage = seeded_storage();
        let mut engine = ReconciliationEngine::new(storage);
        for bad in [-1.0, 100.5, f64::NAN] {
            let err = engine
                .auto_reconcile(
                    "acc1",
                    "user1",
                    AutoReconcileOptions {
                        min_confidence: bad,
                        ..AutoReconcileOptions::default()
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ReconError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn unknown_account_and_foreign_user_fail() {
        let storage = seeded_storage();
        let mut engine = ReconciliationEngine::new(storage);

        let err = engine
            .auto_reconcile("missing", "user1", AutoReconcileOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::NotFound { .. }));

        let err = engine
            .auto_reconcile("acc1", "intruder", AutoReconcileOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::AccessDenied(_)));
    }
}
