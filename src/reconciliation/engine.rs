//! Match orchestration: confirm, reverse, and bulk-reverse reconciliations
//!
//! The orchestrator is the only writer of bank line and ledger transaction
//! status flags. Every mutation goes through one of the atomic composite
//! operations on [`ReconciliationStorage`] so the reconciliation row and
//! both status flags change together.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::matching::{
    are_types_compatible, score_match, CandidateFinder, FinderConfig, MatchCandidate,
    ScoringConfig,
};
use crate::status::{
    BalanceReport, FullStatus, LastReconciliationInfo, StatusAggregator, StatusSummary,
    UnreconciledTotals, UserStatusRollup,
};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_match_amount;

/// Optional overrides for [`MatchOrchestrator::create_match`]
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    /// Portion of the bank line to cover; defaults to the smaller of the
    /// line's remaining unmatched amount and the transaction amount
    pub match_amount: Option<i64>,
    /// Override the inferred match type
    pub match_type: Option<MatchType>,
    /// Forced by a user; skips confidence scoring
    pub manual: bool,
    pub notes: Option<String>,
}

/// Records written by a successful `create_match`, returned with their
/// post-match state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub reconciliation: Reconciliation,
    pub bank_line: BankLine,
    pub ledger_transaction: LedgerTransaction,
}

/// Result of bulk-reversing a bank line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreconcileOutcome {
    /// Confirmed reconciliations removed
    pub removed_count: usize,
    pub bank_line: BankLine,
}

/// Confirms and reverses matches while keeping the bank line and ledger
/// transaction status flags consistent with the reconciliation rows
pub struct MatchOrchestrator<S: ReconciliationStorage> {
    storage: S,
    scoring: ScoringConfig,
}

impl<S: ReconciliationStorage> MatchOrchestrator<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            scoring: ScoringConfig::default(),
        }
    }

    pub fn with_scoring(storage: S, scoring: ScoringConfig) -> Self {
        Self { storage, scoring }
    }

    /// Pre-flight check of a prospective match.
    ///
    /// Type incompatibility is a hard error; an amount mismatch is only a
    /// warning, since partial and manual matches are legitimate.
    pub async fn validate_match(
        &self,
        bank_line_id: &str,
        ledger_transaction_id: &str,
    ) -> ReconResult<ValidationReport> {
        let line = self.require_bank_line(bank_line_id).await?;
        let transaction = self.require_ledger_transaction(ledger_transaction_id).await?;

        let mut issues = Vec::new();
        if !are_types_compatible(line.direction, transaction.kind) {
            issues.push(ValidationIssue::error(
                "incompatible_types",
                format!(
                    "a {:?} bank line cannot match a {:?} transaction",
                    line.direction, transaction.kind
                ),
            ));
        }
        if line.amount != transaction.amount {
            issues.push(ValidationIssue::warning(
                "amount_mismatch",
                format!(
                    "bank line amount {} differs from transaction amount {}",
                    line.amount, transaction.amount
                ),
            ));
        }

        Ok(ValidationReport::from_issues(issues))
    }

    /// Confirm a match between a bank line and a ledger transaction.
    ///
    /// Inserts a confirmed reconciliation, moves the line to `matched` or
    /// `partial`, and marks the transaction `reconciled`, all as one
    /// atomic unit. The storage uniqueness constraint on the confirmed
    /// pair is the backstop against concurrent duplicates.
    pub async fn create_match(
        &mut self,
        bank_line_id: &str,
        ledger_transaction_id: &str,
        user_id: &str,
        options: MatchOptions,
    ) -> ReconResult<MatchOutcome> {
        let mut line = self.require_bank_line(bank_line_id).await?;
        let account = self.require_account(&line.account_id).await?;
        let mut transaction = self.require_ledger_transaction(ledger_transaction_id).await?;
        self.check_ownership(&account, &transaction, user_id)?;

        if !line.is_matchable() {
            return Err(ReconError::AlreadyReconciled(format!(
                "bank line {} is {:?}",
                line.id, line.reconciliation_status
            )));
        }
        match transaction.status {
            LedgerStatus::Reconciled => {
                return Err(ReconError::AlreadyReconciled(format!(
                    "ledger transaction {} is already reconciled",
                    transaction.id
                )));
            }
            LedgerStatus::Void => {
                return Err(ReconError::InvalidInput(format!(
                    "ledger transaction {} is void",
                    transaction.id
                )));
            }
            LedgerStatus::Pending | LedgerStatus::Cleared => {}
        }

        let existing = self
            .storage
            .list_reconciliations_for_bank_line(&line.id)
            .await?;
        let confirmed: Vec<&Reconciliation> =
            existing.iter().filter(|r| r.is_confirmed()).collect();
        if confirmed
            .iter()
            .any(|r| r.ledger_transaction_id == transaction.id)
        {
            return Err(ReconError::AlreadyReconciled(format!(
                "bank line {} is already matched to ledger transaction {}",
                line.id, transaction.id
            )));
        }

        if !are_types_compatible(line.direction, transaction.kind) {
            return Err(ReconError::IncompatibleTypes {
                direction: line.direction,
                kind: transaction.kind,
            });
        }

        let covered: i64 = confirmed.iter().map(|r| r.match_amount).sum();
        let remaining = line.amount - covered;
        let match_amount = options
            .match_amount
            .unwrap_or_else(|| remaining.min(transaction.amount));
        validate_match_amount(match_amount)?;
        if match_amount > remaining {
            return Err(ReconError::InvalidInput(format!(
                "match amount {} exceeds the line's remaining unmatched amount {}",
                match_amount, remaining
            )));
        }

        let match_confidence = if options.manual {
            None
        } else {
            Some(score_match(&self.scoring, &line, &transaction).total)
        };
        let match_type = options.match_type.unwrap_or_else(|| {
            if options.manual {
                MatchType::Manual
            } else if !confirmed.is_empty() {
                MatchType::Split
            } else if match_amount == line.amount && line.amount == transaction.amount {
                MatchType::Exact
            } else {
                MatchType::Partial
            }
        });

        let mut reconciliation = Reconciliation::confirmed(
            line.id.clone(),
            transaction.id.clone(),
            match_amount,
            match_type,
            match_confidence,
            transaction.status,
            user_id.to_string(),
        );
        reconciliation.notes = options.notes;

        let new_status = if covered + match_amount >= line.amount {
            BankLineStatus::Matched
        } else {
            BankLineStatus::Partial
        };
        let is_reconciled = new_status == BankLineStatus::Matched;

        if let Err(err) = self
            .storage
            .commit_match(
                &reconciliation,
                BankLineUpdate {
                    status: new_status,
                    is_reconciled,
                },
                LedgerStatusUpdate {
                    ledger_transaction_id: transaction.id.clone(),
                    status: LedgerStatus::Reconciled,
                },
            )
            .await
        {
            error!(bank_line = %line.id, ledger_transaction = %transaction.id, %err, "match commit failed");
            return Err(err);
        }

        debug!(
            bank_line = %line.id,
            ledger_transaction = %transaction.id,
            amount = match_amount,
            confidence = ?match_confidence,
            "match confirmed"
        );

        line.reconciliation_status = new_status;
        line.is_reconciled = is_reconciled;
        transaction.status = LedgerStatus::Reconciled;
        Ok(MatchOutcome {
            reconciliation,
            bank_line: line,
            ledger_transaction: transaction,
        })
    }

    /// Reverse one confirmed match.
    ///
    /// The bank line's status is recomputed from the reconciliations that
    /// remain, so reversing one leg of a split leaves the line `partial`.
    /// The ledger transaction goes back to its pre-match status when no
    /// other confirmed reconciliation references it.
    pub async fn remove_match(
        &mut self,
        reconciliation_id: &str,
        user_id: &str,
    ) -> ReconResult<BankLine> {
        let reconciliation = self
            .storage
            .find_reconciliation(reconciliation_id)
            .await?
            .ok_or_else(|| ReconError::not_found(EntityKind::Reconciliation, reconciliation_id))?;
        let mut line = self.require_bank_line(&reconciliation.bank_line_id).await?;
        let account = self.require_account(&line.account_id).await?;
        if account.owner_id != user_id {
            return Err(ReconError::AccessDenied(format!(
                "account {} does not belong to user {}",
                account.id, user_id
            )));
        }

        let remaining: Vec<Reconciliation> = self
            .storage
            .list_reconciliations_for_bank_line(&line.id)
            .await?
            .into_iter()
            .filter(|r| r.id != reconciliation.id && r.is_confirmed())
            .collect();
        let covered: i64 = remaining.iter().map(|r| r.match_amount).sum();
        let new_status = if remaining.is_empty() {
            BankLineStatus::Unmatched
        } else if covered >= line.amount {
            BankLineStatus::Matched
        } else {
            BankLineStatus::Partial
        };

        let other_refs = self
            .storage
            .list_reconciliations_for_ledger_transaction(&reconciliation.ledger_transaction_id)
            .await?
            .into_iter()
            .any(|r| r.id != reconciliation.id && r.is_confirmed());
        let ledger_update = if other_refs {
            None
        } else {
            Some(LedgerStatusUpdate {
                ledger_transaction_id: reconciliation.ledger_transaction_id.clone(),
                status: reconciliation.prior_ledger_status,
            })
        };

        if let Err(err) = self
            .storage
            .revoke_match(
                &reconciliation.id,
                &line.id,
                BankLineUpdate {
                    status: new_status,
                    is_reconciled: new_status == BankLineStatus::Matched,
                },
                ledger_update,
            )
            .await
        {
            error!(reconciliation = %reconciliation.id, %err, "match reversal failed");
            return Err(err);
        }

        debug!(
            reconciliation = %reconciliation.id,
            bank_line = %line.id,
            new_status = ?new_status,
            "match reversed"
        );

        line.reconciliation_status = new_status;
        line.is_reconciled = new_status == BankLineStatus::Matched;
        Ok(line)
    }

    /// Remove every confirmed reconciliation for a bank line in one
    /// atomic operation and reset the line to unmatched
    pub async fn unreconcile_bank_line(
        &mut self,
        bank_line_id: &str,
        user_id: &str,
    ) -> ReconResult<UnreconcileOutcome> {
        let mut line = self.require_bank_line(bank_line_id).await?;
        let account = self.require_account(&line.account_id).await?;
        if account.owner_id != user_id {
            return Err(ReconError::AccessDenied(format!(
                "account {} does not belong to user {}",
                account.id, user_id
            )));
        }

        let confirmed: Vec<Reconciliation> = self
            .storage
            .list_reconciliations_for_bank_line(&line.id)
            .await?
            .into_iter()
            .filter(|r| r.is_confirmed())
            .collect();
        if confirmed.is_empty() {
            return Ok(UnreconcileOutcome {
                removed_count: 0,
                bank_line: line,
            });
        }

        let ids: Vec<String> = confirmed.iter().map(|r| r.id.clone()).collect();
        let ledger_updates: Vec<LedgerStatusUpdate> = confirmed
            .iter()
            .map(|r| LedgerStatusUpdate {
                ledger_transaction_id: r.ledger_transaction_id.clone(),
                status: r.prior_ledger_status,
            })
            .collect();

        self.storage
            .revoke_all_for_line(&line.id, &ids, &ledger_updates)
            .await?;

        debug!(bank_line = %line.id, removed = ids.len(), "bank line unreconciled");

        line.reconciliation_status = BankLineStatus::Unmatched;
        line.is_reconciled = false;
        Ok(UnreconcileOutcome {
            removed_count: ids.len(),
            bank_line: line,
        })
    }

    /// Administratively exclude a bank line from matching.
    ///
    /// Refused while confirmed matches exist; unreconcile first.
    /// Idempotent on an already-excluded line.
    pub async fn exclude_bank_line(
        &mut self,
        bank_line_id: &str,
        user_id: &str,
    ) -> ReconResult<BankLine> {
        let mut line = self.require_bank_line(bank_line_id).await?;
        let account = self.require_account(&line.account_id).await?;
        if account.owner_id != user_id {
            return Err(ReconError::AccessDenied(format!(
                "account {} does not belong to user {}",
                account.id, user_id
            )));
        }
        if line.reconciliation_status == BankLineStatus::Excluded {
            return Ok(line);
        }

        let has_confirmed = self
            .storage
            .list_reconciliations_for_bank_line(&line.id)
            .await?
            .iter()
            .any(|r| r.is_confirmed());
        if has_confirmed {
            return Err(ReconError::AlreadyReconciled(format!(
                "bank line {} has confirmed matches; unreconcile it before excluding",
                line.id
            )));
        }

        self.storage
            .update_bank_line_status(&line.id, BankLineStatus::Excluded, false)
            .await?;
        line.reconciliation_status = BankLineStatus::Excluded;
        line.is_reconciled = false;
        Ok(line)
    }

    /// Bring an excluded bank line back into matching scope
    pub async fn include_bank_line(
        &mut self,
        bank_line_id: &str,
        user_id: &str,
    ) -> ReconResult<BankLine> {
        let mut line = self.require_bank_line(bank_line_id).await?;
        let account = self.require_account(&line.account_id).await?;
        if account.owner_id != user_id {
            return Err(ReconError::AccessDenied(format!(
                "account {} does not belong to user {}",
                account.id, user_id
            )));
        }
        if line.reconciliation_status != BankLineStatus::Excluded {
            return Err(ReconError::InvalidInput(format!(
                "bank line {} is not excluded",
                line.id
            )));
        }

        self.storage
            .update_bank_line_status(&line.id, BankLineStatus::Unmatched, false)
            .await?;
        line.reconciliation_status = BankLineStatus::Unmatched;
        line.is_reconciled = false;
        Ok(line)
    }

    async fn require_bank_line(&self, id: &str) -> ReconResult<BankLine> {
        self.storage
            .find_bank_line(id)
            .await?
            .ok_or_else(|| ReconError::not_found(EntityKind::BankLine, id))
    }

    async fn require_ledger_transaction(&self, id: &str) -> ReconResult<LedgerTransaction> {
        self.storage
            .find_ledger_transaction(id)
            .await?
            .ok_or_else(|| ReconError::not_found(EntityKind::LedgerTransaction, id))
    }

    async fn require_account(&self, id: &str) -> ReconResult<Account> {
        self.storage
            .find_account(id)
            .await?
            .ok_or_else(|| ReconError::not_found(EntityKind::Account, id))
    }

    fn check_ownership(
        &self,
        account: &Account,
        transaction: &LedgerTransaction,
        user_id: &str,
    ) -> ReconResult<()> {
        if account.owner_id != user_id {
            return Err(ReconError::AccessDenied(format!(
                "account {} does not belong to user {}",
                account.id, user_id
            )));
        }
        if transaction.owner_id != user_id {
            return Err(ReconError::AccessDenied(format!(
                "ledger transaction {} does not belong to user {}",
                transaction.id, user_id
            )));
        }
        Ok(())
    }
}

/// Facade over the finder, orchestrator, and aggregator.
///
/// Most callers only need this type: construct it with a storage backend
/// and use the operation methods directly.
pub struct ReconciliationEngine<S: ReconciliationStorage> {
    pub(crate) storage: S,
    pub(crate) finder: CandidateFinder<S>,
    pub(crate) orchestrator: MatchOrchestrator<S>,
    pub(crate) aggregator: StatusAggregator<S>,
}

impl<S: ReconciliationStorage + Clone> ReconciliationEngine<S> {
    /// Create an engine with default scoring and finder settings
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, ScoringConfig::default(), FinderConfig::default())
    }

    /// Create an engine with custom scoring weights and search windows
    pub fn with_config(storage: S, scoring: ScoringConfig, finder: FinderConfig) -> Self {
        Self {
            finder: CandidateFinder::with_config(storage.clone(), scoring.clone(), finder),
            orchestrator: MatchOrchestrator::with_scoring(storage.clone(), scoring),
            aggregator: StatusAggregator::new(storage.clone()),
            storage,
        }
    }

    /// Find ranked candidate matches for one bank line
    pub async fn find_potential_matches(
        &self,
        bank_line_id: &str,
    ) -> ReconResult<Vec<MatchCandidate>> {
        self.finder.find_potential_matches(bank_line_id).await
    }

    /// Pre-flight check of a prospective match
    pub async fn validate_match(
        &self,
        bank_line_id: &str,
        ledger_transaction_id: &str,
    ) -> ReconResult<ValidationReport> {
        self.orchestrator
            .validate_match(bank_line_id, ledger_transaction_id)
            .await
    }

    /// Confirm a match between a bank line and a ledger transaction
    pub async fn create_match(
        &mut self,
        bank_line_id: &str,
        ledger_transaction_id: &str,
        user_id: &str,
        options: MatchOptions,
    ) -> ReconResult<MatchOutcome> {
        self.orchestrator
            .create_match(bank_line_id, ledger_transaction_id, user_id, options)
            .await
    }

    /// Reverse one confirmed match
    pub async fn remove_match(
        &mut self,
        reconciliation_id: &str,
        user_id: &str,
    ) -> ReconResult<BankLine> {
        self.orchestrator
            .remove_match(reconciliation_id, user_id)
            .await
    }

    /// Remove every confirmed reconciliation for a bank line
    pub async fn unreconcile_bank_line(
        &mut self,
        bank_line_id: &str,
        user_id: &str,
    ) -> ReconResult<UnreconcileOutcome> {
        self.orchestrator
            .unreconcile_bank_line(bank_line_id, user_id)
            .await
    }

    /// Administratively exclude a bank line from matching
    pub async fn exclude_bank_line(
        &mut self,
        bank_line_id: &str,
        user_id: &str,
    ) -> ReconResult<BankLine> {
        self.orchestrator
            .exclude_bank_line(bank_line_id, user_id)
            .await
    }

    /// Bring an excluded bank line back into matching scope
    pub async fn include_bank_line(
        &mut self,
        bank_line_id: &str,
        user_id: &str,
    ) -> ReconResult<BankLine> {
        self.orchestrator
            .include_bank_line(bank_line_id, user_id)
            .await
    }

    // Status and report reads, delegated to the aggregator

    /// Counts and progress percentage for an account
    pub async fn get_status_summary(
        &self,
        account_id: &str,
        range: Option<DateRange>,
    ) -> ReconResult<StatusSummary> {
        self.aggregator.get_status_summary(account_id, range).await
    }

    /// Bank balance, book balance, and their discrepancy
    pub async fn calculate_balances(
        &self,
        account_id: &str,
        range: Option<DateRange>,
    ) -> ReconResult<BalanceReport> {
        self.aggregator.calculate_balances(account_id, range).await
    }

    /// Unreconciled counts, amounts, and monthly trend
    pub async fn get_unreconciled_totals(
        &self,
        account_id: &str,
        range: Option<DateRange>,
    ) -> ReconResult<UnreconciledTotals> {
        self.aggregator
            .get_unreconciled_totals(account_id, range)
            .await
    }

    /// Most recent reconciliation activity for an account
    pub async fn get_last_reconciliation_info(
        &self,
        account_id: &str,
        today: chrono::NaiveDate,
    ) -> ReconResult<LastReconciliationInfo> {
        self.aggregator
            .get_last_reconciliation_info(account_id, today)
            .await
    }

    /// All account-level reports combined
    pub async fn get_full_status(
        &self,
        account_id: &str,
        range: Option<DateRange>,
        today: chrono::NaiveDate,
    ) -> ReconResult<FullStatus> {
        self.aggregator
            .get_full_status(account_id, range, today)
            .await
    }

    /// Summary and balances rolled up across every account a user owns
    pub async fn get_status_by_user(
        &self,
        owner_id: &str,
        range: Option<DateRange>,
    ) -> ReconResult<UserStatusRollup> {
        self.aggregator.get_status_by_user(owner_id, range).await
    }
}
