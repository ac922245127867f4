//! Storage abstraction for the reconciliation engine
//!
//! The engine never talks to a database directly. Bank lines, ledger
//! transactions, and accounts live in collaborator-owned stores; the
//! engine owns only the reconciliation rows. Implement these traits for
//! any backend (PostgreSQL, SQLite, in-memory, etc.).

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::*;

/// Filter for listing bank lines within an account
#[derive(Debug, Clone, Copy, Default)]
pub struct BankLineFilter {
    /// Restrict to a single reconciliation status
    pub status: Option<BankLineStatus>,
    /// Restrict to lines whose `is_reconciled` flag equals this value
    pub reconciled: Option<bool>,
    /// Restrict to lines dated inside this range
    pub range: Option<DateRange>,
}

impl BankLineFilter {
    /// Filter matching every line in the account
    pub fn all() -> Self {
        Self::default()
    }

    /// Lines still eligible for matching: not reconciled, not excluded
    pub fn matchable() -> Self {
        Self {
            status: None,
            reconciled: Some(false),
            range: None,
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// Store of imported bank statement lines
///
/// The engine reads lines and writes only the two status flags.
#[async_trait]
pub trait BankLineStore: Send + Sync {
    /// Get a bank line by id
    async fn find_bank_line(&self, id: &str) -> ReconResult<Option<BankLine>>;

    /// List bank lines for an account matching the filter
    async fn list_bank_lines(
        &self,
        account_id: &str,
        filter: BankLineFilter,
    ) -> ReconResult<Vec<BankLine>>;

    /// Update the reconciliation status flags of a bank line
    async fn update_bank_line_status(
        &mut self,
        id: &str,
        status: BankLineStatus,
        is_reconciled: bool,
    ) -> ReconResult<()>;
}

/// Store of internally recorded ledger transactions
///
/// The engine reads transactions and writes only the `status` field.
#[async_trait]
pub trait LedgerTransactionStore: Send + Sync {
    /// Get a ledger transaction by id
    async fn find_ledger_transaction(&self, id: &str) -> ReconResult<Option<LedgerTransaction>>;

    /// List a user's transactions still open for matching (pending or
    /// cleared) dated inside the given window
    async fn list_unreconciled_transactions(
        &self,
        owner_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> ReconResult<Vec<LedgerTransaction>>;

    /// Update the status of a ledger transaction
    async fn update_ledger_status(&mut self, id: &str, status: LedgerStatus) -> ReconResult<()>;
}

/// Store of bank accounts, used for ownership checks
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Get an account by id
    async fn find_account(&self, id: &str) -> ReconResult<Option<Account>>;

    /// List all accounts belonging to a user
    async fn list_accounts_for_owner(&self, owner_id: &str) -> ReconResult<Vec<Account>>;
}

/// Store of reconciliation rows, exclusively owned by this engine
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Insert a reconciliation row.
    ///
    /// Implementations MUST enforce uniqueness of the confirmed
    /// (bank_line_id, ledger_transaction_id) pair and fail with
    /// [`ReconError::ConcurrencyConflict`] when a duplicate confirmed row
    /// already exists. A check-then-write in the caller is racy; this
    /// constraint is the backstop that makes two concurrent confirmations
    /// of the same pair resolve to exactly one success.
    async fn insert_reconciliation(&mut self, reconciliation: &Reconciliation) -> ReconResult<()>;

    /// Get a reconciliation by id
    async fn find_reconciliation(&self, id: &str) -> ReconResult<Option<Reconciliation>>;

    /// List all reconciliations referencing a bank line
    async fn list_reconciliations_for_bank_line(
        &self,
        bank_line_id: &str,
    ) -> ReconResult<Vec<Reconciliation>>;

    /// List all reconciliations referencing a ledger transaction
    async fn list_reconciliations_for_ledger_transaction(
        &self,
        ledger_transaction_id: &str,
    ) -> ReconResult<Vec<Reconciliation>>;

    /// Delete a reconciliation row
    async fn delete_reconciliation(&mut self, id: &str) -> ReconResult<()>;
}

/// Status flags written back to a bank line as part of a match operation
#[derive(Debug, Clone, Copy)]
pub struct BankLineUpdate {
    pub status: BankLineStatus,
    pub is_reconciled: bool,
}

/// Status written back to a ledger transaction as part of a match operation
#[derive(Debug, Clone)]
pub struct LedgerStatusUpdate {
    pub ledger_transaction_id: String,
    pub status: LedgerStatus,
}

/// Combined storage surface required by the engine.
///
/// The provided composite operations are the atomic units of the state
/// machine: a reconciliation row and the status flags on both sides must
/// change together or not at all, so concurrent readers never observe a
/// half-reconciled state. The default bodies apply the writes
/// sequentially, which is sufficient for the single-writer in-memory
/// backend; persistent implementations should override them and wrap the
/// writes in a database transaction.
#[async_trait]
pub trait ReconciliationStorage:
    BankLineStore + LedgerTransactionStore + AccountStore + ReconciliationStore
{
    /// Atomically insert a confirmed reconciliation and update both
    /// status flags
    async fn commit_match(
        &mut self,
        reconciliation: &Reconciliation,
        bank_line_update: BankLineUpdate,
        ledger_update: LedgerStatusUpdate,
    ) -> ReconResult<()> {
        self.insert_reconciliation(reconciliation).await?;
        self.update_bank_line_status(
            &reconciliation.bank_line_id,
            bank_line_update.status,
            bank_line_update.is_reconciled,
        )
        .await?;
        self.update_ledger_status(&ledger_update.ledger_transaction_id, ledger_update.status)
            .await?;
        Ok(())
    }

    /// Atomically delete one reconciliation and write back the recomputed
    /// status flags. `ledger_update` is `None` when another confirmed row
    /// still references the ledger transaction.
    async fn revoke_match(
        &mut self,
        reconciliation_id: &str,
        bank_line_id: &str,
        bank_line_update: BankLineUpdate,
        ledger_update: Option<LedgerStatusUpdate>,
    ) -> ReconResult<()> {
        self.delete_reconciliation(reconciliation_id).await?;
        self.update_bank_line_status(
            bank_line_id,
            bank_line_update.status,
            bank_line_update.is_reconciled,
        )
        .await?;
        if let Some(update) = ledger_update {
            self.update_ledger_status(&update.ledger_transaction_id, update.status)
                .await?;
        }
        Ok(())
    }

    /// Atomically delete every listed reconciliation for one bank line,
    /// reset the line to unmatched, and revert the listed ledger
    /// transactions
    async fn revoke_all_for_line(
        &mut self,
        bank_line_id: &str,
        reconciliation_ids: &[String],
        ledger_updates: &[LedgerStatusUpdate],
    ) -> ReconResult<()> {
        for id in reconciliation_ids {
            self.delete_reconciliation(id).await?;
        }
        self.update_bank_line_status(bank_line_id, BankLineStatus::Unmatched, false)
            .await?;
        for update in ledger_updates {
            self.update_ledger_status(&update.ledger_transaction_id, update.status)
                .await?;
        }
        Ok(())
    }
}

impl<T> ReconciliationStorage for T where
    T: BankLineStore + LedgerTransactionStore + AccountStore + ReconciliationStore
{
}
