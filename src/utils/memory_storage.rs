//! In-memory storage implementation for testing and development

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

/// In-memory storage backing all four store traits.
///
/// Clones share the same underlying maps, so one instance can be handed
/// to the engine while a test keeps another for seeding and inspection.
/// `insert_reconciliation` enforces the unique confirmed pair constraint
/// under the write lock, mirroring what a database unique index provides.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    bank_lines: Arc<RwLock<HashMap<String, BankLine>>>,
    ledger_transactions: Arc<RwLock<HashMap<String, LedgerTransaction>>>,
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    reconciliations: Arc<RwLock<HashMap<String, Reconciliation>>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace an account
    pub fn put_account(&self, account: Account) {
        self.accounts
            .write()
            .unwrap()
            .insert(account.id.clone(), account);
    }

    /// Seed or replace a bank line
    pub fn put_bank_line(&self, line: BankLine) {
        self.bank_lines
            .write()
            .unwrap()
            .insert(line.id.clone(), line);
    }

    /// Seed or replace a ledger transaction
    pub fn put_ledger_transaction(&self, transaction: LedgerTransaction) {
        self.ledger_transactions
            .write()
            .unwrap()
            .insert(transaction.id.clone(), transaction);
    }

    /// Number of stored reconciliation rows
    pub fn reconciliation_count(&self) -> usize {
        self.reconciliations.read().unwrap().len()
    }

    /// Snapshot of all reconciliation rows
    pub fn all_reconciliations(&self) -> Vec<Reconciliation> {
        self.reconciliations.read().unwrap().values().cloned().collect()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.bank_lines.write().unwrap().clear();
        self.ledger_transactions.write().unwrap().clear();
        self.accounts.write().unwrap().clear();
        self.reconciliations.write().unwrap().clear();
    }
}

#[async_trait]
impl BankLineStore for MemoryStorage {
    async fn find_bank_line(&self, id: &str) -> ReconResult<Option<BankLine>> {
        Ok(self.bank_lines.read().unwrap().get(id).cloned())
    }

    async fn list_bank_lines(
        &self,
        account_id: &str,
        filter: BankLineFilter,
    ) -> ReconResult<Vec<BankLine>> {
        let lines = self.bank_lines.read().unwrap();
        let mut matching: Vec<BankLine> = lines
            .values()
            .filter(|line| line.account_id == account_id)
            .filter(|line| {
                filter
                    .status
                    .is_none_or(|status| line.reconciliation_status == status)
            })
            .filter(|line| {
                filter
                    .reconciled
                    .is_none_or(|flag| line.is_reconciled == flag)
            })
            .filter(|line| filter.range.is_none_or(|range| range.contains(line.date)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn update_bank_line_status(
        &mut self,
        id: &str,
        status: BankLineStatus,
        is_reconciled: bool,
    ) -> ReconResult<()> {
        let mut lines = self.bank_lines.write().unwrap();
        let line = lines
            .get_mut(id)
            .ok_or_else(|| ReconError::not_found(EntityKind::BankLine, id))?;
        line.reconciliation_status = status;
        line.is_reconciled = is_reconciled;
        Ok(())
    }
}

#[async_trait]
impl LedgerTransactionStore for MemoryStorage {
    async fn find_ledger_transaction(&self, id: &str) -> ReconResult<Option<LedgerTransaction>> {
        Ok(self.ledger_transactions.read().unwrap().get(id).cloned())
    }

    async fn list_unreconciled_transactions(
        &self,
        owner_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> ReconResult<Vec<LedgerTransaction>> {
        let transactions = self.ledger_transactions.read().unwrap();
        let mut matching: Vec<LedgerTransaction> = transactions
            .values()
            .filter(|txn| txn.owner_id == owner_id)
            .filter(|txn| matches!(txn.status, LedgerStatus::Pending | LedgerStatus::Cleared))
            .filter(|txn| start.is_none_or(|start| txn.date >= start))
            .filter(|txn| end.is_none_or(|end| txn.date <= end))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn update_ledger_status(&mut self, id: &str, status: LedgerStatus) -> ReconResult<()> {
        let mut transactions = self.ledger_transactions.write().unwrap();
        let transaction = transactions
            .get_mut(id)
            .ok_or_else(|| ReconError::not_found(EntityKind::LedgerTransaction, id))?;
        transaction.status = status;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStorage {
    async fn find_account(&self, id: &str) -> ReconResult<Option<Account>> {
        Ok(self.accounts.read().unwrap().get(id).cloned())
    }

    async fn list_accounts_for_owner(&self, owner_id: &str) -> ReconResult<Vec<Account>> {
        let accounts = self.accounts.read().unwrap();
        let mut matching: Vec<Account> = accounts
            .values()
            .filter(|account| account.owner_id == owner_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }
}

#[async_trait]
impl ReconciliationStore for MemoryStorage {
    async fn insert_reconciliation(&mut self, reconciliation: &Reconciliation) -> ReconResult<()> {
        let mut rows = self.reconciliations.write().unwrap();
        // Unique confirmed pair check under the write lock: the memory
        // backend's equivalent of a database unique index.
        if reconciliation.is_confirmed()
            && rows.values().any(|existing| {
                existing.is_confirmed()
                    && existing.bank_line_id == reconciliation.bank_line_id
                    && existing.ledger_transaction_id == reconciliation.ledger_transaction_id
            })
        {
            return Err(ReconError::ConcurrencyConflict(format!(
                "a confirmed reconciliation already links bank line {} and ledger transaction {}",
                reconciliation.bank_line_id, reconciliation.ledger_transaction_id
            )));
        }
        rows.insert(reconciliation.id.clone(), reconciliation.clone());
        Ok(())
    }

    async fn find_reconciliation(&self, id: &str) -> ReconResult<Option<Reconciliation>> {
        Ok(self.reconciliations.read().unwrap().get(id).cloned())
    }

    async fn list_reconciliations_for_bank_line(
        &self,
        bank_line_id: &str,
    ) -> ReconResult<Vec<Reconciliation>> {
        let rows = self.reconciliations.read().unwrap();
        let mut matching: Vec<Reconciliation> = rows
            .values()
            .filter(|r| r.bank_line_id == bank_line_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn list_reconciliations_for_ledger_transaction(
        &self,
        ledger_transaction_id: &str,
    ) -> ReconResult<Vec<Reconciliation>> {
        let rows = self.reconciliations.read().unwrap();
        let mut matching: Vec<Reconciliation> = rows
            .values()
            .filter(|r| r.ledger_transaction_id == ledger_transaction_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn delete_reconciliation(&mut self, id: &str) -> ReconResult<()> {
        if self.reconciliations.write().unwrap().remove(id).is_some() {
            Ok(())
        } else {
            Err(ReconError::not_found(EntityKind::Reconciliation, id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn confirmed_pair(bank_line_id: &str, ledger_transaction_id: &str) -> Reconciliation {
        Reconciliation::confirmed(
            bank_line_id.to_string(),
            ledger_transaction_id.to_string(),
            1000,
            MatchType::Exact,
            Some(95.0),
            LedgerStatus::Cleared,
            "user1".to_string(),
        )
    }

    #[tokio::test]
    async fn duplicate_confirmed_pair_is_rejected() {
        let mut storage = MemoryStorage::new();
        storage
            .insert_reconciliation(&confirmed_pair("bl1", "tx1"))
            .await
            .unwrap();

        let err = storage
            .insert_reconciliation(&confirmed_pair("bl1", "tx1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::ConcurrencyConflict(_)));
        assert_eq!(storage.reconciliation_count(), 1);

        // A different pair is fine.
        storage
            .insert_reconciliation(&confirmed_pair("bl1", "tx2"))
            .await
            .unwrap();
        assert_eq!(storage.reconciliation_count(), 2);
    }

    #[tokio::test]
    async fn bank_line_filters_apply() {
        let mut excluded = BankLine::new(
            "bl-excluded".to_string(),
            "acc1".to_string(),
            date(2026, 1, 10),
            "Ignore me".to_string(),
            Direction::Debit,
            100,
        );
        excluded.reconciliation_status = BankLineStatus::Excluded;

        let storage = MemoryStorage::new();
        storage.put_bank_line(BankLine::new(
            "bl-open".to_string(),
            "acc1".to_string(),
            date(2026, 1, 5),
            "Open".to_string(),
            Direction::Credit,
            200,
        ));
        storage.put_bank_line(excluded);
        storage.put_bank_line(BankLine::new(
            "bl-other-account".to_string(),
            "acc2".to_string(),
            date(2026, 1, 5),
            "Elsewhere".to_string(),
            Direction::Credit,
            300,
        ));

        let all = storage
            .list_bank_lines("acc1", BankLineFilter::all())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        // Sorted by date then id.
        assert_eq!(all[0].id, "bl-open");

        let unmatched_only = storage
            .list_bank_lines(
                "acc1",
                BankLineFilter {
                    status: Some(BankLineStatus::Unmatched),
                    ..BankLineFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(unmatched_only.len(), 1);

        let january_16_on = storage
            .list_bank_lines(
                "acc1",
                BankLineFilter::all()
                    .with_range(DateRange::new(Some(date(2026, 1, 16)), None)),
            )
            .await
            .unwrap();
        assert!(january_16_on.is_empty());
    }

    #[tokio::test]
    async fn unreconciled_listing_skips_reconciled_and_void() {
        let storage = MemoryStorage::new();
        for (id, status) in [
            ("tx-pending", LedgerStatus::Pending),
            ("tx-cleared", LedgerStatus::Cleared),
            ("tx-reconciled", LedgerStatus::Reconciled),
            ("tx-void", LedgerStatus::Void),
        ] {
            let mut txn = LedgerTransaction::new(
                id.to_string(),
                "user1".to_string(),
                LedgerKind::Expense,
                date(2026, 1, 10),
                "Supplies".to_string(),
                500,
            );
            txn.status = status;
            storage.put_ledger_transaction(txn);
        }

        let open = storage
            .list_unreconciled_transactions("user1", None, None)
            .await
            .unwrap();
        let ids: Vec<&str> = open.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["tx-cleared", "tx-pending"]);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let storage = MemoryStorage::new();
        let mut writer = storage.clone();
        writer
            .insert_reconciliation(&confirmed_pair("bl1", "tx1"))
            .await
            .unwrap();
        assert_eq!(storage.reconciliation_count(), 1);
    }
}
