//! Read-only status, balance, and discrepancy reporting
//!
//! Every method here derives its answer from the bank line store, the
//! ledger store, and the reconciliation rows; nothing is mutated. Reads
//! return zeroed aggregates rather than failing, except when the target
//! account itself is missing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::traits::{BankLineFilter, ReconciliationStorage};
use crate::types::*;
use crate::utils::validation::validate_date_range;

/// Bank line counts and overall progress for an account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total_count: usize,
    pub matched_count: usize,
    pub partial_count: usize,
    pub unmatched_count: usize,
    pub excluded_count: usize,
    /// round(100 * (matched + 0.5 * partial) / (total - excluded)),
    /// clamped to [0, 100]; 100 when no lines are in scope
    pub reconciliation_progress: u8,
}

/// Bank-vs-book balance comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    /// Net of all bank lines in scope: credits minus debits, minor units
    pub bank_balance: i64,
    /// Net of confirmed match amounts, signed by the bank line direction
    pub book_balance: i64,
    /// bank_balance minus book_balance; zero means the books agree
    pub discrepancy: i64,
    pub is_balanced: bool,
}

/// One month of unreconciled activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    /// Period key in `YYYY-MM` form
    pub period: String,
    pub count: usize,
    pub amount: i64,
}

/// Unreconciled bank line totals, split by direction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnreconciledTotals {
    pub credit_count: usize,
    pub credit_amount: i64,
    pub debit_count: usize,
    pub debit_amount: i64,
    pub oldest_unreconciled: Option<NaiveDate>,
    /// At most the 12 most recent periods, ascending
    pub monthly_trend: Vec<MonthlyBucket>,
}

/// Most recent reconciliation activity for an account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastReconciliationInfo {
    pub last_reconciled_at: Option<chrono::NaiveDateTime>,
    pub last_reconciled_by: Option<String>,
    /// Confirmed reconciliations stamped on the reference date
    pub reconciled_today_count: usize,
    /// Date of the most recent bank line with a confirmed match
    pub last_reconciled_line_date: Option<NaiveDate>,
}

/// All account-level reports in one structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullStatus {
    pub summary: StatusSummary,
    pub balances: BalanceReport,
    pub unreconciled: UnreconciledTotals,
    pub last_reconciliation: LastReconciliationInfo,
}

/// Status of one account inside a per-user rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub account_id: String,
    pub account_name: String,
    pub summary: StatusSummary,
    pub balances: BalanceReport,
}

/// Per-user rollup across all owned accounts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStatusRollup {
    pub accounts: Vec<AccountStatus>,
    pub combined_summary: StatusSummary,
    pub combined_balances: BalanceReport,
}

/// Derives progress, totals, and discrepancy reports from the stores
pub struct StatusAggregator<S: ReconciliationStorage> {
    storage: S,
}

impl<S: ReconciliationStorage> StatusAggregator<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Count bank lines by status and compute the progress percentage
    pub async fn get_status_summary(
        &self,
        account_id: &str,
        range: Option<DateRange>,
    ) -> ReconResult<StatusSummary> {
        let lines = self.lines_in_scope(account_id, range).await?;

        let mut summary = StatusSummary {
            total_count: lines.len(),
            ..StatusSummary::default()
        };
        for line in &lines {
            match line.reconciliation_status {
                BankLineStatus::Matched => summary.matched_count += 1,
                BankLineStatus::Partial => summary.partial_count += 1,
                BankLineStatus::Unmatched => summary.unmatched_count += 1,
                BankLineStatus::Excluded => summary.excluded_count += 1,
            }
        }
        summary.reconciliation_progress = progress_percentage(
            summary.matched_count,
            summary.partial_count,
            summary.total_count - summary.excluded_count,
        );
        Ok(summary)
    }

    /// Compare the bank-recorded balance with the reconciled book balance
    pub async fn calculate_balances(
        &self,
        account_id: &str,
        range: Option<DateRange>,
    ) -> ReconResult<BalanceReport> {
        let lines = self.lines_in_scope(account_id, range).await?;

        let mut bank_balance = 0i64;
        let mut book_balance = 0i64;
        for line in &lines {
            let sign = match line.direction {
                Direction::Credit => 1,
                Direction::Debit => -1,
            };
            bank_balance += sign * line.amount;

            let matched: i64 = self
                .storage
                .list_reconciliations_for_bank_line(&line.id)
                .await?
                .iter()
                .filter(|r| r.is_confirmed())
                .map(|r| r.match_amount)
                .sum();
            book_balance += sign * matched;
        }

        let discrepancy = bank_balance - book_balance;
        Ok(BalanceReport {
            bank_balance,
            book_balance,
            discrepancy,
            is_balanced: discrepancy == 0,
        })
    }

    /// Totals for lines still awaiting reconciliation, excluded lines
    /// left out
    pub async fn get_unreconciled_totals(
        &self,
        account_id: &str,
        range: Option<DateRange>,
    ) -> ReconResult<UnreconciledTotals> {
        let lines = self.lines_in_scope(account_id, range).await?;

        let mut totals = UnreconciledTotals::default();
        let mut buckets: BTreeMap<String, (usize, i64)> = BTreeMap::new();
        for line in &lines {
            if !matches!(
                line.reconciliation_status,
                BankLineStatus::Unmatched | BankLineStatus::Partial
            ) {
                continue;
            }
            match line.direction {
                Direction::Credit => {
                    totals.credit_count += 1;
                    totals.credit_amount += line.amount;
                }
                Direction::Debit => {
                    totals.debit_count += 1;
                    totals.debit_amount += line.amount;
                }
            }
            totals.oldest_unreconciled = match totals.oldest_unreconciled {
                Some(oldest) if oldest <= line.date => Some(oldest),
                _ => Some(line.date),
            };
            let bucket = buckets
                .entry(line.date.format("%Y-%m").to_string())
                .or_default();
            bucket.0 += 1;
            bucket.1 += line.amount;
        }

        // BTreeMap keys sort lexicographically, which for YYYY-MM is
        // chronological; keep the 12 most recent periods.
        let skip = buckets.len().saturating_sub(12);
        totals.monthly_trend = buckets
            .into_iter()
            .skip(skip)
            .map(|(period, (count, amount))| MonthlyBucket {
                period,
                count,
                amount,
            })
            .collect();
        Ok(totals)
    }

    /// Most recent confirmed reconciliation activity. `today` anchors the
    /// "reconciled today" count so the result is deterministic.
    pub async fn get_last_reconciliation_info(
        &self,
        account_id: &str,
        today: NaiveDate,
    ) -> ReconResult<LastReconciliationInfo> {
        let lines = self.lines_in_scope(account_id, None).await?;

        let mut info = LastReconciliationInfo::default();
        for line in &lines {
            let confirmed: Vec<Reconciliation> = self
                .storage
                .list_reconciliations_for_bank_line(&line.id)
                .await?
                .into_iter()
                .filter(|r| r.is_confirmed())
                .collect();
            if confirmed.is_empty() {
                continue;
            }

            info.last_reconciled_line_date = match info.last_reconciled_line_date {
                Some(latest) if latest >= line.date => Some(latest),
                _ => Some(line.date),
            };
            for recon in confirmed {
                let Some(at) = recon.reconciled_at else {
                    continue;
                };
                if at.date() == today {
                    info.reconciled_today_count += 1;
                }
                if info.last_reconciled_at.is_none_or(|latest| at > latest) {
                    info.last_reconciled_at = Some(at);
                    info.last_reconciled_by = recon.reconciled_by.clone();
                }
            }
        }
        Ok(info)
    }

    /// All account-level reports combined
    pub async fn get_full_status(
        &self,
        account_id: &str,
        range: Option<DateRange>,
        today: NaiveDate,
    ) -> ReconResult<FullStatus> {
        Ok(FullStatus {
            summary: self.get_status_summary(account_id, range).await?,
            balances: self.calculate_balances(account_id, range).await?,
            unreconciled: self.get_unreconciled_totals(account_id, range).await?,
            last_reconciliation: self.get_last_reconciliation_info(account_id, today).await?,
        })
    }

    /// Roll summaries and balances up across every account a user owns.
    /// Pure summation; no logic beyond the per-account reports.
    pub async fn get_status_by_user(
        &self,
        owner_id: &str,
        range: Option<DateRange>,
    ) -> ReconResult<UserStatusRollup> {
        if let Some(range) = range {
            validate_date_range(&range)?;
        }
        let accounts = self.storage.list_accounts_for_owner(owner_id).await?;

        let mut rollup = UserStatusRollup::default();
        for account in accounts {
            let summary = self.get_status_summary(&account.id, range).await?;
            let balances = self.calculate_balances(&account.id, range).await?;

            rollup.combined_summary.total_count += summary.total_count;
            rollup.combined_summary.matched_count += summary.matched_count;
            rollup.combined_summary.partial_count += summary.partial_count;
            rollup.combined_summary.unmatched_count += summary.unmatched_count;
            rollup.combined_summary.excluded_count += summary.excluded_count;
            rollup.combined_balances.bank_balance += balances.bank_balance;
            rollup.combined_balances.book_balance += balances.book_balance;

            rollup.accounts.push(AccountStatus {
                account_id: account.id,
                account_name: account.name,
                summary,
                balances,
            });
        }
        rollup.combined_summary.reconciliation_progress = progress_percentage(
            rollup.combined_summary.matched_count,
            rollup.combined_summary.partial_count,
            rollup.combined_summary.total_count - rollup.combined_summary.excluded_count,
        );
        rollup.combined_balances.discrepancy =
            rollup.combined_balances.bank_balance - rollup.combined_balances.book_balance;
        rollup.combined_balances.is_balanced = rollup.combined_balances.discrepancy == 0;
        Ok(rollup)
    }

    async fn lines_in_scope(
        &self,
        account_id: &str,
        range: Option<DateRange>,
    ) -> ReconResult<Vec<BankLine>> {
        if let Some(range) = range {
            validate_date_range(&range)?;
        }
        if self.storage.find_account(account_id).await?.is_none() {
            return Err(ReconError::not_found(EntityKind::Account, account_id));
        }
        let mut filter = BankLineFilter::all();
        if let Some(range) = range {
            filter = filter.with_range(range);
        }
        self.storage.list_bank_lines(account_id, filter).await
    }
}

/// Progress percentage: partially matched lines count half, excluded
/// lines are out of the denominator, and an empty scope reads as done
fn progress_percentage(matched: usize, partial: usize, effective_total: usize) -> u8 {
    if effective_total == 0 {
        return 100;
    }
    let raw = 100.0 * (matched as f64 + 0.5 * partial as f64) / effective_total as f64;
    raw.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_counts_partial_as_half() {
        // 2 matched, 1 unmatched, 1 excluded: 100 * 2 / 3 rounds to 67.
        assert_eq!(progress_percentage(2, 0, 3), 67);
    }

    #[test]
    fn progress_is_hundred_for_empty_scope() {
        assert_eq!(progress_percentage(0, 0, 0), 100);
    }

    #[test]
    fn progress_stays_within_bounds() {
        assert_eq!(progress_percentage(0, 0, 5), 0);
        assert_eq!(progress_percentage(5, 0, 5), 100);
        assert_eq!(progress_percentage(1, 1, 4), 38);
    }
}
