//! Core types and data structures for the reconciliation engine

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Direction of money movement on an imported bank statement line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money coming into the account
    Credit,
    /// Money leaving the account
    Debit,
}

/// Kind of an internally recorded ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Income,
    Expense,
    /// Movement between the user's own accounts; matches either direction
    Transfer,
}

/// Reconciliation state of a bank line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankLineStatus {
    /// No confirmed match yet
    Unmatched,
    /// Confirmed matches cover less than the full line amount
    Partial,
    /// Confirmed matches cover the full line amount
    Matched,
    /// Administratively ignored; permanently out of scope for matching
    Excluded,
}

/// Lifecycle status of a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Pending,
    Cleared,
    /// Referenced by a confirmed reconciliation
    Reconciled,
    Void,
}

/// How a reconciliation was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Single full-amount match with equal amounts on both sides
    Exact,
    /// Covers less than the bank line's full amount
    Partial,
    /// Forced by a user without a confidence score
    Manual,
    /// One of several matches funding the same bank line
    Split,
    /// Aggregate match assembled from multiple ledger transactions
    Combined,
}

/// Confirmation state of a reconciliation link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Pending,
    Confirmed,
}

/// One row of an imported bank statement
///
/// Owned by the import collaborator; this engine only ever writes the two
/// status flags, and only through the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankLine {
    /// Unique identifier assigned by the import collaborator
    pub id: String,
    /// Account the statement belongs to
    pub account_id: String,
    /// Transaction date reported by the bank
    pub date: NaiveDate,
    /// Date the bank posted the movement, when it differs
    pub posting_date: Option<NaiveDate>,
    /// Statement narrative
    pub description: String,
    /// Bank-provided reference (invoice number, payment id, etc.)
    pub reference: Option<String>,
    pub direction: Direction,
    /// Non-negative amount in minor currency units
    pub amount: i64,
    pub reconciliation_status: BankLineStatus,
    /// Cached flag: true iff the line is fully matched or excluded
    pub is_reconciled: bool,
    pub notes: Option<String>,
}

impl BankLine {
    /// Create a new unmatched bank line
    pub fn new(
        id: String,
        account_id: String,
        date: NaiveDate,
        description: String,
        direction: Direction,
        amount: i64,
    ) -> Self {
        Self {
            id,
            account_id,
            date,
            posting_date: None,
            description,
            reference: None,
            direction,
            amount,
            reconciliation_status: BankLineStatus::Unmatched,
            is_reconciled: false,
            notes: None,
        }
    }

    /// Set the bank-provided reference
    pub fn with_reference(mut self, reference: String) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Whether the line may still receive matches
    pub fn is_matchable(&self) -> bool {
        !self.is_reconciled
            && matches!(
                self.reconciliation_status,
                BankLineStatus::Unmatched | BankLineStatus::Partial
            )
    }
}

/// One internally recorded accounting entry
///
/// Owned by the ledger collaborator; this engine only moves its `status`
/// to `Reconciled` and back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    /// User who owns the ledger entry
    pub owner_id: String,
    pub kind: LedgerKind,
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    /// Non-negative amount in minor currency units
    pub amount: i64,
    pub status: LedgerStatus,
}

impl LedgerTransaction {
    /// Create a new cleared ledger transaction
    pub fn new(
        id: String,
        owner_id: String,
        kind: LedgerKind,
        date: NaiveDate,
        description: String,
        amount: i64,
    ) -> Self {
        Self {
            id,
            owner_id,
            kind,
            date,
            description,
            reference: None,
            amount,
            status: LedgerStatus::Cleared,
        }
    }

    /// Set the transaction reference
    pub fn with_reference(mut self, reference: String) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// Bank account record, used for ownership checks and per-user rollups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub owner_id: String,
    pub name: String,
}

/// A confirmed (or pending) link between a bank line and a ledger
/// transaction; the only record this engine owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub id: String,
    pub bank_line_id: String,
    pub ledger_transaction_id: String,
    /// Portion of the bank line covered by this link, in minor units;
    /// may be less than either side's full amount for split matches
    pub match_amount: i64,
    pub match_type: MatchType,
    /// Confidence score 0-100; `None` for manually forced matches
    pub match_confidence: Option<f64>,
    pub status: ReconciliationStatus,
    /// Ledger transaction status before the match, restored on reversal
    pub prior_ledger_status: LedgerStatus,
    pub reconciled_at: Option<NaiveDateTime>,
    /// User who confirmed the match
    pub reconciled_by: Option<String>,
    pub notes: Option<String>,
}

impl Reconciliation {
    /// Create a confirmed reconciliation, stamped now and attributed to
    /// `user_id`
    pub fn confirmed(
        bank_line_id: String,
        ledger_transaction_id: String,
        match_amount: i64,
        match_type: MatchType,
        match_confidence: Option<f64>,
        prior_ledger_status: LedgerStatus,
        user_id: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            bank_line_id,
            ledger_transaction_id,
            match_amount,
            match_type,
            match_confidence,
            status: ReconciliationStatus::Confirmed,
            prior_ledger_status,
            reconciled_at: Some(chrono::Utc::now().naive_utc()),
            reconciled_by: Some(user_id),
            notes: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ReconciliationStatus::Confirmed
    }
}

/// Inclusive date range used to scope candidate searches and reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Whether `date` falls inside the range
    pub fn contains(&self, date: NaiveDate) -> bool {
        if let Some(start) = self.start {
            if date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if date > end {
                return false;
            }
        }
        true
    }
}

/// Which entity a `NotFound` error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    BankLine,
    LedgerTransaction,
    Reconciliation,
    Account,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::BankLine => "bank line",
            EntityKind::LedgerTransaction => "ledger transaction",
            EntityKind::Reconciliation => "reconciliation",
            EntityKind::Account => "account",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the reconciliation engine
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },
    #[error("already reconciled: {0}")]
    AlreadyReconciled(String),
    #[error("incompatible types: {direction:?} bank line cannot match {kind:?} transaction")]
    IncompatibleTypes {
        direction: Direction,
        kind: LedgerKind,
    },
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("concurrent update conflict: {0}")]
    ConcurrencyConflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ReconError {
    /// Shorthand for a `NotFound` error
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        ReconError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type for reconciliation operations
pub type ReconResult<T> = Result<T, ReconError>;

/// Severity of a single validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Blocks the match
    Error,
    /// Reported to the reviewer but does not block a manual match
    Warning,
}

/// One finding from `validate_match`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Stable machine-readable code, e.g. `incompatible_types`
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Outcome of pre-flight match validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// False only when an `Error`-severity issue is present
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let valid = issues.iter().all(|i| i.severity != IssueSeverity::Error);
        Self { valid, issues }
    }
}
