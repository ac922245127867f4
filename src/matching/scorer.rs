//! Multi-factor match scoring
//!
//! Pure functions: one bank line and one ledger transaction in, a 0-100
//! confidence score with a per-factor breakdown out. No storage access.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{BankLine, Direction, LedgerKind, LedgerTransaction};

/// Weights and tolerances for the match scorer.
///
/// The defaults sum to 100: amount 50, date 20, description 20, and a 10
/// point reference bonus. Callers can override any of them; the final
/// score is always clamped to [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Points awarded for an exact amount match
    pub amount_weight: f64,
    /// Points awarded for a same-day match
    pub date_weight: f64,
    /// Points awarded for identical description token sets
    pub description_weight: f64,
    /// Flat bonus for an exact non-empty reference match
    pub reference_bonus: f64,
    /// Relative amount difference at which the amount factor reaches zero
    pub amount_tolerance: f64,
    /// Day difference at which the date factor reaches zero
    pub date_window_days: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            amount_weight: 50.0,
            date_weight: 20.0,
            description_weight: 20.0,
            reference_bonus: 10.0,
            amount_tolerance: 0.5,
            date_window_days: 14,
        }
    }
}

/// Weighted points contributed by each scoring factor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchFactors {
    pub amount: f64,
    pub date: f64,
    pub description: f64,
    pub reference: f64,
}

/// Result of scoring one (bank line, ledger transaction) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    /// Confidence in [0, 100]; exactly 0 for type-incompatible pairs
    pub total: f64,
    pub factors: MatchFactors,
}

impl MatchScore {
    fn zero() -> Self {
        Self {
            total: 0.0,
            factors: MatchFactors::default(),
        }
    }
}

/// Hard compatibility gate between a bank line direction and a ledger kind.
///
/// Credits can only settle income or transfers; debits can only settle
/// expenses or transfers. An incompatible pair scores zero regardless of
/// every other factor.
pub fn are_types_compatible(direction: Direction, kind: LedgerKind) -> bool {
    match direction {
        Direction::Credit => matches!(kind, LedgerKind::Income | LedgerKind::Transfer),
        Direction::Debit => matches!(kind, LedgerKind::Expense | LedgerKind::Transfer),
    }
}

/// Score a bank line against a ledger transaction
pub fn score_match(
    config: &ScoringConfig,
    line: &BankLine,
    transaction: &LedgerTransaction,
) -> MatchScore {
    if !are_types_compatible(line.direction, transaction.kind) {
        return MatchScore::zero();
    }

    let factors = MatchFactors {
        amount: config.amount_weight * amount_similarity(line.amount, transaction.amount, config),
        date: config.date_weight * date_similarity(line.date, transaction.date, config),
        description: config.description_weight
            * description_similarity(&line.description, &transaction.description),
        reference: if references_match(line.reference.as_deref(), transaction.reference.as_deref())
        {
            config.reference_bonus
        } else {
            0.0
        },
    };

    let total = factors.amount + factors.date + factors.description + factors.reference;
    MatchScore {
        total: total.clamp(0.0, 100.0),
        factors,
    }
}

/// Linear decay in the relative amount difference: 1.0 for equal amounts,
/// 0.0 at or beyond the configured tolerance
fn amount_similarity(a: i64, b: i64, config: &ScoringConfig) -> f64 {
    if a == b {
        return 1.0;
    }
    let larger = a.max(b);
    if larger == 0 || config.amount_tolerance <= 0.0 {
        return 0.0;
    }
    let relative_diff = (a - b).abs() as f64 / larger as f64;
    (1.0 - relative_diff / config.amount_tolerance).max(0.0)
}

/// Linear decay in the day difference: 1.0 for the same day, 0.0 at or
/// beyond the configured window
fn date_similarity(a: chrono::NaiveDate, b: chrono::NaiveDate, config: &ScoringConfig) -> f64 {
    if config.date_window_days <= 0 {
        return 0.0;
    }
    let days_apart = (a - b).num_days().abs();
    (1.0 - days_apart as f64 / config.date_window_days as f64).max(0.0)
}

/// Token-set overlap between two descriptions.
///
/// Tokenizes on whitespace, drops tokens of two characters or fewer, and
/// compares case-insensitively. Returns the Jaccard index of the two
/// token sets; either set being empty yields 0.
fn description_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let shared = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    shared as f64 / union as f64
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .filter(|token| token.chars().count() > 2)
        .map(|token| token.to_lowercase())
        .collect()
}

/// Exact reference equality after trimming; blank references never match
fn references_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = a.trim();
            let b = b.trim();
            !a.is_empty() && a == b
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BankLine, LedgerTransaction};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn line(direction: Direction, amount: i64, day: u32, desc: &str) -> BankLine {
        BankLine::new(
            "bl1".to_string(),
            "acc1".to_string(),
            date(2026, 1, day),
            desc.to_string(),
            direction,
            amount,
        )
    }

    fn txn(kind: LedgerKind, amount: i64, day: u32, desc: &str) -> LedgerTransaction {
        LedgerTransaction::new(
            "tx1".to_string(),
            "user1".to_string(),
            kind,
            date(2026, 1, day),
            desc.to_string(),
            amount,
        )
    }

    #[test]
    fn compatibility_gate() {
        assert!(are_types_compatible(Direction::Credit, LedgerKind::Income));
        assert!(are_types_compatible(
            Direction::Credit,
            LedgerKind::Transfer
        ));
        assert!(are_types_compatible(Direction::Debit, LedgerKind::Expense));
        assert!(are_types_compatible(Direction::Debit, LedgerKind::Transfer));
        assert!(!are_types_compatible(Direction::Credit, LedgerKind::Expense));
        assert!(!are_types_compatible(Direction::Debit, LedgerKind::Income));
    }

    #[test]
    fn incompatible_pair_scores_exactly_zero() {
        let config = ScoringConfig::default();
        // Identical amount, date, description, reference; wrong kind.
        let line = line(Direction::Credit, 50000, 15, "Payment from ABC Corp")
            .with_reference("INV-001".to_string());
        let txn = txn(LedgerKind::Expense, 50000, 15, "Payment from ABC Corp")
            .with_reference("INV-001".to_string());
        let score = score_match(&config, &line, &txn);
        assert_eq!(score.total, 0.0);
        assert_eq!(score.factors, MatchFactors::default());
    }

    #[test]
    fn exact_match_scores_at_least_ninety() {
        let config = ScoringConfig::default();
        let line = line(Direction::Credit, 50000, 15, "Payment from ABC Corp")
            .with_reference("INV-001".to_string());
        let txn = txn(LedgerKind::Income, 50000, 15, "Payment from ABC Corp")
            .with_reference("INV-001".to_string());
        let score = score_match(&config, &line, &txn);
        assert!(score.total >= 90.0, "score was {}", score.total);
        assert!(score.total <= 100.0);
    }

    #[test]
    fn score_is_always_within_bounds() {
        let config = ScoringConfig::default();
        let cases = [
            (0, 0, 15, ""),
            (1, i64::MAX / 2, 1, "x"),
            (50000, 50000, 31, "Payment from ABC Corp"),
        ];
        for (a, b, day, desc) in cases {
            let line = line(Direction::Debit, a, 15, desc);
            let txn = txn(LedgerKind::Expense, b, day, desc);
            let score = score_match(&config, &line, &txn);
            assert!(
                (0.0..=100.0).contains(&score.total),
                "score {} out of bounds",
                score.total
            );
        }
    }

    #[test]
    fn amount_decay_is_monotonic() {
        let config = ScoringConfig::default();
        let base = line(Direction::Debit, 10000, 15, "Office supplies");
        let exact = score_match(
            &config,
            &base,
            &txn(LedgerKind::Expense, 10000, 15, "Office supplies"),
        );
        let five_off = score_match(
            &config,
            &base,
            &txn(LedgerKind::Expense, 10500, 15, "Office supplies"),
        );
        let half_off = score_match(
            &config,
            &base,
            &txn(LedgerKind::Expense, 20000, 15, "Office supplies"),
        );
        assert!(exact.total > five_off.total);
        assert!(five_off.total > half_off.total);
        // 50% relative difference sits exactly at the default tolerance.
        assert_eq!(half_off.factors.amount, 0.0);
    }

    #[test]
    fn date_decay_is_monotonic_and_zero_beyond_window() {
        let config = ScoringConfig::default();
        let base = line(Direction::Debit, 10000, 5, "Office supplies");
        let same_day = score_match(
            &config,
            &base,
            &txn(LedgerKind::Expense, 10000, 5, "Office supplies"),
        );
        let three_days = score_match(
            &config,
            &base,
            &txn(LedgerKind::Expense, 10000, 8, "Office supplies"),
        );
        let twenty_days = score_match(
            &config,
            &base,
            &txn(LedgerKind::Expense, 10000, 25, "Office supplies"),
        );
        assert!(same_day.total > three_days.total);
        assert!(three_days.total > twenty_days.total);
        assert_eq!(twenty_days.factors.date, 0.0);
    }

    #[test]
    fn description_overlap_ignores_case_and_short_tokens() {
        assert_eq!(description_similarity("PAYMENT TO ACME", "payment acme"), 1.0);
        assert_eq!(description_similarity("at to of", "at to of"), 0.0);
        assert_eq!(description_similarity("", "anything here"), 0.0);
        let partial = description_similarity("card payment acme", "card payment zenith");
        assert!(partial > 0.0 && partial < 1.0);
    }

    #[test]
    fn reference_bonus_requires_exact_nonblank_match() {
        assert!(references_match(Some("INV-001"), Some("INV-001")));
        assert!(references_match(Some(" INV-001 "), Some("INV-001")));
        assert!(!references_match(Some("INV-001"), Some("INV-002")));
        assert!(!references_match(Some(""), Some("")));
        assert!(!references_match(Some("   "), Some("   ")));
        assert!(!references_match(Some("INV-001"), None));
        assert!(!references_match(None, None));
    }

    #[test]
    fn reference_bonus_never_pushes_score_past_hundred() {
        let config = ScoringConfig {
            reference_bonus: 40.0,
            ..ScoringConfig::default()
        };
        let line = line(Direction::Credit, 50000, 15, "Payment from ABC Corp")
            .with_reference("INV-001".to_string());
        let txn = txn(LedgerKind::Income, 50000, 15, "Payment from ABC Corp")
            .with_reference("INV-001".to_string());
        let score = score_match(&config, &line, &txn);
        assert_eq!(score.total, 100.0);
    }
}
