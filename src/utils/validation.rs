//! Input validation helpers

use crate::types::{DateRange, ReconError, ReconResult};

/// Validate a confidence threshold is within the 0-100 score scale
pub fn validate_confidence(confidence: f64) -> ReconResult<()> {
    if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
        return Err(ReconError::InvalidInput(format!(
            "confidence must be between 0 and 100, got {confidence}"
        )));
    }
    Ok(())
}

/// Validate that a date range is well-ordered
pub fn validate_date_range(range: &DateRange) -> ReconResult<()> {
    if let (Some(start), Some(end)) = (range.start, range.end) {
        if start > end {
            return Err(ReconError::InvalidInput(format!(
                "date range start {start} is after end {end}"
            )));
        }
    }
    Ok(())
}

/// Validate a match amount is positive
pub fn validate_match_amount(amount: i64) -> ReconResult<()> {
    if amount <= 0 {
        return Err(ReconError::InvalidInput(format!(
            "match amount must be positive, got {amount}"
        )));
    }
    Ok(())
}
