//! Utility modules: in-memory storage and input validation

pub mod memory_storage;
pub mod validation;

pub use memory_storage::MemoryStorage;
pub use validation::{validate_confidence, validate_date_range, validate_match_amount};
