//! Match scoring and candidate search

pub mod finder;
pub mod scorer;

pub use finder::{CandidateFinder, FinderConfig, MatchCandidate};
pub use scorer::{are_types_compatible, score_match, MatchFactors, MatchScore, ScoringConfig};
