// Core algorithm exports
pub mod matcher;
pub mod ranges;
pub mod reputation;
pub mod scoring;

pub use matcher::{CompatibilityScorer, MatchResult, compare_matches, sort_matches};
pub use reputation::{aggregate_ratings, round_half_up, trust_score};
pub use scoring::{calculate_compatibility, reputation_weight, UNRATED_REPUTATION_WEIGHT};
