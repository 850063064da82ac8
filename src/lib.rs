//! Audit Score - reputation and compatibility scoring for an audit marketplace
//!
//! This library aggregates rating histories into trust scores, ranks auditors
//! against audit requests, and caches both behind a single-flight score cache.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{aggregate_ratings, CompatibilityScorer, MatchResult};
pub use error::{EngineError, InvalidInputError, ValidationError};
pub use models::{
    CandidateProfile, CompatibilityResult, MatchCandidate, MatchRequest, Rating, ReputationScore,
    ScoringWeights, TrustLevel,
};
pub use services::{InMemoryRatingStore, RatingStore, ReputationAggregator, ScoreCache, ScoringEngine};
