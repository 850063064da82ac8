use thiserror::Error;

use crate::services::rating_store::StoreError;

/// Malformed rating input, rejected before anything is persisted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be between 1 and 5, got {value}")]
    ScoreOutOfRange { field: String, value: i32 },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Category name must not be blank")]
    BlankCategory,

    #[error("User {0} cannot rate themselves")]
    SelfRating(String),

    #[error("Written review exceeds {max} characters")]
    ReviewTooLong { max: usize },
}

/// Malformed scorer input, rejected before any score is computed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInputError {
    #[error("{field}: min {min} is greater than max {max}")]
    InvertedRange { field: &'static str, min: f64, max: f64 },

    #[error("{field}: bounds must be finite and non-negative")]
    InvalidBound { field: &'static str },

    #[error("{field}: window ends before it starts")]
    InvertedWindow { field: &'static str },

    #[error("Years of experience must be finite and non-negative")]
    InvalidExperience,
}

/// Errors surfaced by the scoring engine
///
/// Cloneable so a failed single-flight computation can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    #[error("Rating store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => EngineError::Validation(e),
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    /// Whether the caller sent bad input (as opposed to a backend failure)
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::Validation(_) | EngineError::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_validation_maps_to_validation() {
        let err: EngineError = StoreError::Validation(ValidationError::BlankCategory).into();
        assert!(matches!(err, EngineError::Validation(ValidationError::BlankCategory)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_store_failure_is_not_client_error() {
        let err: EngineError = StoreError::Database("connection refused".to_string()).into();
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "Rating store error: Database error: connection refused");
    }
}
