use std::sync::Arc;

use crate::core::reputation::aggregate_ratings;
use crate::models::ReputationScore;
use crate::services::rating_store::{RatingStore, StoreError};

/// Reads a subject's rating history and folds it into a reputation score
#[derive(Clone)]
pub struct ReputationAggregator {
    store: Arc<dyn RatingStore>,
}

impl ReputationAggregator {
    pub fn new(store: Arc<dyn RatingStore>) -> Self {
        Self { store }
    }

    /// Compute the current trust score of `subject_id`
    ///
    /// Subjects without ratings get the unrated score rather than an error.
    pub async fn compute_trust_score(&self, subject_id: &str) -> Result<ReputationScore, StoreError> {
        let ratings = self.store.list_by_subject(subject_id).await?;
        let score = aggregate_ratings(subject_id, &ratings);

        tracing::debug!(
            "Computed trust score {} for {} from {} ratings",
            score.trust_score,
            subject_id,
            score.total_ratings
        );

        Ok(score)
    }
}
