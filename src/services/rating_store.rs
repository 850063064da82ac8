use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::error::ValidationError;
use crate::models::{Rating, RatingId};

/// Errors that can occur when reading or writing ratings
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Rating already exists for rater {rater_id} in context {context_id}")]
    Duplicate { rater_id: String, context_id: String },

    #[error("Rating does not belong to rater {rater_id} in context {context_id}")]
    ContextMismatch { rater_id: String, context_id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Corrupt rating record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(err.to_string())
    }
}

/// Durable log of ratings
///
/// At most one live rating exists per `(subject, rater, context)`. `append`
/// refuses to create a second one; `upsert_by_context` supersedes it.
#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Persist a new rating. Fails on out-of-range scores or an existing
    /// rating for the same rater and context.
    async fn append(&self, rating: Rating) -> Result<RatingId, StoreError>;

    /// Insert or overwrite the rating `rater_id` left in `context_id`.
    ///
    /// An overwrite keeps the original id and `created_at`.
    async fn upsert_by_context(
        &self,
        rater_id: &str,
        context_id: &str,
        rating: Rating,
    ) -> Result<RatingId, StoreError>;

    /// Every live rating of a subject, oldest first
    async fn list_by_subject(&self, subject_id: &str) -> Result<Vec<Rating>, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

fn check_context(rater_id: &str, context_id: &str, rating: &Rating) -> Result<(), StoreError> {
    if rating.rater_id != rater_id || rating.context_id != context_id {
        return Err(StoreError::ContextMismatch {
            rater_id: rater_id.to_string(),
            context_id: context_id.to_string(),
        });
    }
    Ok(())
}

/// In-process rating store
///
/// Ratings are grouped per subject; used by tests and the `memory` backend.
#[derive(Default)]
pub struct InMemoryRatingStore {
    ratings: RwLock<HashMap<String, Vec<Rating>>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored ratings across all subjects
    pub async fn len(&self) -> usize {
        self.ratings.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn append(&self, rating: Rating) -> Result<RatingId, StoreError> {
        rating.validate()?;

        let mut ratings = self.ratings.write().await;
        let subject = ratings.entry(rating.subject_id.clone()).or_default();

        if subject
            .iter()
            .any(|r| r.rater_id == rating.rater_id && r.context_id == rating.context_id)
        {
            return Err(StoreError::Duplicate {
                rater_id: rating.rater_id,
                context_id: rating.context_id,
            });
        }

        let id = rating.id;
        subject.push(rating);
        Ok(id)
    }

    async fn upsert_by_context(
        &self,
        rater_id: &str,
        context_id: &str,
        rating: Rating,
    ) -> Result<RatingId, StoreError> {
        check_context(rater_id, context_id, &rating)?;
        rating.validate()?;

        let mut ratings = self.ratings.write().await;
        let subject = ratings.entry(rating.subject_id.clone()).or_default();

        match subject
            .iter_mut()
            .find(|r| r.rater_id == rater_id && r.context_id == context_id)
        {
            Some(existing) => {
                existing.overall_score = rating.overall_score;
                existing.category_scores = rating.category_scores;
                existing.recommends = rating.recommends;
                existing.written_review = rating.written_review;
                tracing::debug!("Superseded rating {} ({} -> {})", existing.id, rater_id, existing.subject_id);
                Ok(existing.id)
            }
            None => {
                let id = rating.id;
                subject.push(rating);
                Ok(id)
            }
        }
    }

    async fn list_by_subject(&self, subject_id: &str) -> Result<Vec<Rating>, StoreError> {
        let mut list = self
            .ratings
            .read()
            .await
            .get(subject_id)
            .cloned()
            .unwrap_or_default();

        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }
}
