use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use crate::models::domain::{CandidateProfile, MatchRequest, Rating};

/// Request to submit (or resubmit) a rating
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitRatingRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "subject_id", rename = "subjectId")]
    pub subject_id: String,
    #[validate(length(min = 1))]
    #[serde(alias = "rater_id", rename = "raterId")]
    pub rater_id: String,
    #[validate(length(min = 1))]
    #[serde(alias = "context_id", rename = "contextId")]
    pub context_id: String,
    #[serde(alias = "overall_score", rename = "overallScore")]
    pub overall_score: i32,
    #[serde(default)]
    #[serde(alias = "category_scores", rename = "categoryScores")]
    pub category_scores: BTreeMap<String, i32>,
    #[serde(default)]
    pub recommends: bool,
    #[serde(default)]
    #[serde(alias = "written_review", rename = "writtenReview")]
    pub written_review: String,
}

impl SubmitRatingRequest {
    /// Convert into a fresh rating; score ranges are checked by the engine.
    pub fn into_rating(self) -> Rating {
        let mut rating = Rating::new(self.subject_id, self.rater_id, self.context_id, self.overall_score)
            .recommending(self.recommends)
            .with_review(self.written_review);
        rating.category_scores = self.category_scores;
        rating
    }
}

/// Request to rank candidate auditors for an audit request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FindMatchesRequest {
    pub request: MatchRequest,
    #[validate(length(max = 1000))]
    #[serde(default)]
    pub candidates: Vec<CandidateProfile>,
    #[serde(default)]
    pub limit: Option<u16>,
}
