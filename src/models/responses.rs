use serde::{Deserialize, Serialize};

use crate::models::domain::{CompatibilityResult, Rating, RatingId, ReputationScore, TrustLevel};

/// Response for the submit rating endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRatingResponse {
    pub success: bool,
    #[serde(rename = "ratingId")]
    pub rating_id: RatingId,
}

/// Reputation with its trust classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationResponse {
    #[serde(flatten)]
    pub reputation: ReputationScore,
    #[serde(rename = "trustLevel")]
    pub trust_level: TrustLevel,
    #[serde(rename = "trustLabel")]
    pub trust_label: String,
}

impl From<ReputationScore> for ReputationResponse {
    fn from(reputation: ReputationScore) -> Self {
        let trust_level = reputation.trust_level();
        Self {
            reputation,
            trust_level,
            trust_label: trust_level.label().to_string(),
        }
    }
}

/// Rating history of a subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingsResponse {
    #[serde(rename = "subjectId")]
    pub subject_id: String,
    pub ratings: Vec<Rating>,
    pub count: usize,
}

/// Candidate left out of a ranking because its input was malformed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedCandidate {
    #[serde(rename = "auditorId")]
    pub auditor_id: String,
    pub reason: String,
}

/// Response for the find matches endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindMatchesResponse {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub matches: Vec<CompatibilityResult>,
    pub rejected: Vec<RejectedCandidate>,
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
    pub truncated: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
