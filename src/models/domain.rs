use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::error::ValidationError;

/// Identifier assigned to a stored rating
pub type RatingId = Uuid;

/// Lowest accepted score on the five-star scale
pub const MIN_SCORE: i32 = 1;
/// Highest accepted score on the five-star scale
pub const MAX_SCORE: i32 = 5;
/// Longest written review accepted, in characters
pub const MAX_REVIEW_CHARS: usize = 5000;

/// A single rating left by one user for another within an audit context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: RatingId,
    pub subject_id: String,
    pub rater_id: String,
    pub context_id: String,
    pub overall_score: i32,
    #[serde(default)]
    pub category_scores: BTreeMap<String, i32>,
    #[serde(default)]
    pub recommends: bool,
    #[serde(default)]
    pub written_review: String,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(
        subject_id: impl Into<String>,
        rater_id: impl Into<String>,
        context_id: impl Into<String>,
        overall_score: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            rater_id: rater_id.into(),
            context_id: context_id.into(),
            overall_score,
            category_scores: BTreeMap::new(),
            recommends: false,
            written_review: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>, score: i32) -> Self {
        self.category_scores.insert(category.into(), score);
        self
    }

    pub fn recommending(mut self, recommends: bool) -> Self {
        self.recommends = recommends;
        self
    }

    pub fn with_review(mut self, review: impl Into<String>) -> Self {
        self.written_review = review.into();
        self
    }

    /// Check every invariant a rating must satisfy before it is persisted.
    ///
    /// Out-of-range scores are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subject_id.trim().is_empty() {
            return Err(ValidationError::MissingField("subjectId"));
        }
        if self.rater_id.trim().is_empty() {
            return Err(ValidationError::MissingField("raterId"));
        }
        if self.context_id.trim().is_empty() {
            return Err(ValidationError::MissingField("contextId"));
        }
        if self.rater_id == self.subject_id {
            return Err(ValidationError::SelfRating(self.rater_id.clone()));
        }

        check_score("overallScore", self.overall_score)?;
        for (category, score) in &self.category_scores {
            if category.trim().is_empty() {
                return Err(ValidationError::BlankCategory);
            }
            check_score(category, *score)?;
        }

        if self.written_review.chars().count() > MAX_REVIEW_CHARS {
            return Err(ValidationError::ReviewTooLong { max: MAX_REVIEW_CHARS });
        }

        Ok(())
    }
}

fn check_score(field: &str, value: i32) -> Result<(), ValidationError> {
    if (MIN_SCORE..=MAX_SCORE).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::ScoreOutOfRange {
            field: field.to_string(),
            value,
        })
    }
}

/// Aggregated reputation of a single subject, derived from its full rating history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationScore {
    pub subject_id: String,
    pub overall_rating: f64,
    pub total_ratings: u32,
    pub category_scores: BTreeMap<String, f64>,
    pub recommendation_rate: f64,
    pub trust_score: f64,
}

impl ReputationScore {
    /// Score of a subject nobody has rated yet. This is a valid state, not an error.
    pub fn unrated(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            overall_rating: 0.0,
            total_ratings: 0,
            category_scores: BTreeMap::new(),
            recommendation_rate: 0.0,
            trust_score: 0.0,
        }
    }

    pub fn is_rated(&self) -> bool {
        self.total_ratings > 0
    }

    pub fn trust_level(&self) -> TrustLevel {
        TrustLevel::from_score(self.trust_score)
    }
}

/// Ordered trust bands; each band includes its lower bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    New,
    Developing,
    Verified,
    Expert,
    Elite,
}

impl TrustLevel {
    pub fn from_score(trust_score: f64) -> Self {
        if trust_score >= 4.5 {
            TrustLevel::Elite
        } else if trust_score >= 4.0 {
            TrustLevel::Expert
        } else if trust_score >= 3.5 {
            TrustLevel::Verified
        } else if trust_score >= 2.5 {
            TrustLevel::Developing
        } else {
            // Also catches NaN
            TrustLevel::New
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrustLevel::Elite => "Elite",
            TrustLevel::Expert => "Expert",
            TrustLevel::Verified => "Verified",
            TrustLevel::Developing => "Developing",
            TrustLevel::New => "New",
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Closed time interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Closed numeric range, used for budgets and hourly rates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateRange {
    pub min: f64,
    pub max: f64,
}

impl RateRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Auditor profile as supplied by the marketplace, before reputation is attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProfile {
    pub auditor_id: String,
    #[serde(default)]
    pub expertise_tags: BTreeSet<String>,
    pub availability: TimeWindow,
    pub hourly_rate_range: RateRange,
    #[serde(default)]
    pub years_experience: f64,
}

/// Auditor considered for an audit request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub auditor_id: String,
    pub expertise_tags: BTreeSet<String>,
    pub availability: TimeWindow,
    pub hourly_rate_range: RateRange,
    pub years_experience: f64,
    pub reputation: ReputationScore,
}

impl MatchCandidate {
    pub fn from_profile(profile: CandidateProfile, reputation: ReputationScore) -> Self {
        Self {
            auditor_id: profile.auditor_id,
            expertise_tags: profile.expertise_tags,
            availability: profile.availability,
            hourly_rate_range: profile.hourly_rate_range,
            years_experience: profile.years_experience,
            reputation,
        }
    }
}

/// Audit request a project wants matched against auditors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub request_id: String,
    #[serde(default)]
    pub required_expertise: BTreeSet<String>,
    pub budget_range: RateRange,
    pub desired_timeline: TimeWindow,
    pub deadline: DateTime<Utc>,
}

/// Per-candidate compatibility breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityResult {
    pub auditor_id: String,
    pub request_id: String,
    pub expertise_match: f64,
    pub availability_score: f64,
    pub budget_compatibility: f64,
    pub timeline_feasibility: f64,
    pub reputation_weight: f64,
    pub compatibility_score: f64,
}

/// Scoring weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub expertise: f64,
    pub availability: f64,
    pub budget: f64,
    pub timeline: f64,
    pub reputation: f64,
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.expertise + self.availability + self.budget + self.timeline + self.reputation
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            expertise: 0.35,
            availability: 0.20,
            budget: 0.20,
            timeline: 0.15,
            reputation: 0.10,
        }
    }
}

/// Experience-based completion estimate.
///
/// An auditor's estimated duration is the requested duration multiplied by
/// `max(min_multiplier, base_multiplier - per_year * years_experience)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelinePolicy {
    pub base_multiplier: f64,
    pub per_year: f64,
    pub min_multiplier: f64,
}

impl TimelinePolicy {
    pub fn multiplier(&self, years_experience: f64) -> f64 {
        (self.base_multiplier - self.per_year * years_experience).max(self.min_multiplier)
    }
}

impl Default for TimelinePolicy {
    fn default() -> Self {
        Self {
            base_multiplier: 1.5,
            per_year: 0.1,
            min_multiplier: 0.5,
        }
    }
}
