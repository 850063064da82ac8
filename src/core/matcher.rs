use std::cmp::Ordering;

use crate::core::scoring::calculate_compatibility;
use crate::error::InvalidInputError;
use crate::models::{
    CompatibilityResult, MatchCandidate, MatchRequest, RejectedCandidate, ScoringWeights,
    TimelinePolicy,
};

/// Result of ranking a batch of candidates
#[derive(Debug, Default)]
pub struct MatchResult {
    pub matches: Vec<CompatibilityResult>,
    pub rejected: Vec<RejectedCandidate>,
    pub total_candidates: usize,
    /// Set when a time budget stopped scoring before every candidate was seen
    pub truncated: bool,
}

impl MatchResult {
    pub fn with_total(total_candidates: usize) -> Self {
        Self {
            total_candidates,
            ..Self::default()
        }
    }

    /// Number of candidates scored or rejected so far
    pub fn seen(&self) -> usize {
        self.matches.len() + self.rejected.len()
    }

    /// Record the outcome for one candidate; a malformed candidate is
    /// listed under `rejected` and never affects the others
    pub fn record(&mut self, auditor_id: &str, outcome: Result<CompatibilityResult, InvalidInputError>) {
        match outcome {
            Ok(scored) => self.matches.push(scored),
            Err(e) => self.reject(auditor_id, e.to_string()),
        }
    }

    pub fn reject(&mut self, auditor_id: &str, reason: String) {
        tracing::debug!("Rejected candidate {}: {}", auditor_id, reason);
        self.rejected.push(RejectedCandidate {
            auditor_id: auditor_id.to_string(),
            reason,
        });
    }

    /// Put the matches in ranking order
    pub fn finish(mut self) -> Self {
        sort_matches(&mut self.matches);
        self
    }
}

/// Scores audit requests against candidate auditors and ranks them
///
/// # Ranking
/// 1. Compatibility score, descending
/// 2. Reputation weight, descending
/// 3. Auditor id, ascending
#[derive(Debug, Clone)]
pub struct CompatibilityScorer {
    weights: ScoringWeights,
    timeline: TimelinePolicy,
}

impl CompatibilityScorer {
    pub fn new(weights: ScoringWeights, timeline: TimelinePolicy) -> Self {
        Self { weights, timeline }
    }

    pub fn with_default_weights() -> Self {
        Self {
            weights: ScoringWeights::default(),
            timeline: TimelinePolicy::default(),
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score a single candidate against a request
    pub fn score(
        &self,
        request: &MatchRequest,
        candidate: &MatchCandidate,
    ) -> Result<CompatibilityResult, InvalidInputError> {
        calculate_compatibility(request, candidate, &self.weights, &self.timeline)
    }
}

impl Default for CompatibilityScorer {
    fn default() -> Self {
        Self::with_default_weights()
    }
}

/// Deterministic ranking order for compatibility results
pub fn compare_matches(a: &CompatibilityResult, b: &CompatibilityResult) -> Ordering {
    b.compatibility_score
        .total_cmp(&a.compatibility_score)
        .then_with(|| b.reputation_weight.total_cmp(&a.reputation_weight))
        .then_with(|| a.auditor_id.cmp(&b.auditor_id))
}

pub fn sort_matches(matches: &mut [CompatibilityResult]) {
    matches.sort_by(compare_matches);
}
