use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::matcher::{CompatibilityScorer, MatchResult};
use crate::core::scoring::validate_request;
use crate::error::{EngineError, ValidationError};
use crate::models::{
    CandidateProfile, CompatibilityResult, MatchCandidate, MatchRequest, Rating, RatingId, ReputationScore,
};
use crate::services::cache::{CacheKey, CacheStats, ScoreCache};
use crate::services::rating_store::RatingStore;
use crate::services::reputation::ReputationAggregator;

/// Caller-facing entry point of the scoring engine
///
/// Constructed once by the application and shared; there is no global state.
/// Reputation cache keys embed a per-subject epoch that every rating
/// submission bumps, so a score computed before a write is never served
/// after the write is acknowledged.
///
/// Epochs are drawn from one process-wide counter and are never reused. A
/// subject's epoch is forgotten once it has been idle for twice the
/// reputation cache retention; by then every entry keyed by it has expired.
pub struct ScoringEngine {
    store: Arc<dyn RatingStore>,
    aggregator: ReputationAggregator,
    scorer: CompatibilityScorer,
    reputation_cache: ScoreCache<ReputationScore>,
    match_cache: ScoreCache<CompatibilityResult>,
    epochs: Cache<String, u64>,
    generation: AtomicU64,
}

impl ScoringEngine {
    pub fn new(
        store: Arc<dyn RatingStore>,
        scorer: CompatibilityScorer,
        reputation_cache: ScoreCache<ReputationScore>,
        match_cache: ScoreCache<CompatibilityResult>,
    ) -> Self {
        let epoch_idle = reputation_cache
            .retention()
            .saturating_mul(2)
            .max(Duration::from_millis(1));
        let epochs: Cache<String, u64> = Cache::builder().time_to_idle(epoch_idle).build();

        Self {
            aggregator: ReputationAggregator::new(Arc::clone(&store)),
            store,
            scorer,
            reputation_cache,
            match_cache,
            epochs,
            generation: AtomicU64::new(0),
        }
    }

    pub fn scorer(&self) -> &CompatibilityScorer {
        &self.scorer
    }

    /// Submit or resubmit a rating
    ///
    /// A second submission by the same rater for the same context supersedes
    /// the first. The subject's cached reputation is dropped once the store
    /// acknowledges the write.
    pub async fn submit_rating(&self, rating: Rating) -> Result<RatingId, EngineError> {
        rating.validate()?;

        let subject_id = rating.subject_id.clone();
        let rater_id = rating.rater_id.clone();
        let context_id = rating.context_id.clone();

        let id = self.store.upsert_by_context(&rater_id, &context_id, rating).await?;

        let stale_epoch = self.epoch(&subject_id).await;
        let epoch = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.epochs.insert(subject_id.clone(), epoch).await;
        self.reputation_cache
            .invalidate(&CacheKey::reputation(&subject_id, stale_epoch))
            .await;

        tracing::info!("Recorded rating {} for {} by {} ({})", id, subject_id, rater_id, context_id);

        Ok(id)
    }

    async fn epoch(&self, subject_id: &str) -> u64 {
        self.epochs.get(subject_id).await.unwrap_or(0)
    }

    /// Number of subjects whose epoch is still remembered
    pub async fn tracked_subjects(&self) -> u64 {
        self.epochs.run_pending_tasks().await;
        self.epochs.entry_count()
    }

    /// Current reputation of a subject, served from cache when fresh
    pub async fn get_reputation(&self, subject_id: &str) -> Result<ReputationScore, EngineError> {
        if subject_id.trim().is_empty() {
            return Err(ValidationError::MissingField("subjectId").into());
        }

        let key = CacheKey::reputation(subject_id, self.epoch(subject_id).await);
        let aggregator = self.aggregator.clone();
        let subject = subject_id.to_string();

        self.reputation_cache
            .get_or_compute(&key, self.reputation_cache.default_ttl(), move || async move {
                aggregator
                    .compute_trust_score(&subject)
                    .await
                    .map_err(EngineError::from)
            })
            .await
    }

    /// Full rating history of a subject, oldest first
    pub async fn list_ratings(&self, subject_id: &str) -> Result<Vec<Rating>, EngineError> {
        Ok(self.store.list_by_subject(subject_id).await?)
    }

    /// Attach the auditor's current reputation to a marketplace profile
    pub async fn hydrate_candidate(&self, profile: CandidateProfile) -> Result<MatchCandidate, EngineError> {
        let reputation = self.get_reputation(&profile.auditor_id).await?;
        Ok(MatchCandidate::from_profile(profile, reputation))
    }

    /// Rank candidates for a request, best first
    pub async fn get_matches(
        &self,
        request: &MatchRequest,
        candidates: &[MatchCandidate],
    ) -> Result<MatchResult, EngineError> {
        self.get_matches_within(request, candidates, None).await
    }

    /// Rank candidates, stopping early once `budget` is spent
    ///
    /// Candidates are scored one at a time; when the budget runs out the
    /// results gathered so far are still ranked and returned with
    /// `truncated = true`.
    pub async fn get_matches_within(
        &self,
        request: &MatchRequest,
        candidates: &[MatchCandidate],
        budget: Option<Duration>,
    ) -> Result<MatchResult, EngineError> {
        let deadline = deadline_after(budget);
        validate_request(request)?;

        let shared_request = Arc::new(request.clone());
        let mut result = MatchResult::with_total(candidates.len());

        for candidate in candidates {
            if budget_spent(deadline, request, &result) {
                result.truncated = true;
                break;
            }
            let scored = self.score_cached(&shared_request, candidate).await;
            self.record_scored(&mut result, &candidate.auditor_id, scored)?;
        }

        Ok(self.finish(request, result))
    }

    /// Hydrate and rank marketplace profiles under one budget
    ///
    /// The budget covers the reputation lookups as well as scoring, so a
    /// slow rating store cannot push the call past it. Profiles whose
    /// reputation cannot be looked up because of a client error are
    /// rejected; a store failure fails the call.
    pub async fn rank_profiles_within(
        &self,
        request: &MatchRequest,
        profiles: Vec<CandidateProfile>,
        budget: Option<Duration>,
    ) -> Result<MatchResult, EngineError> {
        let deadline = deadline_after(budget);
        validate_request(request)?;

        let shared_request = Arc::new(request.clone());
        let mut result = MatchResult::with_total(profiles.len());

        for profile in profiles {
            if budget_spent(deadline, request, &result) {
                result.truncated = true;
                break;
            }

            let auditor_id = profile.auditor_id.clone();
            let candidate = match self.hydrate_candidate(profile).await {
                Ok(candidate) => candidate,
                Err(e) if e.is_client_error() => {
                    result.reject(&auditor_id, e.to_string());
                    continue;
                }
                Err(e) => return Err(e),
            };

            if budget_spent(deadline, request, &result) {
                result.truncated = true;
                break;
            }
            let scored = self.score_cached(&shared_request, &candidate).await;
            self.record_scored(&mut result, &auditor_id, scored)?;
        }

        Ok(self.finish(request, result))
    }

    async fn score_cached(
        &self,
        request: &Arc<MatchRequest>,
        candidate: &MatchCandidate,
    ) -> Result<CompatibilityResult, EngineError> {
        let key = CacheKey::compatibility(request, candidate, self.scorer.weights());
        let scorer = self.scorer.clone();
        let req = Arc::clone(request);
        let cand = candidate.clone();

        self.match_cache
            .get_or_compute(&key, self.match_cache.default_ttl(), move || async move {
                scorer.score(&req, &cand).map_err(EngineError::from)
            })
            .await
    }

    fn record_scored(
        &self,
        result: &mut MatchResult,
        auditor_id: &str,
        scored: Result<CompatibilityResult, EngineError>,
    ) -> Result<(), EngineError> {
        match scored {
            Ok(scored) => result.record(auditor_id, Ok(scored)),
            Err(EngineError::InvalidInput(e)) => result.record(auditor_id, Err(e)),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn finish(&self, request: &MatchRequest, result: MatchResult) -> MatchResult {
        let result = result.finish();
        tracing::debug!(
            "Ranked {} candidates for request {} ({} rejected)",
            result.matches.len(),
            request.request_id,
            result.rejected.len()
        );
        result
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await.unwrap_or(false)
    }

    pub fn cache_stats(&self) -> Vec<CacheStats> {
        vec![self.reputation_cache.stats(), self.match_cache.stats()]
    }
}

/// `None` means unbounded, including budgets too large to represent
fn deadline_after(budget: Option<Duration>) -> Option<Instant> {
    budget.and_then(|b| Instant::now().checked_add(b))
}

fn budget_spent(deadline: Option<Instant>, request: &MatchRequest, result: &MatchResult) -> bool {
    let spent = deadline.is_some_and(|d| Instant::now() >= d);
    if spent {
        tracing::warn!(
            "Match budget exhausted for request {} after {} of {} candidates",
            request.request_id,
            result.seen(),
            result.total_candidates
        );
    }
    spent
}
