use std::collections::BTreeSet;

use crate::core::ranges::{
    as_secs_f64, range_gap, ranges_overlap, validate_range, validate_window, window_contains,
    window_covers, window_overlap,
};
use crate::error::InvalidInputError;
use crate::models::{
    CompatibilityResult, MatchCandidate, MatchRequest, RateRange, ReputationScore, ScoringWeights,
    TimeWindow, TimelinePolicy,
};

/// Reputation weight given to candidates nobody has rated yet.
///
/// Neutral-low rather than zero so that unrated but qualified auditors are not
/// permanently ranked below every rated one.
pub const UNRATED_REPUTATION_WEIGHT: f64 = 0.5;

/// Calculate the compatibility (0-1) between an audit request and a candidate
///
/// Scoring formula:
/// score = (
///     expertise_match * 0.35 +        # Share of required expertise covered
///     availability_score * 0.20 +     # Share of the desired timeline available
///     budget_compatibility * 0.20 +   # Rate range vs budget range
///     timeline_feasibility * 0.15 +   # Experience-based estimate vs deadline
///     reputation_weight * 0.10        # Trust score normalized to 0-1
/// )
pub fn calculate_compatibility(
    request: &MatchRequest,
    candidate: &MatchCandidate,
    weights: &ScoringWeights,
    policy: &TimelinePolicy,
) -> Result<CompatibilityResult, InvalidInputError> {
    validate_request(request)?;
    validate_candidate(candidate)?;

    let expertise = expertise_match(&request.required_expertise, &candidate.expertise_tags);
    let availability = availability_score(&candidate.availability, &request.desired_timeline);
    let budget = budget_compatibility(&request.budget_range, &candidate.hourly_rate_range);
    let timeline = timeline_feasibility(request, candidate, policy);
    let reputation = reputation_weight(&candidate.reputation);

    let total = expertise * weights.expertise
        + availability * weights.availability
        + budget * weights.budget
        + timeline * weights.timeline
        + reputation * weights.reputation;

    Ok(CompatibilityResult {
        auditor_id: candidate.auditor_id.clone(),
        request_id: request.request_id.clone(),
        expertise_match: expertise,
        availability_score: availability,
        budget_compatibility: budget,
        timeline_feasibility: timeline,
        reputation_weight: reputation,
        compatibility_score: total.clamp(0.0, 1.0),
    })
}

pub fn validate_request(request: &MatchRequest) -> Result<(), InvalidInputError> {
    validate_range("budgetRange", &request.budget_range)?;
    validate_window("desiredTimeline", &request.desired_timeline)
}

pub fn validate_candidate(candidate: &MatchCandidate) -> Result<(), InvalidInputError> {
    validate_range("hourlyRateRange", &candidate.hourly_rate_range)?;
    validate_window("availability", &candidate.availability)?;
    if !candidate.years_experience.is_finite() || candidate.years_experience < 0.0 {
        return Err(InvalidInputError::InvalidExperience);
    }
    Ok(())
}

fn normalize_tags(tags: &BTreeSet<String>) -> BTreeSet<String> {
    tags.iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Share of required expertise the candidate covers (0-1)
/// No requirement at all counts as a full match
pub fn expertise_match(required: &BTreeSet<String>, offered: &BTreeSet<String>) -> f64 {
    let required = normalize_tags(required);
    if required.is_empty() {
        return 1.0;
    }

    let offered = normalize_tags(offered);
    let shared = required.intersection(&offered).count() as f64;

    (shared / required.len() as f64).clamp(0.0, 1.0)
}

/// Share of the desired timeline the candidate is available for (0-1)
#[inline]
pub fn availability_score(availability: &TimeWindow, desired: &TimeWindow) -> f64 {
    if window_covers(availability, desired) {
        return 1.0;
    }

    let requested = as_secs_f64(desired.duration());
    if requested <= 0.0 {
        // Zero-length request: either the instant is available or it isn't
        return if window_contains(availability, desired.start) { 1.0 } else { 0.0 };
    }

    let overlap = as_secs_f64(window_overlap(availability, desired));
    (overlap / requested).clamp(0.0, 1.0)
}

/// Budget fit (0-1)
/// Any overlap is a full match; otherwise decays linearly to 0 at a gap equal
/// to the budget span
#[inline]
pub fn budget_compatibility(budget: &RateRange, rate: &RateRange) -> f64 {
    if ranges_overlap(budget, rate) {
        return 1.0;
    }

    let span = budget.span();
    if span <= 0.0 {
        return 0.0;
    }

    (1.0 - range_gap(budget, rate) / span).max(0.0)
}

/// Whether the candidate can finish before the deadline (0-1)
///
/// The candidate starts once both the request and their availability allow it.
/// The estimate scales the requested duration by the experience multiplier;
/// overruns decay linearly to 0 at twice the allowed time.
pub fn timeline_feasibility(
    request: &MatchRequest,
    candidate: &MatchCandidate,
    policy: &TimelinePolicy,
) -> f64 {
    let start = request.desired_timeline.start.max(candidate.availability.start);
    let allowed = as_secs_f64(request.deadline - start);
    if allowed <= 0.0 {
        return 0.0;
    }

    let requested = as_secs_f64(request.desired_timeline.duration());
    let estimated = requested * policy.multiplier(candidate.years_experience);

    if estimated <= allowed {
        return 1.0;
    }

    (1.0 - (estimated - allowed) / allowed).max(0.0)
}

/// Trust score normalized to 0-1, with an explicit neutral default for unrated candidates
#[inline]
pub fn reputation_weight(reputation: &ReputationScore) -> f64 {
    if !reputation.is_rated() {
        return UNRATED_REPUTATION_WEIGHT;
    }
    (reputation.trust_score / 5.0).clamp(0.0, 1.0)
}
