use std::collections::BTreeMap;

use crate::models::{Rating, ReputationScore};

/// Share of the trust score driven by the average rating
const QUALITY_WEIGHT: f64 = 0.4;
/// Share driven by the recommendation rate
const ENDORSEMENT_WEIGHT: f64 = 0.3;
/// Share driven by rating volume, saturating at `VOLUME_CAP` ratings
const VOLUME_WEIGHT: f64 = 0.2;
/// Flat bonus for having any track record at all
const TRACK_RECORD_WEIGHT: f64 = 0.1;
const VOLUME_CAP: f64 = 10.0;
const SCALE_MAX: f64 = 5.0;

/// Absorbs binary representation error so that x.x5 rounds up
const ROUNDING_EPSILON: f64 = 1e-9;

/// Round half-up to the given number of decimal places
#[inline]
pub fn round_half_up(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor + 0.5 + ROUNDING_EPSILON).floor() / factor
}

/// Composite trust score (0-5)
///
/// Formula:
/// trust = (
///     overall_rating * 0.4 +                      # Quality
///     recommendation_rate * 5 * 0.3 +             # Endorsement
///     min(total_ratings / 10, 1) * 5 * 0.2 +      # Volume confidence
///     (total_ratings > 0 ? 5 : 0) * 0.1           # Has any track record
/// )
/// rounded half-up to one decimal.
pub fn trust_score(overall_rating: f64, recommendation_rate: f64, total_ratings: u32) -> f64 {
    let volume = (total_ratings as f64 / VOLUME_CAP).min(1.0);
    let track_record = if total_ratings > 0 { SCALE_MAX } else { 0.0 };

    let raw = overall_rating * QUALITY_WEIGHT
        + recommendation_rate * SCALE_MAX * ENDORSEMENT_WEIGHT
        + volume * SCALE_MAX * VOLUME_WEIGHT
        + track_record * TRACK_RECORD_WEIGHT;

    round_half_up(raw, 1)
}

/// Aggregate a subject's full rating history into a reputation score
///
/// An empty history yields the unrated score (all zeros), not an error.
/// Category means only count the ratings that actually carry that category.
pub fn aggregate_ratings(subject_id: &str, ratings: &[Rating]) -> ReputationScore {
    if ratings.is_empty() {
        return ReputationScore::unrated(subject_id);
    }

    let total = ratings.len();
    let mut overall_sum: i64 = 0;
    let mut recommended = 0usize;
    let mut categories: BTreeMap<&str, (i64, u32)> = BTreeMap::new();

    for rating in ratings {
        overall_sum += rating.overall_score as i64;
        if rating.recommends {
            recommended += 1;
        }
        for (category, score) in &rating.category_scores {
            let entry = categories.entry(category.as_str()).or_insert((0, 0));
            entry.0 += *score as i64;
            entry.1 += 1;
        }
    }

    let overall_rating = round_half_up(overall_sum as f64 / total as f64, 1);
    let recommendation_rate = round_half_up(recommended as f64 / total as f64, 2);
    let category_scores = categories
        .into_iter()
        .map(|(name, (sum, count))| (name.to_string(), round_half_up(sum as f64 / count as f64, 1)))
        .collect();

    let total_ratings = u32::try_from(total).unwrap_or(u32::MAX);

    ReputationScore {
        subject_id: subject_id.to_string(),
        overall_rating,
        total_ratings,
        category_scores,
        recommendation_rate,
        trust_score: trust_score(overall_rating, recommendation_rate, total_ratings),
    }
}
