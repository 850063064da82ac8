// Criterion benchmarks for audit-score

use audit_score::core::{aggregate_ratings, CompatibilityScorer, MatchResult};
use audit_score::models::{MatchCandidate, MatchRequest, RateRange, Rating, ReputationScore, TimeWindow};
use audit_score::services::CacheKey;
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const TAGS: [&str; 6] = ["solidity", "defi", "rust", "zk", "bridges", "move"];

fn create_rating(id: usize) -> Rating {
    Rating::new("auditor", format!("project-{}", id), format!("audit-{}", id), 1 + (id % 5) as i32)
        .with_category("depth", 1 + (id % 4) as i32)
        .with_category("communication", 2 + (id % 3) as i32)
        .recommending(id % 3 != 0)
}

fn create_candidate(id: usize) -> MatchCandidate {
    let start = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap() + Duration::days((id % 30) as i64);
    let min_rate = 80.0 + (id % 20) as f64 * 10.0;

    MatchCandidate {
        auditor_id: format!("auditor-{}", id),
        expertise_tags: TAGS.iter().skip(id % 3).take(3).map(|t| t.to_string()).collect(),
        availability: TimeWindow::new(start, start + Duration::days(60)),
        hourly_rate_range: RateRange::new(min_rate, min_rate + 100.0),
        years_experience: (id % 12) as f64,
        reputation: ReputationScore {
            trust_score: (id % 50) as f64 / 10.0,
            total_ratings: (id % 15) as u32,
            ..ReputationScore::unrated(format!("auditor-{}", id))
        },
    }
}

fn create_request() -> MatchRequest {
    MatchRequest {
        request_id: "bench-request".to_string(),
        required_expertise: ["solidity", "defi", "zk"].iter().map(|t| t.to_string()).collect(),
        budget_range: RateRange::new(120.0, 220.0),
        desired_timeline: TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 5, 15, 0, 0, 0).unwrap(),
        ),
        deadline: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
    }
}

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");

    for rating_count in [10, 100, 1000].iter() {
        let ratings: Vec<Rating> = (0..*rating_count).map(create_rating).collect();

        group.bench_with_input(
            BenchmarkId::new("aggregate_ratings", rating_count),
            rating_count,
            |b, _| {
                b.iter(|| aggregate_ratings(black_box("auditor"), black_box(&ratings)));
            },
        );
    }

    group.finish();
}

fn bench_ranking(c: &mut Criterion) {
    let scorer = CompatibilityScorer::with_default_weights();
    let request = create_request();

    let mut group = c.benchmark_group("ranking");

    for candidate_count in [10, 50, 100, 500, 1000].iter() {
        let candidates: Vec<MatchCandidate> = (0..*candidate_count).map(create_candidate).collect();

        group.bench_with_input(
            BenchmarkId::new("score_and_sort", candidate_count),
            candidate_count,
            |b, _| {
                b.iter(|| {
                    let mut result = MatchResult::with_total(candidates.len());
                    for candidate in black_box(&candidates) {
                        result.record(&candidate.auditor_id, scorer.score(black_box(&request), candidate));
                    }
                    result.finish()
                });
            },
        );
    }

    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let scorer = CompatibilityScorer::with_default_weights();
    let request = create_request();
    let candidate = create_candidate(7);

    c.bench_function("compatibility_cache_key", |b| {
        b.iter(|| CacheKey::compatibility(black_box(&request), black_box(&candidate), scorer.weights()));
    });
}

criterion_group!(benches, bench_aggregation, bench_ranking, bench_fingerprint);

criterion_main!(benches);
