use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::models::{ErrorResponse, FindMatchesRequest, FindMatchesResponse, HealthResponse};
use crate::routes::{engine_error_response, AppState};

/// Configure matching and operational routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/matches", web::post().to(find_matches))
        .route("/cache/stats", web::get().to(cache_stats));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let status = if state.engine.health_check().await { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Find matches endpoint
///
/// POST /api/v1/matches
///
/// Request body:
/// ```json
/// {
///   "request": {
///     "requestId": "string",
///     "requiredExpertise": ["solidity"],
///     "budgetRange": { "min": 100, "max": 200 },
///     "desiredTimeline": { "start": "...", "end": "..." },
///     "deadline": "..."
///   },
///   "candidates": [
///     {
///       "auditorId": "string",
///       "expertiseTags": ["solidity"],
///       "availability": { "start": "...", "end": "..." },
///       "hourlyRateRange": { "min": 150, "max": 250 },
///       "yearsExperience": 5
///     }
///   ],
///   "limit": 20
/// }
/// ```
///
/// Each candidate's reputation is filled in from its rating history before
/// scoring; `matching.batch_budget_ms` bounds both steps. A malformed request
/// is a 400; malformed candidates are listed under `rejected`.
async fn find_matches(state: web::Data<AppState>, req: web::Json<FindMatchesRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for find_matches request: {:?}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let FindMatchesRequest { request, candidates, limit } = req.into_inner();
    let limit = limit
        .unwrap_or(state.matching.default_limit)
        .min(state.matching.max_limit) as usize;

    tracing::info!(
        "Finding matches for request: {}, candidates: {}, limit: {}",
        request.request_id,
        candidates.len(),
        limit
    );

    let result = match state
        .engine
        .rank_profiles_within(&request, candidates, state.matching.batch_budget())
        .await
    {
        Ok(result) => result,
        Err(e) => return engine_error_response("Failed to score candidates", &e),
    };

    let mut matches = result.matches;
    matches.truncate(limit);

    let response = FindMatchesResponse {
        request_id: request.request_id,
        matches,
        rejected: result.rejected,
        total_candidates: result.total_candidates,
        truncated: result.truncated,
    };

    tracing::info!(
        "Returning {} matches for request {} (from {} candidates)",
        response.matches.len(),
        response.request_id,
        response.total_candidates
    );

    HttpResponse::Ok().json(response)
}

/// GET /api/v1/cache/stats
async fn cache_stats(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.engine.cache_stats())
}
