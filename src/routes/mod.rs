// Route exports
pub mod matches;
pub mod ratings;

use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::config::MatchingSettings;
use crate::error::EngineError;
use crate::models::ErrorResponse;
use crate::services::ScoringEngine;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScoringEngine>,
    pub matching: MatchingSettings,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(ratings::configure)
            .configure(matches::configure),
    );
}

/// Map an engine failure to a JSON error body
///
/// Caller mistakes are 400; store failures are 500.
pub(crate) fn engine_error_response(context: &str, err: &EngineError) -> HttpResponse {
    if err.is_client_error() {
        tracing::info!("{}: {}", context, err);
        HttpResponse::BadRequest().json(ErrorResponse {
            error: context.to_string(),
            message: err.to_string(),
            status_code: 400,
        })
    } else {
        tracing::error!("{}: {}", context, err);
        HttpResponse::InternalServerError().json(ErrorResponse {
            error: context.to_string(),
            message: err.to_string(),
            status_code: 500,
        })
    }
}

/// Engine and state backed by the in-memory store, for handler tests
#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::core::CompatibilityScorer;
    use crate::services::{CacheConfig, InMemoryRatingStore, ScoreCache};
    use std::time::Duration;

    let engine = ScoringEngine::new(
        Arc::new(InMemoryRatingStore::new()),
        CompatibilityScorer::with_default_weights(),
        ScoreCache::new(CacheConfig::strict("reputation", 100, Duration::from_secs(60))),
        ScoreCache::new(CacheConfig::strict("matches", 100, Duration::from_secs(60))),
    );

    AppState {
        engine: Arc::new(engine),
        matching: MatchingSettings::default(),
    }
}
