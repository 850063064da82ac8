use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use audit_score::config::{LoggingSettings, Settings, StoreBackend};
use audit_score::core::CompatibilityScorer;
use audit_score::models::{CompatibilityResult, ReputationScore, ScoringWeights, TimelinePolicy};
use audit_score::routes::{self, AppState};
use audit_score::services::{
    connect_redis, CacheConfig, CacheMode, InMemoryRatingStore, PostgresRatingStore, RatingStore,
    ScoreCache, ScoringEngine,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle path parameter errors
pub fn handle_path_error(err: error::PathError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_path".to_string(),
        message: format!("Invalid path: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

async fn build_store(settings: &Settings) -> std::io::Result<Arc<dyn RatingStore>> {
    match settings.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory rating store; ratings are lost on restart");
            Ok(Arc::new(InMemoryRatingStore::new()))
        }
        StoreBackend::Postgres => {
            let db = &settings.database;
            let store = PostgresRatingStore::from_settings(
                &db.url,
                db.max_connections,
                db.min_connections,
                db.acquire_timeout_secs,
                db.idle_timeout_secs,
            )
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                std::io::Error::other(e)
            })?;

            info!("PostgreSQL rating store initialized");
            Ok(Arc::new(store))
        }
    }
}

fn cache_config(settings: &Settings, namespace: &str, ttl: std::time::Duration) -> CacheConfig {
    let cache = &settings.cache;
    match cache.mode {
        CacheMode::Strict => CacheConfig::strict(namespace, cache.l1_capacity, ttl),
        CacheMode::Soft => CacheConfig::soft(namespace, cache.l1_capacity, ttl, cache.stale_grace()),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        std::io::Error::other(e)
    })?;

    init_logging(&settings.logging);

    info!("Starting audit-score service...");

    let store = build_store(&settings).await?;

    // Reputation keys carry process-local epochs, so that cache stays in-process.
    let reputation_cache: ScoreCache<ReputationScore> =
        ScoreCache::new(cache_config(&settings, "reputation", settings.cache.reputation_ttl()));

    let mut match_cache: ScoreCache<CompatibilityResult> =
        ScoreCache::new(cache_config(&settings, "matches", settings.cache.match_ttl()));

    if let Some(redis_url) = &settings.cache.redis_url {
        match connect_redis(redis_url).await {
            Ok(connection) => {
                match_cache = match_cache.with_redis(connection);
                info!("Shared match cache enabled");
            }
            Err(e) => warn!("Failed to connect to Redis ({}), running with in-process cache only", e),
        }
    }

    info!(
        "Caches initialized (L1: {} entries, mode: {:?}, reputation TTL: {}s, match TTL: {}s)",
        settings.cache.l1_capacity,
        settings.cache.mode,
        settings.cache.reputation_ttl_secs,
        settings.cache.match_ttl_secs
    );

    let weights = ScoringWeights::from(&settings.scoring.weights);
    if (weights.total() - 1.0).abs() > 1e-6 {
        warn!("Scoring weights sum to {}, compatibility scores will not span 0..1", weights.total());
    }
    let scorer = CompatibilityScorer::new(weights, TimelinePolicy::from(&settings.scoring.timeline));

    info!("Scorer initialized with weights: {:?}", weights);

    let engine = Arc::new(ScoringEngine::new(store, scorer, reputation_cache, match_cache));

    // Build application state
    let app_state = AppState {
        engine,
        matching: settings.matching.clone(),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
