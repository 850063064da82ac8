// Service exports
pub mod cache;
pub mod engine;
pub mod postgres;
pub mod rating_store;
pub mod reputation;

pub use cache::{
    connect_redis, CacheConfig, CacheError, CacheKey, CacheMode, CacheStats, Lookup, RedisTier, ScoreCache,
    SharedTier, MAX_ENTRY_LIFETIME,
};
pub use engine::ScoringEngine;
pub use postgres::PostgresRatingStore;
pub use rating_store::{InMemoryRatingStore, RatingStore, StoreError};
pub use reputation::ReputationAggregator;
