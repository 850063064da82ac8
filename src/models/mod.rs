// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    CandidateProfile, CompatibilityResult, MatchCandidate, MatchRequest, RateRange, Rating,
    RatingId, ReputationScore, ScoringWeights, TimeWindow, TimelinePolicy, TrustLevel,
};
pub use requests::{FindMatchesRequest, SubmitRatingRequest};
pub use responses::{
    ErrorResponse, FindMatchesResponse, HealthResponse, RatingsResponse, RejectedCandidate,
    ReputationResponse, SubmitRatingResponse,
};
