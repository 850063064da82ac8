use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::models::{ErrorResponse, RatingsResponse, ReputationResponse, SubmitRatingRequest, SubmitRatingResponse};
use crate::routes::{engine_error_response, AppState};

/// Configure rating and reputation routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ratings", web::post().to(submit_rating))
        .route("/reputation/{subject_id}", web::get().to(get_reputation))
        .route("/reputation/{subject_id}/ratings", web::get().to(list_ratings));
}

/// Submit rating endpoint
///
/// POST /api/v1/ratings
///
/// Request body:
/// ```json
/// {
///   "subjectId": "string",
///   "raterId": "string",
///   "contextId": "string",
///   "overallScore": 5,
///   "categoryScores": { "depth": 4 },
///   "recommends": true,
///   "writtenReview": "string"
/// }
/// ```
///
/// Resubmitting for the same rater and context replaces the earlier rating.
async fn submit_rating(state: web::Data<AppState>, req: web::Json<SubmitRatingRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for submit_rating request: {:?}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    match state.engine.submit_rating(req.into_inner().into_rating()).await {
        Ok(rating_id) => HttpResponse::Ok().json(SubmitRatingResponse {
            success: true,
            rating_id,
        }),
        Err(e) => engine_error_response("Failed to submit rating", &e),
    }
}

/// GET /api/v1/reputation/{subject_id}
async fn get_reputation(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let subject_id = path.into_inner();

    match state.engine.get_reputation(&subject_id).await {
        Ok(reputation) => HttpResponse::Ok().json(ReputationResponse::from(reputation)),
        Err(e) => engine_error_response("Failed to compute reputation", &e),
    }
}

/// GET /api/v1/reputation/{subject_id}/ratings
async fn list_ratings(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let subject_id = path.into_inner();

    match state.engine.list_ratings(&subject_id).await {
        Ok(ratings) => HttpResponse::Ok().json(RatingsResponse {
            count: ratings.len(),
            subject_id,
            ratings,
        }),
        Err(e) => engine_error_response("Failed to list ratings", &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{configure_routes, test_state};
    use actix_web::{test, App};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_submit_then_read_reputation() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .configure(configure_routes),
        )
        .await;

        for (rater, context, score, recommends) in [("p1", "a1", 5, true), ("p2", "a2", 4, true), ("p3", "a3", 5, false)] {
            let req = test::TestRequest::post()
                .uri("/api/v1/ratings")
                .set_json(json!({
                    "subjectId": "aud",
                    "raterId": rater,
                    "contextId": context,
                    "overallScore": score,
                    "recommends": recommends
                }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert!(resp.status().is_success());
        }

        let req = test::TestRequest::get().uri("/api/v1/reputation/aud").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["trustScore"], 3.7);
        assert_eq!(body["totalRatings"], 3);
        assert_eq!(body["trustLabel"], "Verified");

        let req = test::TestRequest::get().uri("/api/v1/reputation/aud/ratings").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 3);
    }

    #[actix_web::test]
    async fn test_out_of_range_score_is_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/ratings")
            .set_json(json!({
                "subjectId": "aud",
                "raterId": "p1",
                "contextId": "a1",
                "overallScore": 9
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status().as_u16(), 400);
    }
}
