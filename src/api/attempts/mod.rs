mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/exercises/:exercise_id/attempts", post(handlers::start_attempt))
        .route("/exercises/:exercise_id/statistics", get(handlers::exercise_statistics))
        .route("/attempts/mine", get(handlers::list_my_attempts))
        .route("/attempts/:attempt_id/answers", post(handlers::submit_answers))
        .route("/attempts/:attempt_id/complete", post(handlers::complete_attempt))
        .route("/attempts/:attempt_id/abandon", post(handlers::abandon_attempt))
        .route("/attempts/:attempt_id/result", get(handlers::get_result))
}
