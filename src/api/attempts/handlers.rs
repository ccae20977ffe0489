use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::PaginatedResponse;
use crate::api::response::{self, Envelope};
use crate::core::redis::attempt_start_key;
use crate::core::state::AppState;
use crate::repositories;
use crate::repositories::attempts::AttemptListFilter;
use crate::schemas::attempt::{
    AttemptListQuery, AttemptResponse, AttemptResultResponse, ExerciseStatisticsResponse,
    StartAttemptRequest, SubmitAnswersRequest, SubmitAnswersResponse,
};
use crate::services::attempts;

pub(super) async fn start_attempt(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(exercise_id): Path<String>,
    payload: Option<Json<StartAttemptRequest>>,
) -> Result<(StatusCode, Json<Envelope<AttemptResponse>>), ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let limits = state.settings().attempts();
    let allowed = match state
        .redis()
        .rate_limit(
            &attempt_start_key(&user_id, &exercise_id),
            limits.start_rate_limit,
            limits.start_rate_window_seconds,
        )
        .await
    {
        Ok(allowed) => allowed,
        Err(err) => {
            tracing::warn!(
                error = %err,
                user_id = %user_id,
                "Attempt start rate limit unavailable"
            );
            true
        }
    };
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many attempt starts, slow down"));
    }

    let attempt = attempts::start_attempt(
        state.db(),
        &user_id,
        &exercise_id,
        payload.device_type.as_deref(),
    )
    .await?;

    Ok(response::created(AttemptResponse::from_db(attempt)))
}

pub(super) async fn submit_answers(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(attempt_id): Path<String>,
    Json(payload): Json<SubmitAnswersRequest>,
) -> Result<Json<Envelope<SubmitAnswersResponse>>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut attempt = attempts::save_answers(
        state.db(),
        &user_id,
        &attempt_id,
        &payload.answers,
        state.settings().attempts().max_answers_per_batch,
    )
    .await?;

    if payload.complete {
        attempt =
            attempts::finalize_attempt(state.db(), state.dispatcher(), &user_id, &attempt_id)
                .await?;
    }

    Ok(response::ok(SubmitAnswersResponse {
        saved: payload.answers.len(),
        attempt: AttemptResponse::from_db(attempt),
    }))
}

pub(super) async fn complete_attempt(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(attempt_id): Path<String>,
) -> Result<Json<Envelope<AttemptResponse>>, ApiError> {
    let attempt =
        attempts::finalize_attempt(state.db(), state.dispatcher(), &user_id, &attempt_id).await?;
    Ok(response::ok(AttemptResponse::from_db(attempt)))
}

pub(super) async fn abandon_attempt(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(attempt_id): Path<String>,
) -> Result<Json<Envelope<AttemptResponse>>, ApiError> {
    let attempt = attempts::abandon_attempt(state.db(), &user_id, &attempt_id).await?;
    Ok(response::ok(AttemptResponse::from_db(attempt)))
}

pub(super) async fn get_result(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(attempt_id): Path<String>,
) -> Result<Json<Envelope<AttemptResultResponse>>, ApiError> {
    let result = attempts::get_result(state.db(), &user_id, &attempt_id).await?;
    Ok(response::ok(result))
}

pub(super) async fn list_my_attempts(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<AttemptListQuery>,
) -> Result<Json<Envelope<PaginatedResponse<AttemptResponse>>>, ApiError> {
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, 1000);
    let filter = AttemptListFilter { exercise_id: params.exercise_id, status: params.status };

    let total_count = repositories::attempts::count_by_user(state.db(), &user_id, &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
    let items = repositories::attempts::list_by_user(state.db(), &user_id, &filter, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?
        .into_iter()
        .map(AttemptResponse::from_db)
        .collect();

    Ok(response::ok(PaginatedResponse { items, total_count, skip, limit }))
}

pub(super) async fn exercise_statistics(
    State(state): State<AppState>,
    CurrentUser(_user_id): CurrentUser,
    Path(exercise_id): Path<String>,
) -> Result<Json<Envelope<ExerciseStatisticsResponse>>, ApiError> {
    let stats = repositories::exercises::find_statistics(state.db(), &exercise_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exercise statistics"))?
        .ok_or_else(|| ApiError::NotFound("Exercise not found".to_string()))?;

    Ok(response::ok(ExerciseStatisticsResponse::from_db(stats)))
}
