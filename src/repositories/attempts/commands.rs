use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;

use super::types::{CompletionUpdate, CreateAttempt, COLUMNS};

/// Serializes attempt creation for one (user, exercise) pair until the transaction ends.
pub(crate) async fn acquire_attempt_lock(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    exercise_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("exercise_attempt:{user_id}:{exercise_id}"))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn next_attempt_number(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    exercise_id: &str,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(MAX(attempt_number), 0) + 1
         FROM exercise_attempts
         WHERE user_id = $1 AND exercise_id = $2",
    )
    .bind(user_id)
    .bind(exercise_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: CreateAttempt<'_>,
) -> Result<Attempt, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "INSERT INTO exercise_attempts (
            id, user_id, exercise_id, attempt_number, status, total_questions,
            time_limit_minutes, device_type, started_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9,$9)
        RETURNING {COLUMNS}"
    ))
    .bind(attempt.id)
    .bind(attempt.user_id)
    .bind(attempt.exercise_id)
    .bind(attempt.attempt_number)
    .bind(AttemptStatus::InProgress)
    .bind(attempt.total_questions)
    .bind(attempt.time_limit_minutes)
    .bind(attempt.device_type)
    .bind(attempt.started_at)
    .fetch_one(executor)
    .await
}

/// Row-locks the attempt so answer saves and finalization for it run one at a time.
pub(crate) async fn lock_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM exercise_attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn refresh_progress(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    questions_answered: i32,
    correct_answers: i32,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exercise_attempts
         SET questions_answered = $1, correct_answers = $2, updated_at = $3
         WHERE id = $4",
    )
    .bind(questions_answered)
    .bind(correct_answers)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Returns false when the attempt was no longer in progress.
pub(crate) async fn complete(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    update: &CompletionUpdate,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exercise_attempts
         SET status = $1,
             questions_answered = $2,
             correct_answers = $3,
             score = $4,
             percentage = $5,
             band_score = $6,
             is_passed = $7,
             time_spent_seconds = $8,
             completed_at = $9,
             updated_at = $9
         WHERE id = $10 AND status = $11",
    )
    .bind(AttemptStatus::Completed)
    .bind(update.questions_answered)
    .bind(update.correct_answers)
    .bind(update.score)
    .bind(update.percentage)
    .bind(update.band_score)
    .bind(update.is_passed)
    .bind(update.time_spent_seconds)
    .bind(update.completed_at)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn abandon(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    time_spent_seconds: i32,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exercise_attempts
         SET status = $1, time_spent_seconds = $2, updated_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(AttemptStatus::Abandoned)
    .bind(time_spent_seconds)
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Abandons in-progress attempts whose time limit plus `grace_seconds` has elapsed.
pub(crate) async fn abandon_expired(
    pool: &PgPool,
    now: PrimitiveDateTime,
    grace_seconds: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE exercise_attempts
         SET status = $1,
             time_spent_seconds = LEAST(
                 EXTRACT(EPOCH FROM ($2 - started_at))::BIGINT,
                 2147483647
             )::INTEGER,
             updated_at = $2
         WHERE status = $3
           AND time_limit_minutes IS NOT NULL
           AND started_at + make_interval(mins => time_limit_minutes, secs => $4) < $2
         RETURNING id",
    )
    .bind(AttemptStatus::Abandoned)
    .bind(now)
    .bind(AttemptStatus::InProgress)
    .bind(grace_seconds as f64)
    .fetch_all(pool)
    .await
}
