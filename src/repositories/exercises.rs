use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Exercise;
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, title, skill_type, total_questions, total_points, passing_score, time_limit_minutes, \
    is_published, total_attempts, average_score, average_completion_time, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExerciseStatistics {
    pub(crate) id: String,
    pub(crate) total_attempts: i32,
    pub(crate) average_score: Option<f64>,
    pub(crate) average_completion_time: Option<f64>,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Exercise>, sqlx::Error> {
    sqlx::query_as::<_, Exercise>(&format!("SELECT {COLUMNS} FROM exercises WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_statistics(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ExerciseStatistics>, sqlx::Error> {
    sqlx::query_as::<_, ExerciseStatistics>(
        "SELECT id, total_attempts, average_score, average_completion_time
         FROM exercises
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn increment_total_attempts(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exercises
         SET total_attempts = total_attempts + 1, updated_at = $1
         WHERE id = $2",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn refresh_average_score(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exercises
         SET average_score = (
             SELECT AVG(score)
             FROM exercise_attempts
             WHERE exercise_id = $1 AND status = $2
         )
         WHERE id = $1",
    )
    .bind(id)
    .bind(AttemptStatus::Completed)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn refresh_average_completion_time(
    pool: &PgPool,
    id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exercises
         SET average_completion_time = (
             SELECT AVG(time_spent_seconds)::DOUBLE PRECISION
             FROM exercise_attempts
             WHERE exercise_id = $1 AND status = $2
         )
         WHERE id = $1",
    )
    .bind(id)
    .bind(AttemptStatus::Completed)
    .execute(pool)
    .await?;
    Ok(())
}
