use time::PrimitiveDateTime;

use crate::db::models::UserAnswer;

const COLUMNS: &str = "\
    id, attempt_id, question_id, user_id, answer_text, selected_option_id, is_correct, \
    points_earned, time_spent_seconds, answered_at";

pub(crate) struct UpsertAnswer<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) answer_text: Option<&'a str>,
    pub(crate) selected_option_id: Option<&'a str>,
    pub(crate) is_correct: bool,
    pub(crate) points_earned: f64,
    pub(crate) time_spent_seconds: i32,
    pub(crate) answered_at: PrimitiveDateTime,
}

/// Aggregates recomputed from persisted answers, never from client counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, sqlx::FromRow)]
pub(crate) struct AnswerSummary {
    pub(crate) questions_answered: i64,
    pub(crate) correct_answers: i64,
    pub(crate) points_earned: f64,
}

/// A resubmission for the same question replaces the earlier row.
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    answer: UpsertAnswer<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_answers (
            id, attempt_id, question_id, user_id, answer_text, selected_option_id,
            is_correct, points_earned, time_spent_seconds, answered_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        ON CONFLICT (attempt_id, question_id) DO UPDATE SET
            answer_text = EXCLUDED.answer_text,
            selected_option_id = EXCLUDED.selected_option_id,
            is_correct = EXCLUDED.is_correct,
            points_earned = EXCLUDED.points_earned,
            time_spent_seconds = EXCLUDED.time_spent_seconds,
            answered_at = EXCLUDED.answered_at",
    )
    .bind(answer.id)
    .bind(answer.attempt_id)
    .bind(answer.question_id)
    .bind(answer.user_id)
    .bind(answer.answer_text)
    .bind(answer.selected_option_id)
    .bind(answer.is_correct)
    .bind(answer.points_earned)
    .bind(answer.time_spent_seconds)
    .bind(answer.answered_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_by_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<UserAnswer>, sqlx::Error> {
    sqlx::query_as::<_, UserAnswer>(&format!(
        "SELECT {COLUMNS} FROM user_answers WHERE attempt_id = $1 ORDER BY answered_at, id"
    ))
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn summarize(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<AnswerSummary, sqlx::Error> {
    sqlx::query_as::<_, AnswerSummary>(
        "SELECT COUNT(*) AS questions_answered,
                COUNT(*) FILTER (WHERE is_correct IS TRUE) AS correct_answers,
                COALESCE(SUM(points_earned), 0)::DOUBLE PRECISION AS points_earned
         FROM user_answers
         WHERE attempt_id = $1",
    )
    .bind(attempt_id)
    .fetch_one(executor)
    .await
}
