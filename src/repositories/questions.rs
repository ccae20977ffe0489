use crate::db::models::{Question, QuestionAnswerKey, QuestionOption};

pub(crate) const COLUMNS: &str = "\
    id, exercise_id, section_id, question_type, question_text, points, display_order, explanation";

const OPTION_COLUMNS: &str =
    "id, question_id, option_label, option_text, is_correct, display_order";

const ANSWER_KEY_COLUMNS: &str =
    "id, question_id, answer_text, alternative_answers, is_case_sensitive";

/// Questions in presentation order: section order, then question order.
pub(crate) async fn list_by_exercise(
    executor: impl sqlx::PgExecutor<'_>,
    exercise_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS}
         FROM questions
         WHERE exercise_id = $1
         ORDER BY COALESCE(
                      (SELECT s.display_order FROM exercise_sections s WHERE s.id = section_id),
                      0
                  ),
                  display_order,
                  id"
    ))
    .bind(exercise_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_options_by_questions(
    executor: impl sqlx::PgExecutor<'_>,
    question_ids: &[String],
) -> Result<Vec<QuestionOption>, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, QuestionOption>(&format!(
        "SELECT {OPTION_COLUMNS}
         FROM question_options
         WHERE question_id = ANY($1)
         ORDER BY question_id, display_order, id"
    ))
    .bind(question_ids)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_answer_keys_by_questions(
    executor: impl sqlx::PgExecutor<'_>,
    question_ids: &[String],
) -> Result<Vec<QuestionAnswerKey>, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, QuestionAnswerKey>(&format!(
        "SELECT {ANSWER_KEY_COLUMNS}
         FROM question_answer_keys
         WHERE question_id = ANY($1)"
    ))
    .bind(question_ids)
    .fetch_all(executor)
    .await
}
