use time::PrimitiveDateTime;

use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, user_id, exercise_id, attempt_number, status, total_questions, questions_answered, \
    correct_answers, score, percentage, band_score, is_passed, time_limit_minutes, \
    time_spent_seconds, device_type, started_at, completed_at, created_at, updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) exercise_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) total_questions: i32,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) device_type: Option<&'a str>,
    pub(crate) started_at: PrimitiveDateTime,
}

/// Values frozen onto an attempt when it is finalized.
pub(crate) struct CompletionUpdate {
    pub(crate) questions_answered: i32,
    pub(crate) correct_answers: i32,
    pub(crate) score: f64,
    pub(crate) percentage: f64,
    pub(crate) band_score: f64,
    pub(crate) is_passed: bool,
    pub(crate) time_spent_seconds: i32,
    pub(crate) completed_at: PrimitiveDateTime,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct AttemptListFilter {
    pub(crate) exercise_id: Option<String>,
    pub(crate) status: Option<AttemptStatus>,
}
