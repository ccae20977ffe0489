use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, QuestionType, SkillType};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exercise {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) skill_type: SkillType,
    pub(crate) total_questions: i32,
    pub(crate) total_points: f64,
    pub(crate) passing_score: Option<f64>,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) is_published: bool,
    pub(crate) total_attempts: i32,
    pub(crate) average_score: Option<f64>,
    pub(crate) average_completion_time: Option<f64>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) exercise_id: String,
    pub(crate) section_id: Option<String>,
    pub(crate) question_type: QuestionType,
    pub(crate) question_text: String,
    pub(crate) points: f64,
    pub(crate) display_order: i32,
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) option_label: String,
    pub(crate) option_text: String,
    pub(crate) is_correct: bool,
    pub(crate) display_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionAnswerKey {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) answer_text: String,
    pub(crate) alternative_answers: Json<Vec<String>>,
    pub(crate) is_case_sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) exercise_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) total_questions: i32,
    pub(crate) questions_answered: i32,
    pub(crate) correct_answers: i32,
    pub(crate) score: Option<f64>,
    pub(crate) percentage: Option<f64>,
    pub(crate) band_score: Option<f64>,
    pub(crate) is_passed: Option<bool>,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) time_spent_seconds: i32,
    pub(crate) device_type: Option<String>,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct UserAnswer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) user_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_option_id: Option<String>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_earned: f64,
    pub(crate) time_spent_seconds: i32,
    pub(crate) answered_at: PrimitiveDateTime,
}
