use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Attempt, Exercise, UserAnswer};
use crate::db::types::{AttemptStatus, QuestionType, SkillType};
use crate::repositories::exercises::ExerciseStatistics;

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct StartAttemptRequest {
    #[serde(default)]
    #[validate(length(max = 32, message = "device_type must be at most 32 characters"))]
    pub(crate) device_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct AnswerSubmission {
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) selected_option_id: Option<String>,
    #[serde(default)]
    pub(crate) answer_text: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "time_spent_seconds must be non-negative"))]
    pub(crate) time_spent_seconds: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitAnswersRequest {
    #[validate(nested)]
    pub(crate) answers: Vec<AnswerSubmission>,
    /// Finalize the attempt right after the batch is saved.
    #[serde(default)]
    pub(crate) complete: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttemptListQuery {
    pub(crate) exercise_id: Option<String>,
    pub(crate) status: Option<AttemptStatus>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
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
    pub(crate) started_at: String,
    pub(crate) completed_at: Option<String>,
}

impl AttemptResponse {
    pub(crate) fn from_db(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            user_id: attempt.user_id,
            exercise_id: attempt.exercise_id,
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            total_questions: attempt.total_questions,
            questions_answered: attempt.questions_answered,
            correct_answers: attempt.correct_answers,
            score: attempt.score,
            percentage: attempt.percentage,
            band_score: attempt.band_score,
            is_passed: attempt.is_passed,
            time_limit_minutes: attempt.time_limit_minutes,
            time_spent_seconds: attempt.time_spent_seconds,
            device_type: attempt.device_type,
            started_at: format_primitive(attempt.started_at),
            completed_at: attempt.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitAnswersResponse {
    pub(crate) saved: usize,
    pub(crate) attempt: AttemptResponse,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExerciseSummaryResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) skill_type: SkillType,
    pub(crate) total_questions: i32,
    pub(crate) total_points: f64,
    pub(crate) passing_score: Option<f64>,
}

impl ExerciseSummaryResponse {
    pub(crate) fn from_db(exercise: &Exercise) -> Self {
        Self {
            id: exercise.id.clone(),
            title: exercise.title.clone(),
            skill_type: exercise.skill_type,
            total_questions: exercise.total_questions,
            total_points: exercise.total_points,
            passing_score: exercise.passing_score,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct OptionResponse {
    pub(crate) id: String,
    pub(crate) label: String,
    pub(crate) text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserAnswerResponse {
    pub(crate) selected_option_id: Option<String>,
    pub(crate) answer_text: Option<String>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_earned: Option<f64>,
    pub(crate) time_spent_seconds: i32,
    pub(crate) answered_at: String,
}

impl UserAnswerResponse {
    /// Per-answer grading stays hidden until `graded` is set.
    pub(crate) fn from_db(answer: UserAnswer, graded: bool) -> Self {
        Self {
            selected_option_id: answer.selected_option_id,
            answer_text: answer.answer_text,
            is_correct: answer.is_correct.filter(|_| graded),
            points_earned: graded.then_some(answer.points_earned),
            time_spent_seconds: answer.time_spent_seconds,
            answered_at: format_primitive(answer.answered_at),
        }
    }
}

/// Correct answers are only disclosed once the attempt is completed.
#[derive(Debug, Serialize)]
pub(crate) struct CorrectAnswerResponse {
    pub(crate) option_ids: Vec<String>,
    pub(crate) answer_text: Option<String>,
    pub(crate) accepted_answers: Vec<String>,
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResultResponse {
    pub(crate) question_id: String,
    pub(crate) section_id: Option<String>,
    pub(crate) question_type: QuestionType,
    pub(crate) question_text: String,
    pub(crate) points: f64,
    pub(crate) options: Vec<OptionResponse>,
    pub(crate) user_answer: Option<UserAnswerResponse>,
    pub(crate) correct_answer: Option<CorrectAnswerResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResultResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) exercise: ExerciseSummaryResponse,
    pub(crate) questions: Vec<QuestionResultResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExerciseStatisticsResponse {
    pub(crate) exercise_id: String,
    pub(crate) total_attempts: i32,
    pub(crate) average_score: Option<f64>,
    pub(crate) average_completion_time: Option<f64>,
}

impl ExerciseStatisticsResponse {
    pub(crate) fn from_db(stats: ExerciseStatistics) -> Self {
        Self {
            exercise_id: stats.id,
            total_attempts: stats.total_attempts,
            average_score: stats.average_score,
            average_completion_time: stats.average_completion_time,
        }
    }
}
