use std::collections::{HashMap, HashSet};

use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::core::time::{elapsed_seconds, primitive_now_utc};
use crate::db::models::{Attempt, QuestionAnswerKey, QuestionOption};
use crate::db::types::AttemptStatus;
use crate::repositories;
use crate::repositories::answers::{AnswerSummary, UpsertAnswer};
use crate::repositories::attempts::{CompletionUpdate, CreateAttempt};
use crate::schemas::attempt::{
    AnswerSubmission, AttemptResponse, AttemptResultResponse, CorrectAnswerResponse,
    ExerciseSummaryResponse, OptionResponse, QuestionResultResponse, UserAnswerResponse,
};
use crate::services::completion_dispatch::{CompletionDispatcher, CompletionEvent};
use crate::services::exercise_stats;
use crate::services::grading::{self, GradingKey, SubmittedAnswer};
use crate::services::scoring::{self, ScoringInput};

#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub(crate) async fn start_attempt(
    pool: &PgPool,
    user_id: &str,
    exercise_id: &str,
    device_type: Option<&str>,
) -> Result<Attempt, AttemptError> {
    let exercise = repositories::exercises::find_by_id(pool, exercise_id)
        .await?
        .filter(|exercise| exercise.is_published)
        .ok_or_else(|| AttemptError::NotFound("Exercise not found".to_string()))?;

    let mut tx = pool.begin().await?;
    repositories::attempts::acquire_attempt_lock(&mut *tx, user_id, exercise_id).await?;
    let attempt_number =
        repositories::attempts::next_attempt_number(&mut *tx, user_id, exercise_id).await?;

    let id = Uuid::new_v4().to_string();
    let attempt = repositories::attempts::create(
        &mut *tx,
        CreateAttempt {
            id: &id,
            user_id,
            exercise_id,
            attempt_number,
            total_questions: exercise.total_questions,
            time_limit_minutes: exercise.time_limit_minutes,
            device_type,
            started_at: primitive_now_utc(),
        },
    )
    .await?;
    tx.commit().await?;

    metrics::counter!("attempts_started_total").increment(1);
    tracing::info!(
        attempt_id = %attempt.id,
        user_id,
        exercise_id,
        attempt_number,
        "Attempt started"
    );

    Ok(attempt)
}

/// Structural checks that never touch storage.
pub(crate) fn validate_batch(
    answers: &[AnswerSubmission],
    max_batch: usize,
) -> Result<(), AttemptError> {
    if answers.len() > max_batch {
        return Err(AttemptError::Validation(format!(
            "At most {max_batch} answers may be submitted at once"
        )));
    }

    let mut seen = HashSet::with_capacity(answers.len());
    for answer in answers {
        if answer.question_id.trim().is_empty() {
            return Err(AttemptError::Validation("question_id must not be empty".to_string()));
        }
        if answer.selected_option_id.is_some() && answer.answer_text.is_some() {
            return Err(AttemptError::Validation(format!(
                "Answer for question {} must set either selected_option_id or answer_text",
                answer.question_id
            )));
        }
        if answer.time_spent_seconds.is_some_and(|seconds| seconds < 0) {
            return Err(AttemptError::Validation(format!(
                "time_spent_seconds for question {} must be non-negative",
                answer.question_id
            )));
        }
        if !seen.insert(answer.question_id.as_str()) {
            return Err(AttemptError::Validation(format!(
                "Question {} appears more than once in the batch",
                answer.question_id
            )));
        }
    }

    Ok(())
}

/// Grades and upserts a batch in one transaction, then refreshes the progress counters.
pub(crate) async fn save_answers(
    pool: &PgPool,
    user_id: &str,
    attempt_id: &str,
    answers: &[AnswerSubmission],
    max_batch: usize,
) -> Result<Attempt, AttemptError> {
    validate_batch(answers, max_batch)?;

    let mut tx = pool.begin().await?;
    let mut attempt = lock_in_progress(&mut tx, user_id, attempt_id).await?;
    if answers.is_empty() {
        tx.commit().await?;
        return Ok(attempt);
    }

    let questions: HashMap<String, _> =
        repositories::questions::list_by_exercise(&mut *tx, &attempt.exercise_id)
            .await?
            .into_iter()
            .map(|question| (question.id.clone(), question))
            .collect();
    if let Some(unknown) = answers.iter().find(|answer| !questions.contains_key(&answer.question_id))
    {
        return Err(AttemptError::NotFound(format!("Question {} not found", unknown.question_id)));
    }

    let question_ids: Vec<String> = answers.iter().map(|answer| answer.question_id.clone()).collect();
    let keys = load_grading_keys(&mut tx, &question_ids).await?;

    let now = primitive_now_utc();
    let mut correct = 0_u64;
    for answer in answers {
        let Some(question) = questions.get(&answer.question_id) else { continue };
        let key = GradingKey::for_question(
            question.question_type,
            keys.options(&question.id),
            keys.answer_key(&question.id),
        );
        let grade = grading::grade(
            &key,
            question.points,
            SubmittedAnswer {
                selected_option_id: answer.selected_option_id.as_deref(),
                answer_text: answer.answer_text.as_deref(),
            },
        );
        if grade.is_correct {
            correct += 1;
        }

        let id = Uuid::new_v4().to_string();
        repositories::answers::upsert(
            &mut *tx,
            UpsertAnswer {
                id: &id,
                attempt_id,
                question_id: &question.id,
                user_id,
                answer_text: answer.answer_text.as_deref(),
                selected_option_id: answer.selected_option_id.as_deref(),
                is_correct: grade.is_correct,
                points_earned: grade.points_earned,
                time_spent_seconds: answer.time_spent_seconds.unwrap_or(0),
                answered_at: now,
            },
        )
        .await?;
    }

    let summary = repositories::answers::summarize(&mut *tx, attempt_id).await?;
    attempt.questions_answered = clamp_count(summary.questions_answered);
    attempt.correct_answers = clamp_count(summary.correct_answers);
    repositories::attempts::refresh_progress(
        &mut *tx,
        attempt_id,
        attempt.questions_answered,
        attempt.correct_answers,
        now,
    )
    .await?;
    tx.commit().await?;

    metrics::counter!("answers_graded_total", "result" => "correct").increment(correct);
    metrics::counter!("answers_graded_total", "result" => "incorrect")
        .increment(answers.len() as u64 - correct);
    tracing::debug!(attempt_id, saved = answers.len(), "Answers saved");

    attempt.updated_at = now;
    Ok(attempt)
}

/// Scores the persisted answers and freezes the attempt. Statistics and the
/// completion event follow the commit and never fail the call.
pub(crate) async fn finalize_attempt(
    pool: &PgPool,
    dispatcher: &CompletionDispatcher,
    user_id: &str,
    attempt_id: &str,
) -> Result<Attempt, AttemptError> {
    let mut tx = pool.begin().await?;
    let mut attempt = lock_in_progress(&mut tx, user_id, attempt_id).await?;

    let exercise = repositories::exercises::find_by_id(&mut *tx, &attempt.exercise_id)
        .await?
        .ok_or_else(|| AttemptError::NotFound("Exercise not found".to_string()))?;
    let summary: AnswerSummary = repositories::answers::summarize(&mut *tx, attempt_id).await?;

    let now = primitive_now_utc();
    let correct_answers = clamp_count(summary.correct_answers);
    let result = scoring::score_attempt(ScoringInput {
        total_questions: attempt.total_questions,
        correct_answers,
        points_earned: summary.points_earned,
        total_points: exercise.total_points,
        passing_score: exercise.passing_score,
    });
    let update = CompletionUpdate {
        questions_answered: clamp_count(summary.questions_answered),
        correct_answers,
        score: result.score,
        percentage: result.percentage,
        band_score: result.band_score,
        is_passed: result.is_passed,
        time_spent_seconds: elapsed_seconds(attempt.started_at, now),
        completed_at: now,
    };

    if !repositories::attempts::complete(&mut *tx, attempt_id, &update).await? {
        return Err(AttemptError::Conflict("Attempt is already finalized".to_string()));
    }
    tx.commit().await?;

    attempt.status = AttemptStatus::Completed;
    attempt.questions_answered = update.questions_answered;
    attempt.correct_answers = update.correct_answers;
    attempt.score = Some(update.score);
    attempt.percentage = Some(update.percentage);
    attempt.band_score = Some(update.band_score);
    attempt.is_passed = Some(update.is_passed);
    attempt.time_spent_seconds = update.time_spent_seconds;
    attempt.completed_at = Some(now);
    attempt.updated_at = now;

    metrics::counter!("attempts_completed_total").increment(1);
    tracing::info!(
        attempt_id,
        user_id,
        exercise_id = %exercise.id,
        score = update.score,
        band_score = update.band_score,
        "Attempt finalized"
    );

    if let Err(err) = exercise_stats::record_completion(pool, &exercise.id).await {
        tracing::error!(
            exercise_id = %exercise.id,
            attempt_id,
            error = %err,
            "Failed to update exercise statistics"
        );
    }

    dispatcher.enqueue(CompletionEvent {
        attempt_id: attempt.id.clone(),
        user_id: attempt.user_id.clone(),
        exercise_id: exercise.id.clone(),
        exercise_title: exercise.title.clone(),
        skill: exercise.skill_type,
        score: update.percentage,
        points_earned: update.score,
        band_score: update.band_score,
        time_spent_seconds: update.time_spent_seconds,
    });

    Ok(attempt)
}

pub(crate) async fn abandon_attempt(
    pool: &PgPool,
    user_id: &str,
    attempt_id: &str,
) -> Result<Attempt, AttemptError> {
    let mut tx = pool.begin().await?;
    let mut attempt = lock_in_progress(&mut tx, user_id, attempt_id).await?;

    let now = primitive_now_utc();
    let time_spent_seconds = elapsed_seconds(attempt.started_at, now);
    if !repositories::attempts::abandon(&mut *tx, attempt_id, time_spent_seconds, now).await? {
        return Err(AttemptError::Conflict("Attempt is no longer in progress".to_string()));
    }
    tx.commit().await?;

    metrics::counter!("attempts_abandoned_total", "reason" => "user").increment(1);
    tracing::info!(attempt_id, user_id, "Attempt abandoned");

    attempt.status = AttemptStatus::Abandoned;
    attempt.time_spent_seconds = time_spent_seconds;
    attempt.updated_at = now;
    Ok(attempt)
}

/// Full breakdown of an attempt. Correct answers and explanations are only
/// included once the attempt is completed.
pub(crate) async fn get_result(
    pool: &PgPool,
    user_id: &str,
    attempt_id: &str,
) -> Result<AttemptResultResponse, AttemptError> {
    let attempt = repositories::attempts::find_for_user(pool, attempt_id, user_id)
        .await?
        .ok_or_else(|| AttemptError::NotFound("Attempt not found".to_string()))?;
    let exercise = repositories::exercises::find_by_id(pool, &attempt.exercise_id)
        .await?
        .ok_or_else(|| AttemptError::NotFound("Exercise not found".to_string()))?;

    let mut conn = pool.acquire().await?;
    let questions = repositories::questions::list_by_exercise(&mut *conn, &exercise.id).await?;
    let question_ids: Vec<String> = questions.iter().map(|question| question.id.clone()).collect();
    let keys = load_grading_keys(&mut conn, &question_ids).await?;
    let mut answers: HashMap<String, _> = repositories::answers::list_by_attempt(&mut *conn, attempt_id)
        .await?
        .into_iter()
        .map(|answer| (answer.question_id.clone(), answer))
        .collect();

    let disclose = attempt.status == AttemptStatus::Completed;
    let questions = questions
        .into_iter()
        .map(|question| {
            let options = keys.options(&question.id);
            let correct_answer = disclose.then(|| {
                let answer_key = keys.answer_key(&question.id);
                CorrectAnswerResponse {
                    option_ids: options
                        .iter()
                        .filter(|option| option.is_correct)
                        .map(|option| option.id.clone())
                        .collect(),
                    answer_text: answer_key.map(|key| key.answer_text.clone()),
                    accepted_answers: answer_key
                        .map(|key| key.alternative_answers.0.clone())
                        .unwrap_or_default(),
                    explanation: question.explanation.clone(),
                }
            });

            QuestionResultResponse {
                options: options
                    .iter()
                    .map(|option| OptionResponse {
                        id: option.id.clone(),
                        label: option.option_label.clone(),
                        text: option.option_text.clone(),
                    })
                    .collect(),
                user_answer: answers
                    .remove(&question.id)
                    .map(|answer| UserAnswerResponse::from_db(answer, disclose)),
                correct_answer,
                question_id: question.id,
                section_id: question.section_id,
                question_type: question.question_type,
                question_text: question.question_text,
                points: question.points,
            }
        })
        .collect();

    Ok(AttemptResultResponse {
        exercise: ExerciseSummaryResponse::from_db(&exercise),
        attempt: AttemptResponse::from_db(attempt),
        questions,
    })
}

async fn lock_in_progress(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
    attempt_id: &str,
) -> Result<Attempt, AttemptError> {
    let attempt = repositories::attempts::lock_for_update(&mut **tx, attempt_id)
        .await?
        .filter(|attempt| attempt.user_id == user_id)
        .ok_or_else(|| AttemptError::NotFound("Attempt not found".to_string()))?;

    if attempt.status != AttemptStatus::InProgress {
        return Err(AttemptError::Conflict(format!(
            "Attempt is already {}",
            attempt.status.as_str()
        )));
    }

    Ok(attempt)
}

struct GradingKeys {
    options: HashMap<String, Vec<QuestionOption>>,
    answer_keys: HashMap<String, QuestionAnswerKey>,
}

impl GradingKeys {
    fn options(&self, question_id: &str) -> &[QuestionOption] {
        self.options.get(question_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn answer_key(&self, question_id: &str) -> Option<&QuestionAnswerKey> {
        self.answer_keys.get(question_id)
    }
}

async fn load_grading_keys(
    conn: &mut PgConnection,
    question_ids: &[String],
) -> Result<GradingKeys, sqlx::Error> {
    let mut options: HashMap<String, Vec<QuestionOption>> = HashMap::new();
    for option in repositories::questions::list_options_by_questions(&mut *conn, question_ids).await?
    {
        options.entry(option.question_id.clone()).or_default().push(option);
    }

    let answer_keys = repositories::questions::list_answer_keys_by_questions(&mut *conn, question_ids)
        .await?
        .into_iter()
        .map(|key| (key.question_id.clone(), key))
        .collect();

    Ok(GradingKeys { options, answer_keys })
}

fn clamp_count(value: i64) -> i32 {
    value.clamp(0, i32::MAX as i64) as i32
}
