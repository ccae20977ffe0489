use crate::db::models::{QuestionAnswerKey, QuestionOption};
use crate::db::types::{GradingPath, QuestionType};

/// The stored key a question is graded against.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GradingKey {
    Options { correct_option_ids: Vec<String> },
    Text { primary: String, variations: Vec<String> },
    /// The question has no key for its grading path; every submission is incorrect.
    Missing,
}

impl GradingKey {
    pub(crate) fn for_question(
        question_type: QuestionType,
        options: &[QuestionOption],
        answer_key: Option<&QuestionAnswerKey>,
    ) -> Self {
        match question_type.grading_path() {
            GradingPath::Option => {
                let correct_option_ids: Vec<String> = options
                    .iter()
                    .filter(|option| option.is_correct)
                    .map(|option| option.id.clone())
                    .collect();
                if correct_option_ids.is_empty() {
                    Self::Missing
                } else {
                    Self::Options { correct_option_ids }
                }
            }
            GradingPath::Text => match answer_key {
                Some(key) => Self::Text {
                    primary: key.answer_text.clone(),
                    variations: key.alternative_answers.0.clone(),
                },
                None => Self::Missing,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SubmittedAnswer<'a> {
    pub(crate) selected_option_id: Option<&'a str>,
    pub(crate) answer_text: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Grade {
    pub(crate) is_correct: bool,
    pub(crate) points_earned: f64,
}

impl Grade {
    fn incorrect() -> Self {
        Self { is_correct: false, points_earned: 0.0 }
    }
}

/// All-or-nothing grading of one answer. A submission of the wrong kind for the
/// key (text for an option question or the reverse) is incorrect.
pub(crate) fn grade(key: &GradingKey, points: f64, answer: SubmittedAnswer<'_>) -> Grade {
    let is_correct = match key {
        GradingKey::Options { correct_option_ids } => answer
            .selected_option_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .is_some_and(|id| correct_option_ids.iter().any(|correct| correct == id)),
        GradingKey::Text { primary, variations } => {
            match answer.answer_text.map(normalize_text).filter(|text| !text.is_empty()) {
                Some(submitted) => std::iter::once(primary)
                    .chain(variations.iter())
                    .any(|accepted| normalize_text(accepted) == submitted),
                None => false,
            }
        }
        GradingKey::Missing => false,
    };

    if is_correct {
        Grade { is_correct: true, points_earned: points }
    } else {
        Grade::incorrect()
    }
}

// `is_case_sensitive` on answer keys is intentionally not consulted here.
fn normalize_text(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn option(id: &str, is_correct: bool) -> QuestionOption {
        QuestionOption {
            id: id.to_string(),
            question_id: "q1".to_string(),
            option_label: id.to_uppercase(),
            option_text: format!("option {id}"),
            is_correct,
            display_order: 0,
        }
    }

    fn text_key(primary: &str, variations: &[&str]) -> GradingKey {
        GradingKey::Text {
            primary: primary.to_string(),
            variations: variations.iter().map(|value| value.to_string()).collect(),
        }
    }

    fn selected(id: &str) -> SubmittedAnswer<'_> {
        SubmittedAnswer { selected_option_id: Some(id), answer_text: None }
    }

    fn typed(text: &str) -> SubmittedAnswer<'_> {
        SubmittedAnswer { selected_option_id: None, answer_text: Some(text) }
    }

    #[test]
    fn flagged_option_earns_full_points() {
        let options = vec![option("a", false), option("b", true), option("c", false)];
        let key = GradingKey::for_question(QuestionType::MultipleChoice, &options, None);

        assert_eq!(grade(&key, 2.5, selected("b")), Grade { is_correct: true, points_earned: 2.5 });
        for other in ["a", "c", "missing"] {
            assert_eq!(grade(&key, 2.5, selected(other)), Grade::incorrect());
        }
    }

    #[test]
    fn matching_uses_option_path() {
        let options = vec![option("m1", true), option("m2", false)];
        let key = GradingKey::for_question(QuestionType::Matching, &options, None);

        assert!(grade(&key, 1.0, selected("m1")).is_correct);
        assert!(!grade(&key, 1.0, typed("m1")).is_correct);
    }

    #[test]
    fn text_is_trimmed_and_case_insensitive() {
        let key = text_key("paris", &[]);
        assert_eq!(grade(&key, 1.0, typed(" Paris ")), Grade { is_correct: true, points_earned: 1.0 });
        assert!(!grade(&key, 1.0, typed("Lyon")).is_correct);
    }

    #[test]
    fn accepted_variations_match_after_normalization() {
        let key = text_key("United Kingdom", &["UK", " Britain"]);

        assert!(grade(&key, 1.0, typed("uk")).is_correct);
        assert!(grade(&key, 1.0, typed("BRITAIN  ")).is_correct);
        assert!(!grade(&key, 1.0, typed("England")).is_correct);
    }

    #[test]
    fn case_sensitive_flag_is_not_applied() {
        let answer_key = QuestionAnswerKey {
            id: "k1".to_string(),
            question_id: "q1".to_string(),
            answer_text: "DNA".to_string(),
            alternative_answers: Json(vec![]),
            is_case_sensitive: true,
        };
        let key = GradingKey::for_question(QuestionType::ShortAnswer, &[], Some(&answer_key));

        assert!(grade(&key, 1.0, typed("dna")).is_correct);
    }

    #[test]
    fn missing_or_blank_submission_is_incorrect() {
        let options = vec![option("a", true)];
        let option_key = GradingKey::for_question(QuestionType::MultipleChoice, &options, None);
        let text = text_key("", &[]);

        assert_eq!(grade(&option_key, 1.0, SubmittedAnswer::default()), Grade::incorrect());
        assert_eq!(grade(&option_key, 1.0, selected("  ")), Grade::incorrect());
        assert_eq!(grade(&text, 1.0, typed("   ")), Grade::incorrect());
        assert_eq!(grade(&text, 1.0, SubmittedAnswer::default()), Grade::incorrect());
    }

    #[test]
    fn question_without_key_is_never_correct() {
        let key = GradingKey::for_question(QuestionType::FillInBlank, &[], None);
        assert_eq!(key, GradingKey::Missing);
        assert_eq!(grade(&key, 3.0, typed("anything")), Grade::incorrect());

        let no_flag = vec![option("a", false)];
        let key = GradingKey::for_question(QuestionType::TrueFalseNotGiven, &no_flag, None);
        assert_eq!(grade(&key, 3.0, selected("a")), Grade::incorrect());
    }
}
