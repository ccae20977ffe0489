use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "skilltype", rename_all = "lowercase")]
pub(crate) enum SkillType {
    Listening,
    Reading,
    Writing,
    Speaking,
    Grammar,
    Vocabulary,
}

impl SkillType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Listening => "listening",
            Self::Reading => "reading",
            Self::Writing => "writing",
            Self::Speaking => "speaking",
            Self::Grammar => "grammar",
            Self::Vocabulary => "vocabulary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    MultipleChoice,
    TrueFalseNotGiven,
    Matching,
    FillInBlank,
    ShortAnswer,
    SentenceCompletion,
}

/// Which stored key grades a question: flagged options or accepted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GradingPath {
    Option,
    Text,
}

impl QuestionType {
    pub(crate) fn grading_path(self) -> GradingPath {
        match self {
            Self::MultipleChoice | Self::TrueFalseNotGiven | Self::Matching => GradingPath::Option,
            Self::FillInBlank | Self::ShortAnswer | Self::SentenceCompletion => GradingPath::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl AttemptStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}
