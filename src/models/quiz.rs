// src/models/quiz.rs

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::question::{Difficulty, PublicQuestion, QuestionRow, QuestionType};

pub const DEFAULT_REVISION_TITLE: &str = "Quiz de révision";
pub const DEFAULT_REVISION_QUESTION_COUNT: i64 = 10;

/// Kind of quiz container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuizKind {
    /// Fixed quiz attached to a lesson.
    Lesson,
    /// Fixed module exam.
    Exam,
    /// Generated on demand from the question bank.
    Session,
}

impl QuizKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            QuizKind::Lesson => "lesson",
            QuizKind::Exam => "exam",
            QuizKind::Session => "session",
        }
    }
}

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct QuizRow {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub description: Option<String>,
    pub question_count: i32,
    pub time_limit: Option<i32>,
    pub created_by: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A question of a session quiz with its 1-based position.
#[derive(Debug, Clone, FromRow)]
pub struct SessionQuestionRow {
    #[sqlx(flatten)]
    pub question: QuestionRow,
    pub position: i32,
}

/// DTO for requesting a new revision quiz.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRevisionQuizRequest {
    #[serde(default)]
    pub selected_modules: Vec<i64>,
    #[serde(default)]
    pub selected_lessons: Vec<i64>,
    /// Defaults to 10; must lie in the configured range.
    pub question_count: Option<i64>,
    pub question_types: Option<Vec<QuestionType>>,
    pub difficulty: Option<Difficulty>,
    /// Minutes.
    #[validate(range(min = 1, max = 300))]
    pub time_limit: Option<i32>,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevisionQuizView {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuizKind,
    pub question_count: i32,
    pub time_limit: Option<i32>,
    pub questions: Vec<PublicQuestion>,
}

/// Returned when a revision session is created or resumed.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSessionResponse {
    /// Id of the caller's attempt.
    pub session_id: i64,
    pub quiz: RevisionQuizView,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// One answer: a single option id or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AnswerSelection {
    One(i64),
    Many(Vec<i64>),
}

impl AnswerSelection {
    /// Selected option ids with duplicates collapsed.
    pub fn option_ids(&self) -> BTreeSet<i64> {
        match self {
            AnswerSelection::One(id) => BTreeSet::from([*id]),
            AnswerSelection::Many(ids) => ids.iter().copied().collect(),
        }
    }
}

/// DTO for submitting a revision quiz.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitAnswersRequest {
    /// Key: question id. Value: selected option id(s).
    pub answers: HashMap<i64, AnswerSelection>,
}
