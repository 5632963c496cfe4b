// src/models/attempt.rs

use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::question::QuestionType;

/// Represents the 'quiz_attempts' table in the database.
/// `score` is always a percentage; the raw count lives in `correct_answers`.
#[derive(Debug, Clone, FromRow)]
pub struct QuizAttempt {
    pub id: i64,
    pub quiz_id: i64,
    pub user_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub score: Option<i32>,
    pub correct_answers: Option<i32>,
    pub total_questions: Option<i32>,
}

pub const ATTEMPT_COLUMNS: &str =
    "id, quiz_id, user_id, started_at, finished_at, score, correct_answers, total_questions";

impl QuizAttempt {
    /// Whole seconds between start and finish; 0 while unfinished.
    pub fn seconds_spent(&self) -> i64 {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds().max(0))
            .unwrap_or(0)
    }
}

/// Represents a row of 'quiz_attempt_answers'.
#[derive(Debug, Clone, FromRow)]
pub struct AttemptAnswerRow {
    pub question_id: i64,
    pub selected_option_id: i64,
}

/// Option in a graded question, revealing correctness and the user's choice.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptionOutcome {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
    pub selected: bool,
}

/// Per-question verdict returned on submission.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub id: i64,
    pub text: String,
    pub user_answers: Vec<i64>,
    pub correct_answers: Vec<i64>,
    pub is_correct: bool,
    pub options: Vec<OptionOutcome>,
}

/// Response of a revision quiz submission.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub attempt_id: i64,
    /// Percentage, 0-100.
    pub score: i32,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub percentage: i32,
    /// Minutes between start and submission.
    pub time_spent: i64,
    pub questions: Vec<QuestionOutcome>,
}

/// Detailed review of one question in a finished attempt.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionReview {
    pub question_id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    /// Texts of the selected options, comma separated.
    pub user_answer: String,
    /// Texts of the correct options, comma separated.
    pub correct_answer: String,
    pub is_correct: bool,
    pub explanation: Option<String>,
    pub explanation_img: Option<String>,
    pub options: Vec<OptionOutcome>,
}

/// Results of a finished attempt, recomputed from the stored answers.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResults {
    pub attempt_id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    /// Percentage, 0-100.
    pub score: i32,
    pub percentage: i32,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Seconds.
    pub time_spent: i64,
    pub questions: Vec<QuestionReview>,
}

/// One finished revision quiz in the caller's history.
#[derive(Debug, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub quiz_description: Option<String>,
    pub score: i32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Minutes.
    pub time_spent: i64,
    pub question_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn attempt(finished_after: Option<i64>) -> QuizAttempt {
        let started_at = Utc::now();
        QuizAttempt {
            id: 1,
            quiz_id: 2,
            user_id: 3,
            started_at,
            finished_at: finished_after.map(|s| started_at + Duration::seconds(s)),
            score: None,
            correct_answers: None,
            total_questions: None,
        }
    }

    #[test]
    fn unfinished_attempt_has_no_time_spent() {
        assert_eq!(attempt(None).seconds_spent(), 0);
    }

    #[test]
    fn finished_attempt_counts_seconds() {
        assert_eq!(attempt(Some(185)).seconds_spent(), 185);
    }
}
