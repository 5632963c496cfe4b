// src/models/question.rs

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use url::Url;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::error::AppError;

/// How a question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Exactly one correct option.
    SingleChoice,
    /// One or more correct options, all of which must be selected.
    MultipleChoice,
    /// Free-text answer; never auto-scored.
    OpenResponse,
}

impl QuestionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::OpenResponse => "open_response",
        }
    }

    /// Whether answers can be scored by comparing option sets.
    pub const fn is_option_scored(self) -> bool {
        !matches!(self, QuestionType::OpenResponse)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_choice" => Ok(QuestionType::SingleChoice),
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "open_response" => Ok(QuestionType::OpenResponse),
            other => Err(AppError::BadRequest(format!("Type de question inconnu: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(AppError::BadRequest(format!("Difficulté inconnue: {}", other))),
        }
    }
}

/// Represents the 'question_bank' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub text: String,
    /// Stored as TEXT, see `QuestionType::as_str`.
    pub question_type: String,
    pub difficulty: Option<String>,
    pub study_year_id: Option<i64>,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
    pub explanation: Option<String>,
    pub explanation_img: Option<String>,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Column list matching `QuestionRow`, for queries aliasing `question_bank` as `q`.
pub const QUESTION_COLUMNS: &str = "q.id, q.text, q.question_type, q.difficulty, q.study_year_id, \
     q.module_id, q.lesson_id, q.explanation, q.explanation_img, q.is_active, q.created_at, q.updated_at";

impl QuestionRow {
    pub fn parsed_type(&self) -> Result<QuestionType, AppError> {
        self.question_type.parse().map_err(|_| {
            AppError::InternalServerError(format!(
                "question {} has unknown type {:?}",
                self.id, self.question_type
            ))
        })
    }

    pub fn parsed_difficulty(&self) -> Result<Option<Difficulty>, AppError> {
        self.difficulty
            .as_deref()
            .map(|d| {
                d.parse().map_err(|_| {
                    AppError::InternalServerError(format!(
                        "question {} has unknown difficulty {:?}",
                        self.id, d
                    ))
                })
            })
            .transpose()
    }
}

/// Represents the 'question_bank_options' table.
#[derive(Debug, Clone, FromRow)]
pub struct OptionRow {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
    pub position: i32,
}

/// Option as seen by staff, correctness included.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
}

/// Full question bank item (staff view).
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBankItem {
    pub id: i64,
    pub text: String,
    pub question_type: QuestionType,
    pub difficulty: Option<Difficulty>,
    pub study_year_id: Option<i64>,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
    pub explanation: Option<String>,
    pub explanation_img: Option<String>,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub options: Vec<QuestionOption>,
}

impl QuestionBankItem {
    pub fn from_rows(row: QuestionRow, options: Vec<OptionRow>) -> Result<Self, AppError> {
        Ok(Self {
            question_type: row.parsed_type()?,
            difficulty: row.parsed_difficulty()?,
            id: row.id,
            text: row.text,
            study_year_id: row.study_year_id,
            module_id: row.module_id,
            lesson_id: row.lesson_id,
            explanation: row.explanation,
            explanation_img: row.explanation_img,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            options: options
                .into_iter()
                .map(|o| QuestionOption {
                    id: o.id,
                    text: o.text,
                    is_correct: o.is_correct,
                })
                .collect(),
        })
    }
}

/// Option sent to the quiz-taking client. Never carries correctness.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PublicOption {
    pub id: i64,
    pub text: String,
}

/// Question sent to the quiz-taking client.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub question_type: QuestionType,
    /// 1-based position in the quiz.
    pub order: i32,
    pub options: Vec<PublicOption>,
}

impl PublicQuestion {
    pub fn from_rows(row: &QuestionRow, order: i32, options: &[OptionRow]) -> Result<Self, AppError> {
        Ok(Self {
            id: row.id,
            text: row.text.clone(),
            question_type: row.parsed_type()?,
            order,
            options: options
                .iter()
                .map(|o| PublicOption {
                    id: o.id,
                    text: o.text.clone(),
                })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptionInput {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for creating or replacing a question bank item.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_answer_key))]
pub struct QuestionInput {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
    pub question_type: QuestionType,
    pub difficulty: Option<Difficulty>,
    pub study_year_id: Option<i64>,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
    #[validate(length(max = 10000))]
    pub explanation: Option<String>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub explanation_img: Option<String>,
    #[validate(nested, length(max = 20))]
    #[serde(default)]
    pub options: Vec<OptionInput>,
}

/// Choice questions need at least two options and a correct one;
/// single-choice questions need exactly one correct option.
fn validate_answer_key(input: &QuestionInput) -> Result<(), ValidationError> {
    if !input.question_type.is_option_scored() {
        return Ok(());
    }
    if input.options.len() < 2 {
        return Err(ValidationError::new("at_least_two_options")
            .with_message("Au moins 2 options sont requises".into()));
    }
    let correct = input.options.iter().filter(|o| o.is_correct).count();
    if correct == 0 {
        return Err(ValidationError::new("no_correct_option")
            .with_message("Au moins une option doit être marquée comme correcte".into()));
    }
    if input.question_type == QuestionType::SingleChoice && correct != 1 {
        return Err(ValidationError::new("single_choice_needs_one_correct")
            .with_message("Une question à choix unique doit avoir exactement une bonne réponse".into()));
    }
    Ok(())
}

/// Validates that a string is a correctly formatted URL.
fn validate_url_string(url: &str) -> Result<(), ValidationError> {
    if Url::parse(url).is_err() {
        return Err(ValidationError::new("invalid_url"));
    }
    Ok(())
}

/// Query parameters of the staff question list.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct QuestionListParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// Case-insensitive match on text or explanation.
    pub search: Option<String>,
    pub question_type: Option<QuestionType>,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
    pub difficulty: Option<Difficulty>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub page_size: i64,
    pub total_items: i64,
}

impl Pagination {
    pub fn new(current_page: i64, page_size: i64, total_items: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total_items + page_size - 1) / page_size
        } else {
            0
        };
        Self {
            current_page,
            total_pages,
            page_size,
            total_items,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionListResponse {
    pub questions: Vec<QuestionBankItem>,
    pub pagination: Pagination,
}

/// Available revision questions for a lesson/module selection.
#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCountResponse {
    pub total_questions: i64,
    /// Keyed by difficulty; questions without one are counted under "unspecified".
    pub by_difficulty: HashMap<String, i64>,
    pub by_type: HashMap<String, i64>,
}

impl QuestionCountResponse {
    pub const UNSPECIFIED_DIFFICULTY: &'static str = "unspecified";

    /// Folds `(type, difficulty, count)` groups into totals.
    pub fn from_groups(groups: impl IntoIterator<Item = (String, Option<String>, i64)>) -> Self {
        let mut response = Self::default();
        for (question_type, difficulty, count) in groups {
            response.total_questions += count;
            *response.by_type.entry(question_type).or_default() += count;
            let difficulty = difficulty.unwrap_or_else(|| Self::UNSPECIFIED_DIFFICULTY.to_string());
            *response.by_difficulty.entry(difficulty).or_default() += count;
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(question_type: QuestionType, correct: &[bool]) -> QuestionInput {
        QuestionInput {
            text: "Quel est le principe actif du Doliprane ?".into(),
            question_type,
            difficulty: Some(Difficulty::Easy),
            study_year_id: None,
            module_id: Some(1),
            lesson_id: None,
            explanation: None,
            explanation_img: None,
            options: correct
                .iter()
                .enumerate()
                .map(|(i, &is_correct)| OptionInput {
                    text: format!("Option {}", i),
                    is_correct,
                })
                .collect(),
        }
    }

    #[test]
    fn multiple_choice_with_two_correct_is_valid() {
        assert!(input(QuestionType::MultipleChoice, &[true, false, true]).validate().is_ok());
    }

    #[test]
    fn single_choice_rejects_two_correct_options() {
        assert!(input(QuestionType::SingleChoice, &[true, true]).validate().is_err());
    }

    #[test]
    fn choice_question_needs_a_correct_option() {
        assert!(input(QuestionType::MultipleChoice, &[false, false]).validate().is_err());
    }

    #[test]
    fn choice_question_needs_two_options() {
        assert!(input(QuestionType::SingleChoice, &[true]).validate().is_err());
    }

    #[test]
    fn at_most_twenty_options() {
        let mut correct = vec![false; 20];
        correct[0] = true;
        assert!(input(QuestionType::MultipleChoice, &correct).validate().is_ok());
        correct.push(false);
        assert!(input(QuestionType::MultipleChoice, &correct).validate().is_err());
    }

    #[test]
    fn open_response_may_have_no_options() {
        assert!(input(QuestionType::OpenResponse, &[]).validate().is_ok());
    }

    #[test]
    fn explanation_image_must_be_a_url() {
        let mut q = input(QuestionType::SingleChoice, &[true, false]);
        q.explanation_img = Some("not a url".into());
        assert!(q.validate().is_err());
        q.explanation_img = Some("https://cdn.example.org/img/paracetamol.png".into());
        assert!(q.validate().is_ok());
    }

    #[test]
    fn question_type_round_trips_through_storage_names() {
        for t in [
            QuestionType::SingleChoice,
            QuestionType::MultipleChoice,
            QuestionType::OpenResponse,
        ] {
            assert_eq!(t.as_str().parse::<QuestionType>().unwrap(), t);
        }
        assert!("QCM".parse::<QuestionType>().is_err());
    }

    #[test]
    fn count_response_folds_groups() {
        let counts = QuestionCountResponse::from_groups(vec![
            ("single_choice".to_string(), Some("easy".to_string()), 3),
            ("multiple_choice".to_string(), Some("easy".to_string()), 2),
            ("multiple_choice".to_string(), None, 4),
        ]);
        assert_eq!(counts.total_questions, 9);
        assert_eq!(counts.by_type["multiple_choice"], 6);
        assert_eq!(counts.by_difficulty["easy"], 5);
        assert_eq!(counts.by_difficulty[QuestionCountResponse::UNSPECIFIED_DIFFICULTY], 4);
    }

    #[test]
    fn pagination_rounds_up() {
        let p = Pagination::new(1, 10, 21);
        assert_eq!(p.total_pages, 3);
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
    }
}
