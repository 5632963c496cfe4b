// src/services/selection.rs

//! Revision quiz question selection: eligibility filtering and random sampling.

use rand::{Rng, seq::SliceRandom};
use sqlx::{Postgres, QueryBuilder};

use crate::{
    config::RevisionSettings,
    error::AppError,
    models::question::{Difficulty, QuestionType},
};

/// FROM clause the eligibility filter's WHERE clause is written against.
pub const ELIGIBLE_FROM: &str = " FROM question_bank q LEFT JOIN lessons l ON l.id = q.lesson_id";

/// Which bank questions may appear in a revision quiz.
///
/// A question is eligible when it is active, option-scored, matches the optional
/// difficulty/type filters, and belongs to a selected lesson, a selected module,
/// or a lesson of a selected module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityFilter {
    lesson_ids: Vec<i64>,
    module_ids: Vec<i64>,
    difficulty: Option<Difficulty>,
    question_types: Vec<QuestionType>,
}

impl EligibilityFilter {
    /// Fails when neither lessons nor modules are selected.
    pub fn new(lesson_ids: Vec<i64>, module_ids: Vec<i64>) -> Result<Self, AppError> {
        if lesson_ids.is_empty() && module_ids.is_empty() {
            return Err(AppError::BadRequest(
                "Au moins un module ou une leçon doit être sélectionné".to_string(),
            ));
        }
        Ok(Self {
            lesson_ids,
            module_ids,
            difficulty: None,
            question_types: Vec::new(),
        })
    }

    pub fn with_difficulty(mut self, difficulty: Option<Difficulty>) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Restricts to the given types. Open-response types are dropped since
    /// they cannot be scored; an empty list means every scorable type.
    pub fn with_question_types(mut self, types: &[QuestionType]) -> Self {
        self.question_types = types.iter().copied().filter(|t| t.is_option_scored()).collect();
        self.question_types.sort_by_key(|t| t.as_str());
        self.question_types.dedup();
        self
    }

    /// Appends the WHERE clause. The builder must already contain `ELIGIBLE_FROM`.
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE q.is_active = TRUE AND q.question_type <> ");
        builder.push_bind(QuestionType::OpenResponse.as_str());

        if !self.question_types.is_empty() {
            let types: Vec<String> = self.question_types.iter().map(|t| t.as_str().to_string()).collect();
            builder.push(" AND q.question_type = ANY(");
            builder.push_bind(types);
            builder.push(")");
        }

        if let Some(difficulty) = self.difficulty {
            builder.push(" AND q.difficulty = ");
            builder.push_bind(difficulty.as_str());
        }

        builder.push(" AND (");
        let mut scope = builder.separated(" OR ");
        if !self.lesson_ids.is_empty() {
            scope.push("q.lesson_id = ANY(");
            scope.push_bind_unseparated(self.lesson_ids.clone());
            scope.push_unseparated(")");
        }
        if !self.module_ids.is_empty() {
            scope.push("q.module_id = ANY(");
            scope.push_bind_unseparated(self.module_ids.clone());
            scope.push_unseparated(")");
            scope.push("l.module_id = ANY(");
            scope.push_bind_unseparated(self.module_ids.clone());
            scope.push_unseparated(")");
        }
        builder.push(")");
    }
}

/// Checks a requested question count against the configured range.
pub fn check_question_count(requested: i64, settings: &RevisionSettings) -> Result<usize, AppError> {
    if requested < i64::from(settings.min_questions) || requested > i64::from(settings.max_questions) {
        return Err(AppError::BadRequest(format!(
            "Le nombre de questions doit être entre {} et {}",
            settings.min_questions, settings.max_questions
        )));
    }
    Ok(requested as usize)
}

/// Draws `count` items from `pool` uniformly at random (Fisher-Yates shuffle,
/// then the first `count`). Never returns fewer items than asked for.
pub fn sample<T, R>(mut pool: Vec<T>, count: usize, rng: &mut R) -> Result<Vec<T>, AppError>
where
    R: Rng + ?Sized,
{
    if pool.is_empty() {
        return Err(AppError::BadRequest(
            "Aucune question trouvée pour les critères sélectionnés".to_string(),
        ));
    }
    if pool.len() < count {
        return Err(AppError::BadRequest(format!(
            "Seulement {} questions disponibles, mais {} demandées",
            pool.len(),
            count
        )));
    }

    pool.shuffle(rng);
    pool.truncate(count);
    Ok(pool)
}
