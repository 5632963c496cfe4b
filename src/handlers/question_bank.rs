// src/handlers/question_bank.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::question::{
        Difficulty, OptionRow, QUESTION_COLUMNS, QuestionBankItem, QuestionCountResponse,
        QuestionInput, QuestionListParams, QuestionListResponse, QuestionRow, QuestionType,
        Pagination,
    },
    services::selection::{ELIGIBLE_FROM, EligibilityFilter},
    utils::html::clean_html,
};

const MAX_PAGE_SIZE: i64 = 100;

/// Loads the options of the given questions, grouped by question id and
/// ordered by position.
pub(crate) async fn load_options(
    pool: &PgPool,
    question_ids: &[i64],
) -> Result<HashMap<i64, Vec<OptionRow>>, AppError> {
    if question_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, OptionRow>(
        r#"
        SELECT id, question_id, text, is_correct, position
        FROM question_bank_options
        WHERE question_id = ANY($1)
        ORDER BY question_id, position, id
        "#,
    )
    .bind(question_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load question options: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let mut grouped: HashMap<i64, Vec<OptionRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.question_id).or_default().push(row);
    }
    Ok(grouped)
}

async fn fetch_question(pool: &PgPool, id: i64) -> Result<QuestionBankItem, AppError> {
    let row = sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {} FROM question_bank q WHERE q.id = $1",
        QUESTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Question non trouvée".to_string()))?;

    let mut options = load_options(pool, &[id]).await?;
    QuestionBankItem::from_rows(row, options.remove(&id).unwrap_or_default())
}

/// Maps a write error, turning dangling study year/module/lesson ids into a 400.
fn write_error(context: &str, e: sqlx::Error) -> AppError {
    let fk_violation = e
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23503");
    if fk_violation {
        AppError::BadRequest("Année, module ou leçon inexistant".to_string())
    } else {
        tracing::error!("{}: {:?}", context, e);
        AppError::InternalServerError(e.to_string())
    }
}

/// Sanitizes rich text and rejects what is empty once cleaned.
fn sanitize(mut input: QuestionInput) -> Result<QuestionInput, AppError> {
    input.text = clean_html(&input.text);
    if input.text.trim().is_empty() {
        return Err(AppError::BadRequest("Le texte de la question est requis".to_string()));
    }
    input.explanation = input.explanation.map(|e| clean_html(&e)).filter(|e| !e.trim().is_empty());
    for option in &mut input.options {
        option.text = clean_html(&option.text);
    }
    Ok(input)
}

async fn insert_options(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    question_id: i64,
    input: &QuestionInput,
) -> Result<(), AppError> {
    if input.options.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO question_bank_options (question_id, text, is_correct, position) ");
    builder.push_values(input.options.iter().enumerate(), |mut b, (position, option)| {
        b.push_bind(question_id)
            .push_bind(option.text.clone())
            .push_bind(option.is_correct)
            .push_bind(position as i32);
    });
    builder.build().execute(&mut **tx).await?;
    Ok(())
}

/// Parses repeated query keys (`lessonIds=1&lessonIds=2`, `lessonIds[]=1`).
fn collect_param<T: std::str::FromStr>(
    pairs: &[(String, String)],
    name: &str,
) -> Result<Vec<T>, AppError> {
    pairs
        .iter()
        .filter(|(key, _)| key.strip_suffix("[]").unwrap_or(key) == name)
        .flat_map(|(_, value)| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| AppError::BadRequest(format!("Paramètre {} invalide: {}", name, value)))
        })
        .collect()
}

/// Counts the revision questions available for a lesson/module selection.
#[utoipa::path(
    get,
    path = "/api/question-bank/count",
    tag = "question-bank",
    params(
        ("lessonIds" = Option<Vec<i64>>, Query, description = "Selected lessons (repeatable)"),
        ("moduleIds" = Option<Vec<i64>>, Query, description = "Selected modules (repeatable)"),
        ("questionTypes" = Option<Vec<QuestionType>>, Query, description = "Restrict to these types"),
        ("difficulty" = Option<Difficulty>, Query, description = "Restrict to one difficulty"),
    ),
    responses(
        (status = 200, body = QuestionCountResponse),
        (status = 400, description = "No lesson or module selected"),
    ),
    security(("bearer" = []))
)]
pub async fn count_questions(
    State(pool): State<PgPool>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let lesson_ids = collect_param::<i64>(&pairs, "lessonIds")?;
    let module_ids = collect_param::<i64>(&pairs, "moduleIds")?;
    let question_types = collect_param::<QuestionType>(&pairs, "questionTypes")?;
    let difficulty = collect_param::<Difficulty>(&pairs, "difficulty")?.into_iter().next();

    let filter = EligibilityFilter::new(lesson_ids, module_ids)?
        .with_difficulty(difficulty)
        .with_question_types(&question_types);

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT q.question_type, q.difficulty, COUNT(*)");
    builder.push(ELIGIBLE_FROM);
    filter.push_where(&mut builder);
    builder.push(" GROUP BY q.question_type, q.difficulty");

    let groups: Vec<(String, Option<String>, i64)> = builder
        .build_query_as()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count questions: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(QuestionCountResponse::from_groups(groups)))
}

/// Row offset of `page` (1-based); pages past the addressable range are a 400.
fn page_offset(page: i64, page_size: i64) -> Result<i64, AppError> {
    (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| AppError::BadRequest(format!("Numéro de page invalide: {}", page)))
}

fn push_list_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &QuestionListParams) {
    builder.push(" WHERE TRUE");

    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        builder.push(" AND (q.text ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR q.explanation ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
    if let Some(question_type) = params.question_type {
        builder.push(" AND q.question_type = ");
        builder.push_bind(question_type.as_str());
    }
    if let Some(module_id) = params.module_id {
        builder.push(" AND q.module_id = ");
        builder.push_bind(module_id);
    }
    if let Some(lesson_id) = params.lesson_id {
        builder.push(" AND q.lesson_id = ");
        builder.push_bind(lesson_id);
    }
    if let Some(difficulty) = params.difficulty {
        builder.push(" AND q.difficulty = ");
        builder.push_bind(difficulty.as_str());
    }
    if let Some(is_active) = params.is_active {
        builder.push(" AND q.is_active = ");
        builder.push_bind(is_active);
    }
}

/// Lists question bank items, newest first.
/// Staff only.
#[utoipa::path(
    get,
    path = "/api/question-bank",
    tag = "question-bank",
    params(QuestionListParams),
    responses((status = 200, body = QuestionListResponse)),
    security(("bearer" = []))
)]
pub async fn list_questions(
    State(pool): State<PgPool>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(10).clamp(1, MAX_PAGE_SIZE);
    let offset = page_offset(page, page_size)?;

    let mut count_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM question_bank q");
    push_list_filters(&mut count_builder, &params);
    let total_items: i64 = count_builder
        .build_query_scalar()
        .fetch_one(&pool)
        .await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
    builder.push(QUESTION_COLUMNS);
    builder.push(" FROM question_bank q");
    push_list_filters(&mut builder, &params);
    builder.push(" ORDER BY q.created_at DESC, q.id DESC LIMIT ");
    builder.push_bind(page_size);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let rows: Vec<QuestionRow> = builder.build_query_as().fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to list question bank: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut options = load_options(&pool, &ids).await?;

    let questions = rows
        .into_iter()
        .map(|row| {
            let opts = options.remove(&row.id).unwrap_or_default();
            QuestionBankItem::from_rows(row, opts)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(QuestionListResponse {
        questions,
        pagination: Pagination::new(page, page_size, total_items),
    }))
}

/// Fetches one question bank item with its options.
/// Staff only.
#[utoipa::path(
    get,
    path = "/api/question-bank/{id}",
    tag = "question-bank",
    params(("id" = i64, Path, description = "Question id")),
    responses(
        (status = 200, body = QuestionBankItem),
        (status = 404, description = "Question not found"),
    ),
    security(("bearer" = []))
)]
pub async fn get_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_question(&pool, id).await?))
}

/// Creates a question with its options.
/// Staff only.
#[utoipa::path(
    post,
    path = "/api/question-bank",
    tag = "question-bank",
    request_body = QuestionInput,
    responses(
        (status = 201, body = QuestionBankItem),
        (status = 400, description = "Validation failed"),
    ),
    security(("bearer" = []))
)]
pub async fn create_question(
    State(pool): State<PgPool>,
    payload: Result<Json<QuestionInput>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;
    let payload = sanitize(payload)?;

    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO question_bank
        (text, question_type, difficulty, study_year_id, module_id, lesson_id, explanation, explanation_img)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(&payload.text)
    .bind(payload.question_type.as_str())
    .bind(payload.difficulty.map(Difficulty::as_str))
    .bind(payload.study_year_id)
    .bind(payload.module_id)
    .bind(payload.lesson_id)
    .bind(&payload.explanation)
    .bind(&payload.explanation_img)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| write_error("Failed to create question", e))?;

    insert_options(&mut tx, id, &payload).await?;
    tx.commit().await?;

    tracing::info!(question_id = id, "Question bank item created");
    Ok((StatusCode::CREATED, Json(fetch_question(&pool, id).await?)))
}

/// Replaces a question and all of its options.
/// Staff only.
#[utoipa::path(
    put,
    path = "/api/question-bank/{id}",
    tag = "question-bank",
    params(("id" = i64, Path, description = "Question id")),
    request_body = QuestionInput,
    responses(
        (status = 200, body = QuestionBankItem),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Question not found"),
    ),
    security(("bearer" = []))
)]
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    payload: Result<Json<QuestionInput>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;
    let payload = sanitize(payload)?;

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE question_bank SET
            text = $1, question_type = $2, difficulty = $3, study_year_id = $4,
            module_id = $5, lesson_id = $6, explanation = $7, explanation_img = $8,
            updated_at = NOW()
        WHERE id = $9
        "#,
    )
    .bind(&payload.text)
    .bind(payload.question_type.as_str())
    .bind(payload.difficulty.map(Difficulty::as_str))
    .bind(payload.study_year_id)
    .bind(payload.module_id)
    .bind(payload.lesson_id)
    .bind(&payload.explanation)
    .bind(&payload.explanation_img)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| write_error("Failed to update question", e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question non trouvée".to_string()));
    }

    sqlx::query("DELETE FROM question_bank_options WHERE question_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    insert_options(&mut tx, id, &payload).await?;
    tx.commit().await?;

    Ok(Json(fetch_question(&pool, id).await?))
}

/// Flips the active flag of a question.
/// Staff only.
#[utoipa::path(
    patch,
    path = "/api/question-bank/{id}/toggle",
    tag = "question-bank",
    params(("id" = i64, Path, description = "Question id")),
    responses(
        (status = 200, body = QuestionBankItem),
        (status = 404, description = "Question not found"),
    ),
    security(("bearer" = []))
)]
pub async fn toggle_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query(
        "UPDATE question_bank SET is_active = NOT is_active, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question non trouvée".to_string()));
    }

    Ok(Json(fetch_question(&pool, id).await?))
}

/// Deletes a question and its options.
/// Staff only.
#[utoipa::path(
    delete,
    path = "/api/question-bank/{id}",
    tag = "question-bank",
    params(("id" = i64, Path, description = "Question id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Question not found"),
    ),
    security(("bearer" = []))
)]
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM question_bank WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question non trouvée".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn collect_param_accepts_repeated_and_bracketed_keys() {
        let q = pairs(&[("lessonIds", "1"), ("lessonIds[]", "2"), ("moduleIds", "7,8")]);
        assert_eq!(collect_param::<i64>(&q, "lessonIds").unwrap(), vec![1, 2]);
        assert_eq!(collect_param::<i64>(&q, "moduleIds").unwrap(), vec![7, 8]);
        assert!(collect_param::<i64>(&q, "other").unwrap().is_empty());
    }

    #[test]
    fn collect_param_rejects_garbage() {
        let q = pairs(&[("lessonIds", "abc")]);
        assert!(matches!(
            collect_param::<i64>(&q, "lessonIds"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn collect_param_parses_question_types() {
        let q = pairs(&[("questionTypes", "single_choice"), ("questionTypes", "multiple_choice")]);
        assert_eq!(
            collect_param::<QuestionType>(&q, "questionTypes").unwrap(),
            vec![QuestionType::SingleChoice, QuestionType::MultipleChoice]
        );
    }

    #[test]
    fn page_offset_counts_from_one() {
        assert_eq!(page_offset(1, 10).unwrap(), 0);
        assert_eq!(page_offset(3, 25).unwrap(), 50);
    }

    #[test]
    fn page_offset_rejects_overflowing_pages() {
        assert!(matches!(page_offset(i64::MAX, 100), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn list_filters_bind_in_order() {
        let params = QuestionListParams {
            search: Some("paracétamol".into()),
            module_id: Some(3),
            is_active: Some(true),
            ..Default::default()
        };
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM question_bank q");
        push_list_filters(&mut builder, &params);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM question_bank q WHERE TRUE AND (q.text ILIKE $1 OR q.explanation ILIKE $2) \
             AND q.module_id = $3 AND q.is_active = $4"
        );
    }

    #[test]
    fn sanitize_strips_markup_and_rejects_empty_text() {
        let input: QuestionInput = serde_json::from_value(serde_json::json!({
            "text": "<script>x</script>",
            "questionType": "single_choice",
            "options": [{"text": "A", "isCorrect": true}, {"text": "B"}]
        }))
        .unwrap();
        assert!(matches!(sanitize(input), Err(AppError::BadRequest(_))));
    }
}
