// src/handlers/revision_quiz.rs

use std::collections::{BTreeSet, HashMap};

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    config::RevisionSettings,
    error::AppError,
    handlers::question_bank::load_options,
    models::{
        attempt::{
            ATTEMPT_COLUMNS, AttemptAnswerRow, AttemptResults, HistoryEntry, OptionOutcome,
            QuestionOutcome, QuestionReview, QuizAttempt, SubmissionResult,
        },
        question::{OptionRow, PublicQuestion, QUESTION_COLUMNS, QuestionRow},
        quiz::{
            CreateRevisionQuizRequest, DEFAULT_REVISION_QUESTION_COUNT, DEFAULT_REVISION_TITLE,
            QuizKind, QuizRow, RevisionQuizView, RevisionSessionResponse, SessionQuestionRow,
            SubmitAnswersRequest,
        },
    },
    services::{
        scoring::{self, AnswerKey, Grade},
        selection::{ELIGIBLE_FROM, EligibilityFilter, check_question_count, sample},
    },
    utils::jwt::Claims,
};

/// Session quiz owned by `user_id`, or 404.
async fn fetch_session_quiz(pool: &PgPool, quiz_id: i64, user_id: i64) -> Result<QuizRow, AppError> {
    sqlx::query_as::<_, QuizRow>(
        r#"
        SELECT id, kind, title, description, question_count, time_limit, created_by, created_at
        FROM quizzes
        WHERE id = $1 AND kind = $2 AND created_by = $3
        "#,
    )
    .bind(quiz_id)
    .bind(QuizKind::Session.as_str())
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Quiz non trouvé".to_string()))
}

/// Questions of a session quiz in position order.
async fn fetch_session_questions(pool: &PgPool, quiz_id: i64) -> Result<Vec<SessionQuestionRow>, AppError> {
    let rows = sqlx::query_as::<_, SessionQuestionRow>(&format!(
        r#"
        SELECT {}, gq.position
        FROM generated_questions gq
        JOIN question_bank q ON q.id = gq.question_bank_id
        WHERE gq.quiz_id = $1
        ORDER BY gq.position
        "#,
        QUESTION_COLUMNS
    ))
    .bind(quiz_id)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch session questions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;
    Ok(rows)
}

fn session_view(
    quiz: &QuizRow,
    questions: &[(&QuestionRow, i32)],
    options: &HashMap<i64, Vec<OptionRow>>,
) -> Result<RevisionQuizView, AppError> {
    let questions = questions
        .iter()
        .map(|(row, order)| {
            let opts = options.get(&row.id).map(Vec::as_slice).unwrap_or_default();
            PublicQuestion::from_rows(row, *order, opts)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RevisionQuizView {
        id: quiz.id,
        title: quiz.title.clone(),
        description: quiz.description.clone(),
        kind: QuizKind::Session,
        question_count: quiz.question_count,
        time_limit: quiz.time_limit,
        questions,
    })
}

/// Returns the caller's unfinished attempt at `quiz_id`, creating it if needed.
///
/// Relies on the partial unique index over unfinished attempts, so concurrent
/// calls converge on a single row.
async fn open_attempt(pool: &PgPool, quiz_id: i64, user_id: i64) -> Result<QuizAttempt, AppError> {
    let inserted = sqlx::query_as::<_, QuizAttempt>(&format!(
        r#"
        INSERT INTO quiz_attempts (quiz_id, user_id, started_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (quiz_id, user_id) WHERE finished_at IS NULL DO NOTHING
        RETURNING {}
        "#,
        ATTEMPT_COLUMNS
    ))
    .bind(quiz_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    if let Some(attempt) = inserted {
        tracing::info!(attempt_id = attempt.id, quiz_id, user_id, "Revision attempt started");
        return Ok(attempt);
    }

    find_unfinished_attempt(pool, quiz_id, user_id)
        .await?
        .ok_or_else(|| AppError::InternalServerError("unfinished attempt vanished".to_string()))
}

async fn find_unfinished_attempt(
    pool: &PgPool,
    quiz_id: i64,
    user_id: i64,
) -> Result<Option<QuizAttempt>, AppError> {
    let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {} FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2 AND finished_at IS NULL",
        ATTEMPT_COLUMNS
    ))
    .bind(quiz_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(attempt)
}

/// Generates a revision quiz from the question bank and starts an attempt.
///
/// * Filters active, scorable questions by lesson/module (plus difficulty/type).
/// * Samples `questionCount` distinct questions at random.
/// * Persists the session quiz, its ordered questions and the attempt in one transaction.
/// * Returns the questions without correctness flags.
#[utoipa::path(
    post,
    path = "/api/student/revision-quiz/create",
    tag = "revision-quiz",
    request_body = CreateRevisionQuizRequest,
    responses(
        (status = 201, body = RevisionSessionResponse),
        (status = 400, description = "No selection, count out of range, or not enough questions"),
    ),
    security(("bearer" = []))
)]
pub async fn create_revision_quiz(
    State(pool): State<PgPool>,
    State(settings): State<RevisionSettings>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateRevisionQuizRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let Json(req) = payload?;
    req.validate()?;

    let filter = EligibilityFilter::new(req.selected_lessons, req.selected_modules)?
        .with_difficulty(req.difficulty)
        .with_question_types(req.question_types.as_deref().unwrap_or_default());
    let count = check_question_count(
        req.question_count.unwrap_or(DEFAULT_REVISION_QUESTION_COUNT),
        &settings,
    )?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
    builder.push(QUESTION_COLUMNS);
    builder.push(ELIGIBLE_FROM);
    filter.push_where(&mut builder);

    let candidates: Vec<QuestionRow> = builder.build_query_as().fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to fetch eligible questions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let selected = sample(candidates, count, &mut rand::thread_rng())?;

    let title = req.title.unwrap_or_else(|| DEFAULT_REVISION_TITLE.to_string());
    let description = format!("Quiz de révision généré avec {} questions", count);
    let time_limit = req.time_limit.unwrap_or(settings.default_time_limit);

    let mut tx = pool.begin().await?;

    let quiz = sqlx::query_as::<_, QuizRow>(
        r#"
        INSERT INTO quizzes (kind, title, description, question_count, time_limit, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, kind, title, description, question_count, time_limit, created_by, created_at
        "#,
    )
    .bind(QuizKind::Session.as_str())
    .bind(&title)
    .bind(&description)
    .bind(count as i32)
    .bind(time_limit)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create session quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let mut links: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO generated_questions (quiz_id, question_bank_id, position) ");
    links.push_values(selected.iter().enumerate(), |mut b, (index, question)| {
        b.push_bind(quiz.id)
            .push_bind(question.id)
            .push_bind(index as i32 + 1);
    });
    links.build().execute(&mut *tx).await?;

    let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
        "INSERT INTO quiz_attempts (quiz_id, user_id, started_at) VALUES ($1, $2, NOW()) RETURNING {}",
        ATTEMPT_COLUMNS
    ))
    .bind(quiz.id)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        quiz_id = quiz.id,
        attempt_id = attempt.id,
        user_id,
        question_count = count,
        "Revision quiz generated"
    );

    let ids: Vec<i64> = selected.iter().map(|q| q.id).collect();
    let options = load_options(&pool, &ids).await?;
    let ordered: Vec<(&QuestionRow, i32)> = selected
        .iter()
        .enumerate()
        .map(|(index, q)| (q, index as i32 + 1))
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(RevisionSessionResponse {
            session_id: attempt.id,
            quiz: session_view(&quiz, &ordered, &options)?,
            started_at: attempt.started_at,
        }),
    ))
}

/// Fetches (resumes) a revision session.
///
/// Reuses the caller's unfinished attempt, or starts a new one.
#[utoipa::path(
    get,
    path = "/api/student/revision-quiz/{id}",
    tag = "revision-quiz",
    params(("id" = i64, Path, description = "Session quiz id")),
    responses(
        (status = 200, body = RevisionSessionResponse),
        (status = 404, description = "Quiz not found"),
    ),
    security(("bearer" = []))
)]
pub async fn get_revision_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_session_quiz(&pool, quiz_id, user_id).await?;

    let rows = fetch_session_questions(&pool, quiz.id).await?;
    if rows.is_empty() {
        return Err(AppError::BadRequest("Ce quiz ne contient aucune question".to_string()));
    }

    let attempt = open_attempt(&pool, quiz.id, user_id).await?;

    let ids: Vec<i64> = rows.iter().map(|r| r.question.id).collect();
    let options = load_options(&pool, &ids).await?;
    let ordered: Vec<(&QuestionRow, i32)> = rows.iter().map(|r| (&r.question, r.position)).collect();

    Ok(Json(RevisionSessionResponse {
        session_id: attempt.id,
        quiz: session_view(&quiz, &ordered, &options)?,
        started_at: attempt.started_at,
    }))
}

fn option_outcomes(options: &[OptionRow], selected: &BTreeSet<i64>) -> Vec<OptionOutcome> {
    options
        .iter()
        .map(|o| OptionOutcome {
            id: o.id,
            text: o.text.clone(),
            is_correct: o.is_correct,
            selected: selected.contains(&o.id),
        })
        .collect()
}

/// Submits answers for the caller's unfinished attempt and scores it.
///
/// * A question is correct only when the selected option set equals the correct set.
/// * Stores one answer row per selected option, then finishes the attempt.
/// * A second submission of the same attempt is rejected.
#[utoipa::path(
    post,
    path = "/api/student/revision-quiz/{id}/submit",
    tag = "revision-quiz",
    params(("id" = i64, Path, description = "Session quiz id")),
    request_body = SubmitAnswersRequest,
    responses(
        (status = 200, body = SubmissionResult),
        (status = 400, description = "Option does not belong to its question"),
        (status = 404, description = "No unfinished attempt"),
        (status = 409, description = "Attempt already submitted"),
    ),
    security(("bearer" = []))
)]
pub async fn submit_revision_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    payload: Result<Json<SubmitAnswersRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let Json(req) = payload?;

    let Some(attempt) = find_unfinished_attempt(&pool, quiz_id, user_id).await? else {
        let already_finished: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2)",
        )
        .bind(quiz_id)
        .bind(user_id)
        .fetch_one(&pool)
        .await?;

        return Err(if already_finished {
            AppError::Conflict("Cette tentative a déjà été soumise".to_string())
        } else {
            AppError::NotFound("Session de quiz non trouvée".to_string())
        });
    };

    let rows = fetch_session_questions(&pool, quiz_id).await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.question.id).collect();
    let options = load_options(&pool, &ids).await?;

    let keys: Vec<AnswerKey> = rows
        .iter()
        .map(|r| {
            let opts = options.get(&r.question.id).map(Vec::as_slice).unwrap_or_default();
            AnswerKey::from_options(r.question.id, opts)
        })
        .collect();

    let selections = scoring::normalize_answers(&keys, &req.answers)?;
    let grade = scoring::grade(&keys, &selections);

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM quiz_attempt_answers WHERE attempt_id = $1")
        .bind(attempt.id)
        .execute(&mut *tx)
        .await?;

    let answer_rows: Vec<(i64, i64, bool)> = grade
        .verdicts
        .iter()
        .flat_map(|v| v.selected.iter().map(move |option_id| (v.question_id, *option_id, v.is_correct)))
        .collect();

    if !answer_rows.is_empty() {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO quiz_attempt_answers (attempt_id, question_id, selected_option_id, is_correct) ",
        );
        builder.push_values(answer_rows, |mut b, (question_id, option_id, is_correct)| {
            b.push_bind(attempt.id)
                .push_bind(question_id)
                .push_bind(option_id)
                .push_bind(is_correct);
        });
        builder.build().execute(&mut *tx).await?;
    }

    let finished = sqlx::query_as::<_, QuizAttempt>(&format!(
        r#"
        UPDATE quiz_attempts
        SET finished_at = NOW(), score = $2, correct_answers = $3, total_questions = $4
        WHERE id = $1 AND finished_at IS NULL
        RETURNING {}
        "#,
        ATTEMPT_COLUMNS
    ))
    .bind(attempt.id)
    .bind(grade.score)
    .bind(grade.correct_answers as i32)
    .bind(grade.total_questions as i32)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::Conflict("Cette tentative a déjà été soumise".to_string()))?;

    tx.commit().await?;

    tracing::info!(
        attempt_id = finished.id,
        quiz_id,
        user_id,
        score = grade.score,
        "Revision quiz submitted"
    );

    let questions = rows
        .iter()
        .zip(&grade.verdicts)
        .map(|(row, verdict)| {
            let opts = options.get(&row.question.id).map(Vec::as_slice).unwrap_or_default();
            QuestionOutcome {
                id: row.question.id,
                text: row.question.text.clone(),
                user_answers: verdict.selected.iter().copied().collect(),
                correct_answers: opts.iter().filter(|o| o.is_correct).map(|o| o.id).collect(),
                is_correct: verdict.is_correct,
                options: option_outcomes(opts, &verdict.selected),
            }
        })
        .collect();

    Ok(Json(SubmissionResult {
        attempt_id: finished.id,
        score: grade.score,
        correct_answers: grade.correct_answers as i32,
        total_questions: grade.total_questions as i32,
        percentage: grade.score,
        time_spent: finished.seconds_spent() / 60,
        questions,
    }))
}

/// Score figures of a finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScoreSummary {
    score: i32,
    correct_answers: i32,
    total_questions: i32,
}

/// Figures recorded at submission time. Later edits to the bank can drop stored
/// answers, so the regraded breakdown is only used when nothing was recorded.
fn stored_summary(attempt: &QuizAttempt, regraded: &Grade) -> ScoreSummary {
    ScoreSummary {
        score: attempt.score.unwrap_or(regraded.score),
        correct_answers: attempt
            .correct_answers
            .unwrap_or(regraded.correct_answers as i32),
        total_questions: attempt
            .total_questions
            .unwrap_or(regraded.total_questions as i32),
    }
}

fn join_texts<'a>(options: &'a [OptionRow], mut keep: impl FnMut(&OptionRow) -> bool) -> String {
    options
        .iter()
        .filter(|o| keep(*o))
        .map(|o| o.text.as_str())
        .collect::<Vec<&'a str>>()
        .join(", ")
}

/// Detailed results of one of the caller's finished attempts.
///
/// Correctness is recomputed from the stored answer rows.
#[utoipa::path(
    get,
    path = "/api/student/revision-quiz/results/{attempt_id}",
    tag = "revision-quiz",
    params(("attempt_id" = i64, Path, description = "Attempt id")),
    responses(
        (status = 200, body = AttemptResults),
        (status = 404, description = "Attempt not found"),
        (status = 409, description = "Attempt not finished yet"),
    ),
    security(("bearer" = []))
)]
pub async fn get_attempt_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {} FROM quiz_attempts WHERE id = $1 AND user_id = $2",
        ATTEMPT_COLUMNS
    ))
    .bind(attempt_id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Tentative non trouvée".to_string()))?;

    if attempt.finished_at.is_none() {
        return Err(AppError::Conflict("Cette tentative n'est pas encore terminée".to_string()));
    }

    let quiz_title: String = sqlx::query_scalar("SELECT title FROM quizzes WHERE id = $1")
        .bind(attempt.quiz_id)
        .fetch_one(&pool)
        .await?;

    let rows = fetch_session_questions(&pool, attempt.quiz_id).await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.question.id).collect();
    let options = load_options(&pool, &ids).await?;

    let answers = sqlx::query_as::<_, AttemptAnswerRow>(
        "SELECT question_id, selected_option_id FROM quiz_attempt_answers WHERE attempt_id = $1",
    )
    .bind(attempt.id)
    .fetch_all(&pool)
    .await?;

    let mut selections: HashMap<i64, BTreeSet<i64>> = HashMap::new();
    for answer in answers {
        selections
            .entry(answer.question_id)
            .or_default()
            .insert(answer.selected_option_id);
    }

    let keys: Vec<AnswerKey> = rows
        .iter()
        .map(|r| {
            let opts = options.get(&r.question.id).map(Vec::as_slice).unwrap_or_default();
            AnswerKey::from_options(r.question.id, opts)
        })
        .collect();
    let grade = scoring::grade(&keys, &selections);
    let summary = stored_summary(&attempt, &grade);

    let questions = rows
        .into_iter()
        .zip(grade.verdicts)
        .map(|(row, verdict)| {
            let opts = options.get(&row.question.id).map(Vec::as_slice).unwrap_or_default();
            Ok(QuestionReview {
                question_type: row.question.parsed_type()?,
                question_id: row.question.id,
                question_text: row.question.text,
                user_answer: join_texts(opts, |o| verdict.selected.contains(&o.id)),
                correct_answer: join_texts(opts, |o| o.is_correct),
                is_correct: verdict.is_correct,
                explanation: row.question.explanation,
                explanation_img: row.question.explanation_img,
                options: option_outcomes(opts, &verdict.selected),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(Json(AttemptResults {
        attempt_id: attempt.id,
        quiz_id: attempt.quiz_id,
        quiz_title,
        score: summary.score,
        percentage: summary.score,
        correct_answers: summary.correct_answers,
        total_questions: summary.total_questions,
        started_at: attempt.started_at,
        completed_at: attempt.finished_at,
        time_spent: attempt.seconds_spent(),
        questions,
    }))
}

/// Lists the caller's finished revision quizzes, newest first.
#[utoipa::path(
    get,
    path = "/api/student/revision-quiz/history",
    tag = "revision-quiz",
    responses((status = 200, body = Vec<HistoryEntry>)),
    security(("bearer" = []))
)]
pub async fn get_history(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let history = sqlx::query_as::<_, HistoryEntry>(
        r#"
        SELECT
            a.id,
            a.quiz_id,
            q.title AS quiz_title,
            q.description AS quiz_description,
            COALESCE(a.score, 0) AS score,
            a.started_at,
            a.finished_at,
            FLOOR(EXTRACT(EPOCH FROM (a.finished_at - a.started_at)) / 60)::BIGINT AS time_spent,
            q.question_count
        FROM quiz_attempts a
        JOIN quizzes q ON q.id = a.quiz_id
        WHERE a.user_id = $1 AND q.kind = $2 AND a.finished_at IS NOT NULL
        ORDER BY a.finished_at DESC
        "#,
    )
    .bind(user_id)
    .bind(QuizKind::Session.as_str())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch revision history: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(history))
}
