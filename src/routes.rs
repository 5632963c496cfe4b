// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, patch, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{question_bank, revision_quiz},
    openapi::openapi_json,
    state::AppState,
    utils::jwt::{auth_middleware, staff_middleware, student_middleware},
};

/// Assembles the main application router.
///
/// * Student revision routes: authenticated, `STUDENT` role.
/// * Question bank management: authenticated, `ADMIN` or `INSTRUCTOR`.
/// * Question count: any authenticated role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let revision_routes = Router::new()
        .route("/create", post(revision_quiz::create_revision_quiz))
        .route("/history", get(revision_quiz::get_history))
        .route("/results/{attempt_id}", get(revision_quiz::get_attempt_results))
        .route("/{id}", get(revision_quiz::get_revision_quiz))
        .route("/{id}/submit", post(revision_quiz::submit_revision_quiz))
        .layer(middleware::from_fn(student_middleware));

    let question_bank_routes = Router::new()
        .route(
            "/",
            get(question_bank::list_questions).post(question_bank::create_question),
        )
        .route(
            "/{id}",
            get(question_bank::get_question)
                .put(question_bank::update_question)
                .delete(question_bank::delete_question),
        )
        .route("/{id}/toggle", patch(question_bank::toggle_question))
        .layer(middleware::from_fn(staff_middleware))
        // Open to every role, so it sits outside the staff check.
        .merge(Router::new().route("/count", get(question_bank::count_questions)));

    // Auth first, then the role checks above.
    let api_routes = Router::new()
        .nest("/student/revision-quiz", revision_routes)
        .nest("/question-bank", question_bank_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .route("/openapi.json", get(openapi_json));

    Router::new()
        .nest("/api", api_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
