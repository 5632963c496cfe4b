// src/openapi.rs

use axum::Json;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::handlers::{question_bank, revision_quiz};

/// OpenAPI description of the public HTTP surface.
#[derive(OpenApi)]
#[openapi(
    info(title = "Revision quiz API"),
    paths(
        revision_quiz::create_revision_quiz,
        revision_quiz::get_revision_quiz,
        revision_quiz::submit_revision_quiz,
        revision_quiz::get_attempt_results,
        revision_quiz::get_history,
        question_bank::count_questions,
        question_bank::list_questions,
        question_bank::get_question,
        question_bank::create_question,
        question_bank::update_question,
        question_bank::toggle_question,
        question_bank::delete_question,
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "revision-quiz", description = "Student revision sessions"),
        (name = "question-bank", description = "Question bank management"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Serves the OpenAPI document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_revision_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/student/revision-quiz/create"));
        assert!(doc.paths.paths.contains_key("/api/question-bank/{id}/toggle"));
        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("bearer"));
    }
}
