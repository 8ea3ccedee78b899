//! OpenAPI documentation configuration.
//!
//! Configures OpenAPI 3.0 specification generation using `utoipa` and
//! serves Swagger UI for interactive API exploration.

use utoipa::OpenApi;

use crate::api::error::ApiErrorResponse;
use crate::api::models::{
    CreateQuestionRequest, CreateQuizRequest, CreateSessionRequest, DeleteResponse,
    HealthResponse, QuestionResponse, QuizResponse, SessionResponse, UpdateQuestionRequest,
    UploadResponse,
};
use crate::runtime::state::{
    ClosestResultView, PlayerView, QuestionView, QuizIntroView, SessionStateView,
};

/// OpenAPI documentation for the quiz-host API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "quiz-host API",
        version = "0.1.0",
        description = "REST API for the quiz-host live session server. Provides endpoints for managing quiz content and driving live sessions; real-time state flows over the /ws observer channels.",
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "quizzes", description = "Quiz and question management endpoints"),
        (name = "sessions", description = "Session lifecycle and runtime endpoints"),
        (name = "media", description = "Media upload endpoint")
    ),
    paths(
        // Health endpoint
        crate::api::routes::health::health_check,
        // Quiz endpoints
        crate::api::routes::quizzes::create_quiz,
        crate::api::routes::quizzes::list_quizzes,
        crate::api::routes::quizzes::get_quiz,
        crate::api::routes::quizzes::add_question,
        crate::api::routes::quizzes::reorder_questions,
        crate::api::routes::quizzes::update_question,
        crate::api::routes::quizzes::delete_question,
        // Session endpoints
        crate::api::routes::sessions::create_session,
        crate::api::routes::sessions::list_sessions,
        crate::api::routes::sessions::session_state,
        crate::api::routes::sessions::start_session,
        crate::api::routes::sessions::resume_session,
        crate::api::routes::sessions::force_next,
        crate::api::routes::sessions::toggle_manual,
        crate::api::routes::sessions::reset_session,
        crate::api::routes::sessions::reveal_scores,
        crate::api::routes::sessions::duplicate_session,
        crate::api::routes::sessions::delete_session,
        // Media endpoint
        crate::api::routes::media::upload_media,
    ),
    components(schemas(
        ApiErrorResponse,
        HealthResponse,
        CreateQuizRequest,
        CreateQuestionRequest,
        UpdateQuestionRequest,
        QuizResponse,
        QuestionResponse,
        CreateSessionRequest,
        SessionResponse,
        DeleteResponse,
        UploadResponse,
        SessionStateView,
        PlayerView,
        QuizIntroView,
        QuestionView,
        ClosestResultView,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().expect("OpenAPI doc should serialize");
        assert!(json.contains("quiz-host API"));
        assert!(json.contains("/admin/sessions/{session_id}/start"));
    }
}
