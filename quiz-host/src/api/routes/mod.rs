//! API route modules.
//!
//! Organizes routes by resource type.

pub mod health;
pub mod media;
pub mod quizzes;
pub mod sessions;

use axum::Router;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;
use crate::api::server::AppState;
use crate::api::ws;

/// Create the main API router with all routes.
///
/// Routes are organized as:
/// - Admin surface: `/admin/*` (quiz and session management)
/// - Observer channels: `/ws/admin/{id}`, `/ws/player/{id}`
/// - Static media: `/media/*` served from the configured media root
/// - Documentation: `/docs` (Swagger UI), `/docs/openapi.json`
pub fn create_router(state: AppState) -> Router {
    let media_dir = ServeDir::new(&state.settings.media_root);

    Router::new()
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
        .nest("/health", health::router())
        .nest("/admin/quizzes", quizzes::router())
        .nest("/admin/sessions", sessions::router())
        .merge(media::router())
        .nest("/ws", ws::router())
        .nest_service("/media", media_dir)
        .with_state(state)
}
