//! Session management and lifecycle routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    CreateSessionRequest, DeleteResponse, ManualParams, RevealParams, SessionResponse,
};
use crate::api::server::AppState;
use crate::database::models::{SessionDbModel, SessionQuizDbModel, SessionStatus};
use crate::runtime::SessionStateView;

/// Create the sessions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_session).get(list_sessions))
        .route("/{session_id}", axum::routing::delete(delete_session))
        .route("/{session_id}/state", get(session_state))
        .route("/{session_id}/start", post(start_session))
        .route("/{session_id}/resume", post(resume_session))
        .route("/{session_id}/next", post(force_next))
        .route("/{session_id}/manual", post(toggle_manual))
        .route("/{session_id}/reset", post(reset_session))
        .route("/{session_id}/reveal_scores", post(reveal_scores))
        .route("/{session_id}/duplicate", post(duplicate_session))
}

pub async fn session_response(state: &AppState, session_id: &str) -> ApiResult<Json<SessionResponse>> {
    let session = state.session_repository.get_session(session_id).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Create a draft session from a playlist of quiz ids.
#[utoipa::path(
    post,
    path = "/admin/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Created session", body = SessionResponse),
        (status = 400, description = "Empty playlist", body = crate::api::error::ApiErrorResponse),
        (status = 404, description = "Unknown quiz ids", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<SessionResponse>> {
    if request.quiz_ids.is_empty() {
        return Err(ApiError::bad_request("At least one quiz_id required"));
    }

    let mut missing = Vec::new();
    for quiz_id in &request.quiz_ids {
        if state.quiz_repository.get_quiz(quiz_id).await.is_err() {
            missing.push(quiz_id.clone());
        }
    }
    if !missing.is_empty() {
        return Err(ApiError::not_found(format!(
            "Unknown quiz ids: {}",
            missing.join(", ")
        )));
    }

    let session = SessionDbModel::new(&request.name);
    let links: Vec<SessionQuizDbModel> = request
        .quiz_ids
        .iter()
        .enumerate()
        .map(|(position, quiz_id)| {
            SessionQuizDbModel::new(&session.id, quiz_id, position as i64)
        })
        .collect();
    state.session_repository.create_session(&session, &links).await?;

    Ok(Json(SessionResponse::from(&session)))
}

/// List all sessions.
#[utoipa::path(
    get,
    path = "/admin/sessions",
    tag = "sessions",
    responses(
        (status = 200, description = "All sessions", body = [SessionResponse])
    )
)]
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Json<Vec<SessionResponse>>> {
    let sessions = state.session_repository.list_sessions().await?;
    Ok(Json(sessions.iter().map(SessionResponse::from).collect()))
}

/// The controller's live state view for a session.
#[utoipa::path(
    get,
    path = "/admin/sessions/{session_id}/state",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Runtime state", body = SessionStateView),
        (status = 404, description = "Unknown session", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn session_state(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionStateView>> {
    let view = state.controller.state(&session_id).await?;
    Ok(Json(view))
}

/// Start a session.
#[utoipa::path(
    post,
    path = "/admin/sessions/{session_id}/start",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session started", body = SessionResponse),
        (status = 400, description = "No questions to run", body = crate::api::error::ApiErrorResponse),
        (status = 404, description = "Unknown session", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn start_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    state.controller.start(&session_id).await?;
    session_response(&state, &session_id).await
}

/// Resume a session from its newest snapshot.
#[utoipa::path(
    post,
    path = "/admin/sessions/{session_id}/resume",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session resumed", body = SessionResponse),
        (status = 400, description = "No usable snapshot", body = crate::api::error::ApiErrorResponse),
        (status = 404, description = "Unknown session", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    state.controller.resume(&session_id).await?;
    session_response(&state, &session_id).await
}

/// Advance one stage.
#[utoipa::path(
    post,
    path = "/admin/sessions/{session_id}/next",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Stage advanced", body = SessionResponse),
        (status = 400, description = "Session not active", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn force_next(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    state.controller.force_next(&session_id).await?;
    session_response(&state, &session_id).await
}

/// Toggle the host's manual override.
#[utoipa::path(
    post,
    path = "/admin/sessions/{session_id}/manual",
    tag = "sessions",
    params(
        ("session_id" = String, Path, description = "Session id"),
        ManualParams
    ),
    responses(
        (status = 200, description = "Override updated", body = SessionResponse),
        (status = 404, description = "Unknown session", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn toggle_manual(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<ManualParams>,
) -> ApiResult<Json<SessionResponse>> {
    state.controller.set_manual(&session_id, params.manual).await?;
    session_response(&state, &session_id).await
}

/// Reset a session back to draft, clearing all durable per-session state.
#[utoipa::path(
    post,
    path = "/admin/sessions/{session_id}/reset",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session reset", body = SessionResponse),
        (status = 404, description = "Unknown session", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    state.session_repository.get_session(&session_id).await?;
    state.controller.cancel(&session_id).await;

    state.session_repository.reset_session(&session_id).await?;
    state.snapshot_repository.delete_for_session(&session_id).await?;
    state.answer_repository.delete_for_session(&session_id).await?;
    state.player_repository.delete_for_session(&session_id).await?;

    session_response(&state, &session_id).await
}

/// Show or hide final scores; only allowed once the session is finished.
#[utoipa::path(
    post,
    path = "/admin/sessions/{session_id}/reveal_scores",
    tag = "sessions",
    params(
        ("session_id" = String, Path, description = "Session id"),
        RevealParams
    ),
    responses(
        (status = 200, description = "Reveal flag updated", body = SessionResponse),
        (status = 400, description = "Session not finished", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn reveal_scores(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<RevealParams>,
) -> ApiResult<Json<SessionResponse>> {
    let session = state.session_repository.get_session(&session_id).await?;
    if session.status_kind() != Some(SessionStatus::Finished) {
        return Err(ApiError::bad_request(
            "Scores can only be revealed after the session is finished",
        ));
    }
    state
        .controller
        .set_scores_revealed(&session_id, params.reveal)
        .await;
    Ok(Json(SessionResponse::from(&session)))
}

/// Duplicate a session's playlist into a fresh draft.
#[utoipa::path(
    post,
    path = "/admin/sessions/{session_id}/duplicate",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "New draft session", body = SessionResponse),
        (status = 404, description = "Unknown session", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn duplicate_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    let session = state.session_repository.get_session(&session_id).await?;
    let links = state.session_repository.quiz_links(&session_id).await?;

    let copy = SessionDbModel::new(format!("{} (copy)", session.name));
    let new_links: Vec<SessionQuizDbModel> = links
        .iter()
        .enumerate()
        .map(|(position, link)| SessionQuizDbModel::new(&copy.id, &link.quiz_id, position as i64))
        .collect();
    state.session_repository.create_session(&copy, &new_links).await?;

    Ok(Json(SessionResponse::from(&copy)))
}

/// Delete a session and its dependent rows.
#[utoipa::path(
    delete,
    path = "/admin/sessions/{session_id}",
    tag = "sessions",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Deleted", body = DeleteResponse),
        (status = 404, description = "Unknown session", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    state.session_repository.get_session(&session_id).await?;
    state.controller.cancel(&session_id).await;

    state.snapshot_repository.delete_for_session(&session_id).await?;
    state.answer_repository.delete_for_session(&session_id).await?;
    state.player_repository.delete_for_session(&session_id).await?;
    state.session_repository.delete_session(&session_id).await?;

    Ok(Json(DeleteResponse {
        deleted: session_id,
    }))
}
