//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::routes;
use crate::config::Settings;
use crate::database::repositories::{
    AnswerRepository, PlayerRepository, QuizRepository, SessionRepository, SnapshotRepository,
};
use crate::error::Result;
use crate::runtime::RuntimeController;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Application settings
    pub settings: Arc<Settings>,
    /// The session runtime controller
    pub controller: Arc<RuntimeController>,
    /// Quiz repository for content CRUD
    pub quiz_repository: Arc<dyn QuizRepository>,
    /// Session repository for session rows and playlists
    pub session_repository: Arc<dyn SessionRepository>,
    /// Player repository, used by admin reset/delete
    pub player_repository: Arc<dyn PlayerRepository>,
    /// Answer repository, used by admin reset/delete
    pub answer_repository: Arc<dyn AnswerRepository>,
    /// Snapshot repository, used by admin reset/delete
    pub snapshot_repository: Arc<dyn SnapshotRepository>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        controller: Arc<RuntimeController>,
        quiz_repository: Arc<dyn QuizRepository>,
        session_repository: Arc<dyn SessionRepository>,
        player_repository: Arc<dyn PlayerRepository>,
        answer_repository: Arc<dyn AnswerRepository>,
        snapshot_repository: Arc<dyn SnapshotRepository>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            settings,
            controller,
            quiz_repository,
            session_repository,
            player_repository,
            answer_repository,
            snapshot_repository,
        }
    }
}

/// API server.
pub struct ApiServer {
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    /// Create a new API server over the shared state.
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    fn build_router(&self) -> Router {
        let settings = &self.state.settings;

        let cors = if settings.cors_allow_any() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = settings
                .cors_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        };

        routes::create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Start the server.
    pub async fn run(&self) -> Result<()> {
        let settings = &self.state.settings;
        let addr: SocketAddr = format!("{}:{}", settings.bind_address, settings.port)
            .parse()
            .map_err(|e| crate::error::Error::ApiError(format!("Invalid address: {}", e)))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| crate::error::Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
