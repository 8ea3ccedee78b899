//! quiz-host - Live Quiz Session Server
//!
//! Runs host-orchestrated quiz sessions: playlists of quizzes advance
//! through a timed stage timeline while players answer over WebSockets
//! and every observer receives continuous state updates.

use std::sync::Arc;

use quiz_host::api::server::{ApiServer, AppState};
use quiz_host::clock::SystemClock;
use quiz_host::config::Settings;
use quiz_host::database;
use quiz_host::database::repositories::{
    SqlxAnswerRepository, SqlxPlayerRepository, SqlxQuizRepository, SqlxSessionRepository,
    SqlxSnapshotRepository,
};
use quiz_host::grader::OpenAiGrader;
use quiz_host::logging::init_logging;
use quiz_host::runtime::RuntimeController;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging first so startup problems are captured
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let (logging_config, _guard) = init_logging(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting quiz-host v{}", env!("CARGO_PKG_VERSION"));

    // Load environment variables
    dotenvy::dotenv().ok();
    let settings = Arc::new(Settings::from_env());

    // Ensure the media root exists before serving uploads
    tokio::fs::create_dir_all(&settings.media_root).await?;

    // Initialize database
    info!("Connecting to database: {}", settings.database_url);
    let pool = database::init_pool(&settings.database_url).await?;

    info!("Running database migrations...");
    database::run_migrations(&pool).await?;
    info!("Database migrations complete");

    // Wire the runtime controller over its collaborators
    let quiz_repository = Arc::new(SqlxQuizRepository::new(pool.clone()));
    let session_repository = Arc::new(SqlxSessionRepository::new(pool.clone()));
    let player_repository = Arc::new(SqlxPlayerRepository::new(pool.clone()));
    let answer_repository = Arc::new(SqlxAnswerRepository::new(pool.clone()));
    let snapshot_repository = Arc::new(SqlxSnapshotRepository::new(pool.clone()));
    let grader = Arc::new(OpenAiGrader::from_settings(&settings));
    if settings.grader_api_key.is_none() {
        info!("No grader API key configured; text answers use equality fallback");
    }

    let controller = Arc::new(RuntimeController::new(
        Arc::new(SystemClock),
        grader,
        session_repository.clone(),
        quiz_repository.clone(),
        player_repository.clone(),
        answer_repository.clone(),
        snapshot_repository.clone(),
    ));

    let state = AppState::new(
        settings.clone(),
        controller,
        quiz_repository,
        session_repository,
        player_repository,
        answer_repository,
        snapshot_repository,
    );

    let server = ApiServer::new(state);
    let cancel_token = server.cancel_token();

    // Start log retention cleanup task
    logging_config.start_retention_cleanup(cancel_token.clone());

    // Run the server until a shutdown signal arrives
    let server_task = tokio::spawn(async move { server.run().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating shutdown...");
        }
        _ = wait_for_sigterm() => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cancel_token.cancel();
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Server error during shutdown: {}", e),
        Err(e) => tracing::error!("Server task panicked: {}", e),
    }

    info!("quiz-host shutdown complete");
    Ok(())
}

/// Wait for SIGTERM signal (Unix only).
#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Wait for SIGTERM signal (non-Unix - never resolves; Ctrl+C covers it).
#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
