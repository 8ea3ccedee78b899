//! Environment-driven application settings.
//!
//! All variables use the `QUIZ_` prefix and fall back to defaults suitable
//! for local development. `.env` files are loaded by `main` via dotenvy
//! before these are read.

use std::path::PathBuf;
use std::time::Duration;

/// Default grader HTTP timeout in seconds.
const DEFAULT_GRADER_TIMEOUT_SECS: u64 = 5;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database URL.
    pub database_url: String,
    /// HTTP bind address.
    pub bind_address: String,
    /// HTTP port.
    pub port: u16,
    /// Allowed CORS origins; `*` means any.
    pub cors_origins: Vec<String>,
    /// Root directory for uploaded media.
    pub media_root: PathBuf,
    /// Grader API key; the oracle is disabled when absent.
    pub grader_api_key: Option<String>,
    /// Grader model identifier.
    pub grader_model: String,
    /// Grader HTTP timeout.
    pub grader_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:quiz.db?mode=rwc".to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            media_root: PathBuf::from("media"),
            grader_api_key: None,
            grader_model: "gpt-3.5-turbo".to_string(),
            grader_timeout: Duration::from_secs(DEFAULT_GRADER_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("QUIZ_DATABASE_URL")
            && !url.trim().is_empty()
        {
            settings.database_url = url;
        }

        if let Ok(bind_address) = std::env::var("QUIZ_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            settings.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("QUIZ_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            settings.port = parsed;
        }

        if let Ok(raw) = std::env::var("QUIZ_CORS_ORIGINS") {
            let origins: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(ToString::to_string)
                .collect();
            if !origins.is_empty() {
                settings.cors_origins = origins;
            }
        }

        if let Ok(root) = std::env::var("QUIZ_MEDIA_ROOT")
            && !root.trim().is_empty()
        {
            settings.media_root = PathBuf::from(root);
        }

        if let Ok(key) = std::env::var("QUIZ_GRADER_API_KEY")
            && !key.trim().is_empty()
        {
            settings.grader_api_key = Some(key);
        }

        if let Ok(model) = std::env::var("QUIZ_GRADER_MODEL")
            && !model.trim().is_empty()
        {
            settings.grader_model = model;
        }

        if let Ok(timeout) = std::env::var("QUIZ_GRADER_TIMEOUT_SECS")
            && let Ok(parsed) = timeout.parse::<u64>()
        {
            settings.grader_timeout = Duration::from_secs(parsed);
        }

        settings
    }

    /// Whether any origin is allowed.
    pub fn cors_allow_any(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8000);
        assert!(settings.cors_allow_any());
        assert!(settings.grader_api_key.is_none());
        assert_eq!(settings.grader_timeout, Duration::from_secs(5));
    }
}
