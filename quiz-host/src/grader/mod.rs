//! Free-text answer grading.
//!
//! Text answers are judged by an external chat-completion model when an API
//! key is configured. The oracle returns a bare true/false verdict; any
//! failure (missing key, timeout, non-200, malformed body) falls back to
//! case-insensitive trimmed equality against the target answer.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::Settings;

const DEFAULT_API_BASE: &str = "https://api.openai.com";

/// Boolean judge for free-text answers.
#[async_trait]
pub trait TextGrader: Send + Sync {
    /// Whether the user's answer is acceptable compared to the target.
    async fn evaluate(&self, user_answer: Option<&str>, target_answer: Option<&str>) -> bool;
}

/// Case-insensitive trimmed equality, the verdict of last resort.
pub fn fallback_verdict(user_answer: &str, target_answer: &str) -> bool {
    user_answer.trim().to_lowercase() == target_answer.trim().to_lowercase()
}

/// Chat-completion-backed grader.
pub struct OpenAiGrader {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiGrader {
    pub fn new(api_key: Option<String>, model: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key,
            model: model.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.grader_api_key.clone(),
            settings.grader_model.clone(),
            settings.grader_timeout,
        )
    }

    /// Override the API base URL (tests point this at a local server).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn build_prompt(user_answer: &str, target_answer: &str) -> String {
        format!(
            "You are grading a quiz answer. Decide ONLY true/false if the user's answer is acceptable. \
             Accept reasonable variants, pluralization, small typos, or added 'the', 'a', punctuation. \
             Some answers might be loose translations of the target. Always prefer to grant the point if unsure.\n\
             Be lenient and judge like a generous host.\n\n\
             Target: {target_answer}\n\
             User: {user_answer}\n\
             Return a single word: true or false."
        )
    }

    async fn ask_model(&self, api_key: &str, user_answer: &str, target_answer: &str) -> crate::Result<bool> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You grade quiz answers as true/false only."},
                {"role": "user", "content": Self::build_prompt(user_answer, target_answer)},
            ],
            "max_tokens": 3,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.api_base))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| crate::Error::Grader(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(crate::Error::Grader(format!(
                "unexpected status {status}: {body}"
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| crate::Error::Grader(format!("malformed response: {e}")))?;

        let content = body
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_lowercase())
            .ok_or_else(|| crate::Error::Grader("response had no choices".to_string()))?;

        Ok(content.starts_with("true"))
    }
}

#[async_trait]
impl TextGrader for OpenAiGrader {
    async fn evaluate(&self, user_answer: Option<&str>, target_answer: Option<&str>) -> bool {
        let (user_answer, target_answer) = match (user_answer, target_answer) {
            (Some(user), Some(target)) if !user.is_empty() && !target.is_empty() => (user, target),
            _ => return false,
        };

        let Some(api_key) = self.api_key.as_deref() else {
            return fallback_verdict(user_answer, target_answer);
        };

        match self.ask_model(api_key, user_answer, target_answer).await {
            Ok(verdict) => {
                info!(
                    user = %user_answer,
                    target = %target_answer,
                    model = %self.model,
                    verdict,
                    "Grader verdict"
                );
                verdict
            }
            Err(e) => {
                warn!(
                    user = %user_answer,
                    target = %target_answer,
                    error = %e,
                    "Grader unavailable, falling back to string equality"
                );
                fallback_verdict(user_answer, target_answer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_equality() {
        assert!(fallback_verdict("  Rudolph ", "rudolph"));
        assert!(fallback_verdict("RUDOLPH", "Rudolph"));
        assert!(!fallback_verdict("Dasher", "Rudolph"));
    }

    #[tokio::test]
    async fn test_missing_key_uses_fallback() {
        let grader = OpenAiGrader::new(None, "gpt-3.5-turbo", Duration::from_secs(1));
        assert!(grader.evaluate(Some("rudolph"), Some("Rudolph")).await);
        assert!(!grader.evaluate(Some("dasher"), Some("Rudolph")).await);
    }

    #[tokio::test]
    async fn test_empty_inputs_are_false() {
        let grader = OpenAiGrader::new(None, "gpt-3.5-turbo", Duration::from_secs(1));
        assert!(!grader.evaluate(None, Some("Rudolph")).await);
        assert!(!grader.evaluate(Some(""), Some("Rudolph")).await);
        assert!(!grader.evaluate(Some("anything"), None).await);
    }

    #[tokio::test]
    async fn test_unreachable_oracle_falls_back() {
        // A key is configured but nothing listens on the endpoint, so the
        // request errors and the equality fallback decides.
        let grader = OpenAiGrader::new(
            Some("test-key".to_string()),
            "gpt-3.5-turbo",
            Duration::from_millis(200),
        )
        .with_api_base("http://127.0.0.1:9");

        assert!(grader.evaluate(Some("rudolph"), Some("Rudolph")).await);
        assert!(!grader.evaluate(Some("dasher"), Some("Rudolph")).await);
    }
}
