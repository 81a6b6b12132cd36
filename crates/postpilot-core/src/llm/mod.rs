//! LLM providers and client
//!
//! A single chat-completion seam used by the classifier, the platform agents
//! and general chat, with timeout and retry applied in one place.

mod common;
mod openai_compat;
/// Implementations of specific LLM providers
pub mod providers;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{AgentSettings, LLM_INITIAL_BACKOFF_MS, LLM_MAX_ATTEMPTS};

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Missing provider configuration or API key
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// Rate limit exceeded (429), optionally with a wait time
    #[error("Rate limit exceeded: {message} (wait: {wait_secs:?}s)")]
    RateLimit {
        /// Retry-After duration in seconds, if provided by the server
        wait_secs: Option<u64>,
        /// Error message from the server
        message: String,
    },
    /// The request did not complete within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Any other unexpected error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// A message in an LLM conversation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: String,
    /// Text content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    /// Create a new assistant message
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }

    /// Create a new system message
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }
}

/// Sampling parameters for one completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Completion token budget
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl GenerationParams {
    /// Build parameters from a token budget and temperature
    #[must_use]
    pub const fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }
}

/// Interface for all LLM providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a chat completion
    async fn chat_completion(
        &self,
        system_prompt: &str,
        history: &[Message],
        user_message: &str,
        model_id: &str,
        params: GenerationParams,
    ) -> Result<String, LlmError>;
}

/// Retry settings for [`LlmClient::complete`]
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: usize,
    /// Base delay for exponential backoff
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: LLM_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(LLM_INITIAL_BACKOFF_MS),
        }
    }
}

/// Client wrapping one provider with timeout and retry
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    retry: RetryPolicy,
    timeout: Duration,
    max_tokens: u32,
}

impl LlmClient {
    /// Create a client backed by the OpenAI-compatible provider in `settings`
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingConfig` if no API key is configured.
    pub fn new(settings: &AgentSettings) -> Result<Self, LlmError> {
        let api_key = settings
            .openai_api_key
            .as_ref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingConfig("OPENAI_API_KEY".to_string()))?;

        let provider =
            providers::OpenAiProvider::new(api_key.clone(), settings.openai_api_base.clone());

        Ok(Self::with_provider(
            Arc::new(provider),
            settings.openai_model.clone(),
        )
        .with_timeout(settings.request_timeout())
        .with_max_tokens(settings.openai_max_tokens))
    }

    /// Create a client around any provider (used for tests and custom backends)
    #[must_use]
    pub fn with_provider(provider: Arc<dyn LlmProvider>, model: String) -> Self {
        let defaults = AgentSettings::default();
        Self {
            provider,
            model,
            retry: RetryPolicy::default(),
            timeout: defaults.request_timeout(),
            max_tokens: defaults.openai_max_tokens,
        }
    }

    /// Override the retry policy
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the per-attempt timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Upper bound on the completion budget of every request
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Model identifier sent with every request
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Perform a chat completion with timeout and retry on transient errors
    ///
    /// # Errors
    ///
    /// Returns the provider error once it is not retryable or attempts run out,
    /// or `LlmError::Timeout` when the last attempt exceeds the timeout.
    #[instrument(skip(self, system_prompt, history, user_message), fields(model = %self.model))]
    pub async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        user_message: &str,
        params: GenerationParams,
    ) -> Result<String, LlmError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let params = GenerationParams {
            max_tokens: params.max_tokens.min(self.max_tokens),
            ..params
        };
        trace!(
            system_prompt = system_prompt,
            history = ?history,
            user_message = user_message,
            "Full LLM Request"
        );

        let mut attempt = 1;
        loop {
            let start = std::time::Instant::now();
            let result = tokio::time::timeout(
                self.timeout,
                self.provider.chat_completion(
                    system_prompt,
                    history,
                    user_message,
                    &self.model,
                    params,
                ),
            )
            .await
            .unwrap_or(Err(LlmError::Timeout(self.timeout)));
            let duration = start.elapsed();

            let error = match result {
                Ok(resp) => {
                    if attempt > 1 {
                        info!(attempt, duration_ms = duration.as_millis(), "LLM retry succeeded");
                    }
                    debug!(
                        duration_ms = duration.as_millis(),
                        "Received success response from LLM"
                    );
                    trace!(response = ?resp, "Full LLM Response");
                    return Ok(resp);
                }
                Err(e) => e,
            };

            warn!(
                attempt,
                max_attempts,
                duration_ms = duration.as_millis(),
                error = %error,
                "LLM request failed"
            );

            let delay = (attempt < max_attempts)
                .then(|| get_retry_delay(&error, attempt, self.retry.initial_backoff))
                .flatten();
            let Some(backoff) = delay else {
                return Err(error);
            };

            info!(backoff_ms = backoff.as_millis(), attempt, "Retrying LLM request");
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

/// Delay before the next attempt, or `None` if the error is not retryable.
fn get_retry_delay(error: &LlmError, attempt: usize, initial: Duration) -> Option<Duration> {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
    let exponential = initial.saturating_mul(2u32.saturating_pow(exponent));

    match error {
        LlmError::RateLimit { wait_secs, .. } => {
            if let Some(secs) = wait_secs {
                return Some(Duration::from_secs(*secs + 1));
            }
            Some(exponential.saturating_mul(10))
        }
        LlmError::ApiError(msg) => {
            let msg_lower = msg.to_lowercase();
            if msg_lower.contains("429") {
                return Some(exponential.saturating_mul(10));
            }

            if ["500", "502", "503", "504", "timeout", "overloaded"]
                .iter()
                .any(|code| msg_lower.contains(code))
            {
                return Some(exponential);
            }
            None
        }
        LlmError::NetworkError(_) | LlmError::Timeout(_) => Some(exponential),
        _ => None,
    }
}
