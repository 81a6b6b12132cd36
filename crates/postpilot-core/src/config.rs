//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! generation constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which intent classifier the super agent uses.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// Prompt-engineered classification through the LLM backend.
    #[default]
    Llm,
    /// Deterministic keyword rules, no backend call.
    Rules,
}

/// Core settings loaded from environment variables and config files
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentSettings {
    /// Application display name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// `OpenAI` API key
    pub openai_api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API (defaults to api.openai.com)
    pub openai_api_base: Option<String>,
    /// Chat model identifier
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Default sampling temperature
    #[serde(default = "default_openai_temperature")]
    pub openai_temperature: f32,
    /// Upper bound on any completion's token budget
    #[serde(default = "default_openai_max_tokens")]
    pub openai_max_tokens: u32,

    /// Per-request timeout for backend calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Number of history messages fetched per turn
    #[serde(default = "default_max_conversation_history")]
    pub max_conversation_history: usize,
    /// Largest accepted image upload in megabytes
    #[serde(default = "default_max_image_size_mb")]
    pub max_image_size_mb: u64,
    /// Intent classifier selection
    #[serde(default)]
    pub intent_classifier: ClassifierKind,

    /// Google Drive OAuth access token for archiving source images
    pub google_drive_access_token: Option<String>,
    /// Google Drive folder receiving source images
    pub google_drive_folder_id: Option<String>,
    /// imageBB API key (public image hosting)
    pub imagebb_api_key: Option<String>,
    /// Replicate API token (image editing)
    pub replicate_api_token: Option<String>,
    /// Replicate model used for instruction-based edits
    #[serde(default = "default_replicate_model")]
    pub replicate_model: String,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,
}

fn default_app_name() -> String {
    "AI Social Media System".to_string()
}

fn default_openai_model() -> String {
    "gpt-4-turbo-preview".to_string()
}

const fn default_openai_temperature() -> f32 {
    0.7
}

const fn default_openai_max_tokens() -> u32 {
    800
}

const fn default_request_timeout_secs() -> u64 {
    300
}

const fn default_max_conversation_history() -> usize {
    10
}

const fn default_max_image_size_mb() -> u64 {
    10
}

fn default_replicate_model() -> String {
    "black-forest-labs/flux-kontext-pro".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            openai_api_key: None,
            openai_api_base: None,
            openai_model: default_openai_model(),
            openai_temperature: default_openai_temperature(),
            openai_max_tokens: default_openai_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            max_conversation_history: default_max_conversation_history(),
            max_image_size_mb: default_max_image_size_mb(),
            intent_classifier: ClassifierKind::default(),
            google_drive_access_token: None,
            google_drive_folder_id: None,
            imagebb_api_key: None,
            replicate_api_token: None,
            replicate_model: default_replicate_model(),
            r2_access_key_id: None,
            r2_secret_access_key: None,
            r2_endpoint_url: None,
            r2_bucket_name: None,
        }
    }
}

/// Build the layered configuration source shared by core and transports.
///
/// Order: `config/default`, `config/{RUN_MODE}`, `config/local`, `APP__*`
/// variables, then bare environment variables. Empty variables count as unset.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl AgentSettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a value is out of range.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check numeric settings against their accepted ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.openai_temperature) {
            return Err(ConfigError::Message(
                "openai_temperature must be within 0.0..=2.0".into(),
            ));
        }
        if !(1..=4000).contains(&self.openai_max_tokens) {
            return Err(ConfigError::Message(
                "openai_max_tokens must be within 1..=4000".into(),
            ));
        }
        if !(30..=600).contains(&self.request_timeout_secs) {
            return Err(ConfigError::Message(
                "request_timeout_secs must be within 30..=600".into(),
            ));
        }
        if !(1..=50).contains(&self.max_conversation_history) {
            return Err(ConfigError::Message(
                "max_conversation_history must be within 1..=50".into(),
            ));
        }
        if !(1..=50).contains(&self.max_image_size_mb) {
            return Err(ConfigError::Message(
                "max_image_size_mb must be within 1..=50".into(),
            ));
        }
        Ok(())
    }

    /// Image editing needs both the public host and the editing backend.
    #[must_use]
    pub fn is_image_editing_enabled(&self) -> bool {
        is_set(self.imagebb_api_key.as_ref()) && is_set(self.replicate_api_token.as_ref())
    }

    /// Source images are archived to Drive only when a token is configured.
    #[must_use]
    pub fn is_google_drive_enabled(&self) -> bool {
        is_set(self.google_drive_access_token.as_ref())
    }

    /// Conversations persist to R2 only when every credential is present.
    #[must_use]
    pub fn is_r2_enabled(&self) -> bool {
        is_set(self.r2_endpoint_url.as_ref())
            && is_set(self.r2_access_key_id.as_ref())
            && is_set(self.r2_secret_access_key.as_ref())
            && is_set(self.r2_bucket_name.as_ref())
    }

    /// Backend request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Largest accepted image in bytes.
    #[must_use]
    pub const fn max_image_size_bytes(&self) -> u64 {
        self.max_image_size_mb * 1024 * 1024
    }
}

fn is_set(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

// Generation parameters
/// Hard character limit for X posts
pub const X_MAX_CHARS: usize = 280;
/// History messages forwarded to a platform agent
pub const PLATFORM_HISTORY_WINDOW: usize = 3;
/// History messages forwarded to the general chat reply
pub const GENERAL_HISTORY_WINDOW: usize = 5;
/// History messages forwarded to the intent classifier
pub const CLASSIFIER_HISTORY_WINDOW: usize = 3;
/// Token budget for classification calls
pub const CLASSIFIER_MAX_TOKENS: u32 = 20;
/// Token budget for general chat replies
pub const GENERAL_MAX_TOKENS: u32 = 500;

// LLM retry policy
/// Attempts per LLM request (first try included)
pub const LLM_MAX_ATTEMPTS: usize = 3;
/// Initial backoff between LLM attempts
pub const LLM_INITIAL_BACKOFF_MS: u64 = 1000;

// Transport retry policy (Telegram file download, media fetches)
/// Initial delay for transport retries
pub const TRANSPORT_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum delay for transport retries
pub const TRANSPORT_MAX_BACKOFF_MS: u64 = 4000;
/// Number of transport retries
pub const TRANSPORT_MAX_RETRIES: usize = 3;

// Image pipeline
/// Seconds Replicate may hold the create request open (`Prefer: wait`)
pub const REPLICATE_WAIT_SECS: u64 = 60;
/// Interval between prediction status polls
pub const REPLICATE_POLL_INTERVAL_MS: u64 = 2000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = AgentSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_conversation_history, 10);
        assert_eq!(settings.intent_classifier, ClassifierKind::Llm);
        assert!(!settings.is_image_editing_enabled());
        assert!(!settings.is_r2_enabled());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let settings = AgentSettings {
            openai_temperature: 2.5,
            ..AgentSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = AgentSettings {
            max_conversation_history: 0,
            ..AgentSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = AgentSettings {
            request_timeout_secs: 10,
            ..AgentSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_image_editing_requires_both_keys() {
        let mut settings = AgentSettings {
            imagebb_api_key: Some("key".to_string()),
            ..AgentSettings::default()
        };
        assert!(!settings.is_image_editing_enabled());

        settings.replicate_api_token = Some("   ".to_string());
        assert!(!settings.is_image_editing_enabled());

        settings.replicate_api_token = Some("r8_token".to_string());
        assert!(settings.is_image_editing_enabled());
    }

    #[test]
    fn test_classifier_kind_deserializes_lowercase() -> Result<(), Box<dyn std::error::Error>> {
        let kind: ClassifierKind = serde_json::from_str("\"rules\"")?;
        assert_eq!(kind, ClassifierKind::Rules);
        Ok(())
    }
}
