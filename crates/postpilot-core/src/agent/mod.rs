//! Agents
//!
//! The super agent classifies each turn and routes it to the post creator
//! (which fans out to platform agents), the image improver, or a direct reply.

/// Intent classification
pub mod classifier;
/// Image edit pipeline
pub mod image_improver;
/// Platform enumeration and detection
pub mod platform;
/// Per-platform post generation
pub mod platform_agents;
/// Concurrent multi-platform generation
pub mod post_creator;
/// Top-level router
pub mod super_agent;

pub use classifier::{Intent, IntentClassifier, LlmIntentClassifier, RuleBasedClassifier};
pub use image_improver::{ImageEditResult, ImageImprover, ImagePipelineError, PipelineStep};
pub use platform::{detect_platforms, Platform};
pub use platform_agents::{PlatformAgent, PlatformProfile, PostGenerator};
pub use post_creator::{PlatformOutcome, PlatformResults, PostCreator};
pub use super_agent::SuperAgent;

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::llm::LlmError;
use crate::storage::StorageError;

/// Orchestration-level failures
#[derive(Debug, Error)]
pub enum AgentError {
    /// The intent classifier could not produce a label
    #[error("Intent classification failed: {0}")]
    Classification(#[source] LlmError),
    /// A backend timed out, was unreachable or rejected the quota
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[source] LlmError),
    /// One platform agent failed
    #[error("{platform} generation failed: {source}")]
    PlatformGeneration {
        /// Platform whose generation failed
        platform: Platform,
        /// Underlying backend error
        #[source]
        source: LlmError,
    },
    /// One image pipeline step failed
    #[error(transparent)]
    ImagePipeline(#[from] ImagePipelineError),
    /// Conversation storage failed
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StorageError),
}

/// An image attached to a user turn
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    /// Raw image bytes
    pub bytes: Bytes,
    /// MIME type of `bytes`
    pub mime: String,
    /// Suggested file name
    pub file_name: String,
}

/// One inbound message as delivered by a transport
#[derive(Debug, Clone)]
pub struct UserTurn {
    /// Owning conversation
    pub conversation_id: Uuid,
    /// Transport user id
    pub user_id: i64,
    /// Message text or image caption
    pub text: Option<String>,
    /// Attached image
    pub image: Option<ImageAttachment>,
}

impl UserTurn {
    /// Trimmed text, `None` when absent or blank
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// What the transport shows the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantReply {
    /// Reply text (Markdown-style `**bold**` allowed)
    pub text: String,
    /// Public links of images produced during the turn
    pub media: Vec<String>,
}

impl AssistantReply {
    /// A text-only reply
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: Vec::new(),
        }
    }
}
