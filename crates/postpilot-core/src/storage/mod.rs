//! Conversation persistence
//!
//! Conversations, their messages and image versions, behind one
//! [`ConversationStore`] trait with an R2/S3 backend and an in-memory backend.

mod memory;
mod r2;

pub use memory::InMemoryStore;
pub use r2::R2Storage;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::llm::Message;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error retrieving object from S3
    #[error("S3 Get error: {0}")]
    S3Get(Box<SdkError<GetObjectError>>),
    /// Error putting or deleting an object in S3
    #[error("S3 put error: {0}")]
    S3Put(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error (missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
    /// The referenced conversation does not exist
    #[error("Conversation {0} not found")]
    ConversationNotFound(Uuid),
    /// An image version was written out of sequence
    #[error("Image version conflict: expected {expected}, got {actual}")]
    VersionConflict {
        /// The only acceptable next version number
        expected: u32,
        /// The version number that was submitted
        actual: u32,
    },
}

/// One user's ongoing session in one chat
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Conversation identifier
    pub id: Uuid,
    /// Transport user identifier
    pub user_id: i64,
    /// Transport chat identifier
    pub chat_id: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Start a new conversation for a (user, chat) pair
    #[must_use]
    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            chat_id,
            created_at: Utc::now(),
        }
    }
}

/// Author of a stored message
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The human side of the conversation
    User,
    /// The bot's reply
    Assistant,
}

/// Text and/or image reference carried by a message
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    /// Message text or image caption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Reference to an attached or produced image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// One immutable turn in a conversation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Owning conversation
    pub conversation_id: Uuid,
    /// Author
    pub role: MessageRole,
    /// Payload
    pub content: MessageContent,
    /// Write time
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// A user turn with optional text and image reference
    #[must_use]
    pub fn user(conversation_id: Uuid, text: Option<String>, image: Option<String>) -> Self {
        Self {
            conversation_id,
            role: MessageRole::User,
            content: MessageContent { text, image },
            created_at: Utc::now(),
        }
    }

    /// An assistant reply
    #[must_use]
    pub fn assistant(conversation_id: Uuid, text: String) -> Self {
        Self {
            conversation_id,
            role: MessageRole::Assistant,
            content: MessageContent {
                text: Some(text),
                image: None,
            },
            created_at: Utc::now(),
        }
    }

    /// Convert to an LLM history entry
    #[must_use]
    pub fn to_llm_message(&self) -> Message {
        let text = match (&self.content.text, &self.content.image) {
            (Some(text), _) => text.clone(),
            (None, Some(_)) => "[image]".to_string(),
            (None, None) => String::new(),
        };
        match self.role {
            MessageRole::User => Message::user(&text),
            MessageRole::Assistant => Message::assistant(&text),
        }
    }
}

/// A persisted record of one successful image edit
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ImageVersion {
    /// Owning conversation
    pub conversation_id: Uuid,
    /// Sequential version, starting at 1
    pub version_number: u32,
    /// Durable reference of the source image
    pub source_ref: String,
    /// Viewable link of the source image, when the store provides one
    pub source_url: Option<String>,
    /// Edit instruction
    pub instruction: String,
    /// Public URL of the edited image
    pub result_url: String,
    /// URL the editing backend produced the image at
    pub editor_output_url: Option<String>,
    /// Write time
    pub created_at: DateTime<Utc>,
}

/// Version number following the highest in `versions` (1 for none)
#[must_use]
pub fn next_version_number(versions: &[ImageVersion]) -> u32 {
    versions
        .iter()
        .map(|v| v.version_number)
        .max()
        .unwrap_or(0)
        + 1
}

/// Reject a version that is not exactly `max(existing) + 1`
///
/// # Errors
///
/// Returns `StorageError::VersionConflict` with the expected number.
pub fn check_version_sequence(
    existing: &[ImageVersion],
    version: &ImageVersion,
) -> Result<(), StorageError> {
    let expected = next_version_number(existing);
    if version.version_number == expected {
        Ok(())
    } else {
        Err(StorageError::VersionConflict {
            expected,
            actual: version.version_number,
        })
    }
}

/// Interface for conversation persistence backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Find the conversation for a (user, chat) pair, if any
    async fn find_conversation(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<Option<Conversation>, StorageError>;
    /// Return the conversation for a (user, chat) pair, creating it on first use
    async fn get_or_create_conversation(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<Conversation, StorageError>;
    /// Append a message to the end of a conversation
    async fn append(
        &self,
        conversation_id: Uuid,
        message: StoredMessage,
    ) -> Result<(), StorageError>;
    /// The latest `limit` messages, oldest first
    async fn history(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError>;
    /// Version number the next image edit will receive
    async fn next_image_version(&self, conversation_id: Uuid) -> Result<u32, StorageError>;
    /// Write an image version; must be exactly `max(existing) + 1`
    async fn save_image_version(&self, version: ImageVersion) -> Result<(), StorageError>;
    /// All image versions of a conversation in version order
    async fn image_versions(&self, conversation_id: Uuid)
        -> Result<Vec<ImageVersion>, StorageError>;
    /// Delete a conversation with its messages and image versions
    async fn cascade_delete(&self, conversation_id: Uuid) -> Result<(), StorageError>;
    /// Check connection to storage
    async fn check_connection(&self) -> Result<(), String>;
}

/// Returns the key mapping a (user, chat) pair to its conversation
#[must_use]
pub fn conversation_index_key(user_id: i64, chat_id: i64) -> String {
    format!("users/{user_id}/chats/{chat_id}/conversation.json")
}

/// Returns the key of a conversation's metadata
#[must_use]
pub fn conversation_meta_key(conversation_id: Uuid) -> String {
    format!("conversations/{conversation_id}/meta.json")
}

/// Returns the key of a conversation's message log
#[must_use]
pub fn conversation_messages_key(conversation_id: Uuid) -> String {
    format!("conversations/{conversation_id}/messages.json")
}

/// Returns the key of a conversation's image versions
#[must_use]
pub fn conversation_images_key(conversation_id: Uuid) -> String {
    format!("conversations/{conversation_id}/image_versions.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(conversation_id: Uuid, n: u32) -> ImageVersion {
        ImageVersion {
            conversation_id,
            version_number: n,
            source_ref: format!("src-{n}"),
            source_url: None,
            instruction: "brighten".to_string(),
            result_url: format!("https://i.ibb.co/{n}.png"),
            editor_output_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_next_version_number() {
        let id = Uuid::new_v4();
        assert_eq!(next_version_number(&[]), 1);
        assert_eq!(next_version_number(&[version(id, 1), version(id, 2)]), 3);
    }

    #[test]
    fn test_check_version_sequence_rejects_gaps() {
        let id = Uuid::new_v4();
        let existing = vec![version(id, 1)];
        assert!(check_version_sequence(&existing, &version(id, 2)).is_ok());
        assert!(matches!(
            check_version_sequence(&existing, &version(id, 3)),
            Err(StorageError::VersionConflict {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_image_only_message_converts_to_placeholder() {
        let msg = StoredMessage::user(Uuid::new_v4(), None, Some("file-1".to_string()));
        assert_eq!(msg.to_llm_message(), Message::user("[image]"));
    }
}
