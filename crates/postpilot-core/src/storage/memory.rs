//! Process-local backend used when R2 is not configured, and in tests.

use super::{
    check_version_sequence, next_version_number, Conversation, ConversationStore, ImageVersion,
    StorageError, StoredMessage,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

struct ConversationRecord {
    conversation: Conversation,
    messages: Vec<StoredMessage>,
    versions: Vec<ImageVersion>,
}

#[derive(Default)]
struct Inner {
    index: HashMap<(i64, i64), Uuid>,
    records: HashMap<Uuid, ConversationRecord>,
}

/// In-memory conversation store; contents are lost on restart
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn find_conversation(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<Option<Conversation>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .index
            .get(&(user_id, chat_id))
            .and_then(|id| inner.records.get(id))
            .map(|record| record.conversation.clone()))
    }

    async fn get_or_create_conversation(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<Conversation, StorageError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .index
            .get(&(user_id, chat_id))
            .and_then(|id| inner.records.get(id))
            .map(|record| record.conversation.clone())
        {
            return Ok(existing);
        }

        let conversation = Conversation::new(user_id, chat_id);
        inner.index.insert((user_id, chat_id), conversation.id);
        inner.records.insert(
            conversation.id,
            ConversationRecord {
                conversation: conversation.clone(),
                messages: Vec::new(),
                versions: Vec::new(),
            },
        );
        Ok(conversation)
    }

    async fn append(
        &self,
        conversation_id: Uuid,
        message: StoredMessage,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(&conversation_id)
            .ok_or(StorageError::ConversationNotFound(conversation_id))?;
        record.messages.push(message);
        Ok(())
    }

    async fn history(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(&conversation_id)
            .map(|record| {
                let start = record.messages.len().saturating_sub(limit);
                record.messages[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn next_image_version(&self, conversation_id: Uuid) -> Result<u32, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(&conversation_id)
            .map_or(1, |record| next_version_number(&record.versions)))
    }

    async fn save_image_version(&self, version: ImageVersion) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(&version.conversation_id)
            .ok_or(StorageError::ConversationNotFound(version.conversation_id))?;
        check_version_sequence(&record.versions, &version)?;
        record.versions.push(version);
        Ok(())
    }

    async fn image_versions(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ImageVersion>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(&conversation_id)
            .map(|record| record.versions.clone())
            .unwrap_or_default())
    }

    async fn cascade_delete(&self, conversation_id: Uuid) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .remove(&conversation_id)
            .ok_or(StorageError::ConversationNotFound(conversation_id))?;
        inner
            .index
            .remove(&(record.conversation.user_id, record.conversation.chat_id));
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), String> {
        Ok(())
    }
}
