//! Cloudflare R2 / AWS S3 backend.
//!
//! Each conversation is three JSON objects (meta, messages, image versions)
//! plus an index object per (user, chat). Reads go through a moka cache.

use super::{
    check_version_sequence, conversation_images_key, conversation_index_key,
    conversation_messages_key, conversation_meta_key, next_version_number, Conversation,
    ConversationStore, ImageVersion, StorageError, StoredMessage,
};
use crate::config::AgentSettings;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// R2-backed conversation store
pub struct R2Storage {
    client: Client,
    bucket: String,
    cache: Cache<String, Arc<Vec<u8>>>,
}

impl R2Storage {
    /// Create a new R2 storage instance
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &AgentSettings) -> Result<Self, StorageError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-storage");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(60 * 60))
            .time_to_idle(Duration::from_secs(30 * 60))
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.clone(),
            cache,
        })
    }

    /// Save data as JSON to R2 (write-through cache)
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization or S3 upload fails.
    pub async fn save_json<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        let body_bytes = serde_json::to_string_pretty(data)?.into_bytes();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body_bytes.clone()))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        self.cache.insert(key.to_string(), Arc::new(body_bytes)).await;
        Ok(())
    }

    /// Load data from JSON in R2; a missing key is `None`
    ///
    /// # Errors
    ///
    /// Returns an error if S3 download or JSON deserialization fails.
    pub async fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        if let Some(cached_data) = self.cache.get(key).await {
            match serde_json::from_slice(&cached_data) {
                Ok(data) => return Ok(Some(data)),
                Err(e) => {
                    warn!("Cache deserialization failed for {}: {}", key, e);
                    self.cache.invalidate(key).await;
                }
            }
        }

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
                    .into_bytes();

                self.cache
                    .insert(key.to_string(), Arc::new(data.to_vec()))
                    .await;

                Ok(Some(serde_json::from_slice(&data)?))
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => Ok(None),
            Err(e) => Err(StorageError::S3Get(Box::new(e))),
        }
    }

    /// Delete object from R2
    ///
    /// # Errors
    ///
    /// Returns an error if S3 deletion fails.
    pub async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.cache.invalidate(key).await;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        Ok(())
    }

    async fn load_conversation(&self, conversation_id: Uuid) -> Result<Conversation, StorageError> {
        self.load_json(&conversation_meta_key(conversation_id))
            .await?
            .ok_or(StorageError::ConversationNotFound(conversation_id))
    }
}

#[async_trait]
impl ConversationStore for R2Storage {
    async fn find_conversation(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<Option<Conversation>, StorageError> {
        self.load_json(&conversation_index_key(user_id, chat_id))
            .await
    }

    async fn get_or_create_conversation(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<Conversation, StorageError> {
        if let Some(existing) = self.find_conversation(user_id, chat_id).await? {
            return Ok(existing);
        }

        let conversation = Conversation::new(user_id, chat_id);
        self.save_json(&conversation_meta_key(conversation.id), &conversation)
            .await?;
        self.save_json(&conversation_index_key(user_id, chat_id), &conversation)
            .await?;
        info!(conversation_id = %conversation.id, user_id, chat_id, "Created conversation");
        Ok(conversation)
    }

    async fn append(
        &self,
        conversation_id: Uuid,
        message: StoredMessage,
    ) -> Result<(), StorageError> {
        self.load_conversation(conversation_id).await?;
        let key = conversation_messages_key(conversation_id);
        let mut messages: Vec<StoredMessage> = self.load_json(&key).await?.unwrap_or_default();
        messages.push(message);
        self.save_json(&key, &messages).await
    }

    async fn history(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        let mut messages: Vec<StoredMessage> = self
            .load_json(&conversation_messages_key(conversation_id))
            .await?
            .unwrap_or_default();
        let start = messages.len().saturating_sub(limit);
        Ok(messages.split_off(start))
    }

    async fn next_image_version(&self, conversation_id: Uuid) -> Result<u32, StorageError> {
        let versions = self.image_versions(conversation_id).await?;
        Ok(next_version_number(&versions))
    }

    async fn save_image_version(&self, version: ImageVersion) -> Result<(), StorageError> {
        self.load_conversation(version.conversation_id).await?;
        let key = conversation_images_key(version.conversation_id);
        let mut versions: Vec<ImageVersion> = self.load_json(&key).await?.unwrap_or_default();
        check_version_sequence(&versions, &version)?;
        debug!(
            conversation_id = %version.conversation_id,
            version = version.version_number,
            "Saving image version"
        );
        versions.push(version);
        self.save_json(&key, &versions).await
    }

    async fn image_versions(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ImageVersion>, StorageError> {
        let mut versions: Vec<ImageVersion> = self
            .load_json(&conversation_images_key(conversation_id))
            .await?
            .unwrap_or_default();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn cascade_delete(&self, conversation_id: Uuid) -> Result<(), StorageError> {
        let conversation = self.load_conversation(conversation_id).await?;
        self.delete_object(&conversation_images_key(conversation_id))
            .await?;
        self.delete_object(&conversation_messages_key(conversation_id))
            .await?;
        self.delete_object(&conversation_index_key(
            conversation.user_id,
            conversation.chat_id,
        ))
        .await?;
        self.delete_object(&conversation_meta_key(conversation_id))
            .await?;
        info!(conversation_id = %conversation_id, "Deleted conversation");
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), String> {
        match self.client.list_buckets().send().await {
            Ok(_) => {
                info!("Successfully connected to R2 storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}
