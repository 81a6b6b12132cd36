//! Image edit pipeline
//!
//! `UploadSource -> Transform -> UploadResult -> Persist -> Done`. Any step
//! failing moves the pipeline to `Failed` and skips the remaining steps.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::ImageAttachment;
use crate::config::AgentSettings;
use crate::media::{
    create_http_client, extension_for_mime, GoogleDriveStore, ImageEditor, ImgBbHost,
    ObjectStore, ReplicateEditor, SourceImage, StoredObject,
};
use crate::storage::{ConversationStore, ImageVersion};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    /// Archive the source image
    UploadSource,
    /// Apply the instruction through the editing backend
    Transform,
    /// Publish the edited image to public hosting
    UploadResult,
    /// Record the new image version
    Persist,
    /// Finished successfully
    Done,
    /// Stopped after a failed step
    Failed,
}

impl PipelineStep {
    /// The step that follows a successful `self`
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::UploadSource => Self::Transform,
            Self::Transform => Self::UploadResult,
            Self::UploadResult => Self::Persist,
            Self::Persist | Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    /// Short label used in logs
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::UploadSource => "upload_source",
            Self::Transform => "transform",
            Self::UploadResult => "upload_result",
            Self::Persist => "persist",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A pipeline stopped at `step`
#[derive(Debug, Error)]
#[error("image pipeline failed at {step}: {reason}")]
pub struct ImagePipelineError {
    /// Step that failed
    pub step: PipelineStep,
    /// Internal failure description, never shown to users
    pub reason: String,
}

impl ImagePipelineError {
    fn at(step: PipelineStep, reason: impl fmt::Display) -> Self {
        Self {
            step,
            reason: reason.to_string(),
        }
    }

    /// Generic message naming the failed stage
    #[must_use]
    pub fn user_message(&self) -> String {
        let stage = match self.step {
            PipelineStep::UploadSource => "uploading your image",
            PipelineStep::Transform => "transforming your image",
            PipelineStep::UploadResult => "hosting the edited image",
            PipelineStep::Persist => "saving the edited version",
            PipelineStep::Done | PipelineStep::Failed => "processing your image",
        };
        format!("❌ Image editing failed while {stage}. Please try again.")
    }
}

/// Outcome of a completed pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEditResult {
    /// Persisted version record
    pub version: ImageVersion,
    /// Public link of the edited image
    pub public_url: String,
}

/// Runs the edit pipeline against the configured backends
pub struct ImageImprover {
    source_store: Arc<dyn ObjectStore>,
    editor: Arc<dyn ImageEditor>,
    host: Arc<dyn ObjectStore>,
    store: Arc<dyn ConversationStore>,
}

impl ImageImprover {
    /// Assemble a pipeline from explicit backends
    #[must_use]
    pub fn new(
        source_store: Arc<dyn ObjectStore>,
        editor: Arc<dyn ImageEditor>,
        host: Arc<dyn ObjectStore>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            source_store,
            editor,
            host,
            store,
        }
    }

    /// Build from settings; `None` unless imageBB and Replicate are configured.
    ///
    /// Source images go to Google Drive when a token is set, otherwise to imageBB.
    #[must_use]
    pub fn from_settings(
        settings: &AgentSettings,
        store: Arc<dyn ConversationStore>,
    ) -> Option<Self> {
        if !settings.is_image_editing_enabled() {
            return None;
        }
        let imgbb_key = settings.imagebb_api_key.clone()?;
        let replicate_token = settings.replicate_api_token.clone()?;
        let http = create_http_client(settings.request_timeout());

        let host: Arc<dyn ObjectStore> = Arc::new(ImgBbHost::new(http.clone(), imgbb_key));
        let source_store: Arc<dyn ObjectStore> = match &settings.google_drive_access_token {
            Some(token) if settings.is_google_drive_enabled() => Arc::new(GoogleDriveStore::new(
                http.clone(),
                token.clone(),
                settings.google_drive_folder_id.clone(),
            )),
            _ => Arc::clone(&host),
        };
        let editor = Arc::new(ReplicateEditor::new(
            http,
            replicate_token,
            settings.replicate_model.clone(),
            settings.request_timeout(),
        ));

        Some(Self::new(source_store, editor, host, store))
    }

    /// Run the pipeline for one image and instruction
    ///
    /// # Errors
    ///
    /// Returns `ImagePipelineError` naming the step that failed. No version is
    /// recorded unless every earlier step succeeded.
    #[instrument(skip(self, image, instruction), fields(conversation_id = %conversation_id))]
    pub async fn improve(
        &self,
        image: &ImageAttachment,
        instruction: &str,
        conversation_id: Uuid,
    ) -> Result<ImageEditResult, ImagePipelineError> {
        let result = self.run(image, instruction, conversation_id).await;
        match &result {
            Ok(done) => info!(
                step = %PipelineStep::Done,
                version = done.version.version_number,
                "Image pipeline finished"
            ),
            Err(e) => error!(
                step = %e.step,
                state = %PipelineStep::Failed,
                reason = %e.reason,
                "Image pipeline failed"
            ),
        }
        result
    }

    async fn run(
        &self,
        image: &ImageAttachment,
        instruction: &str,
        conversation_id: Uuid,
    ) -> Result<ImageEditResult, ImagePipelineError> {
        let mut step = PipelineStep::UploadSource;
        info!(step = %step, backend = self.source_store.name(), "Pipeline step");
        let source_object = self
            .source_store
            .upload(image.bytes.clone(), &image.file_name, &image.mime)
            .await
            .map_err(|e| ImagePipelineError::at(step, e))?;

        step = step.next();
        info!(step = %step, backend = self.editor.name(), "Pipeline step");
        let source = SourceImage {
            object: source_object.clone(),
            bytes: image.bytes.clone(),
            mime: image.mime.clone(),
        };
        let edited = self
            .editor
            .edit(&source, instruction)
            .await
            .map_err(|e| ImagePipelineError::at(step, e))?;

        step = step.next();
        info!(step = %step, backend = self.host.name(), "Pipeline step");
        let file_name = format!(
            "edited-{}.{}",
            Uuid::new_v4(),
            extension_for_mime(&edited.mime)
        );
        let hosted = self
            .host
            .upload(edited.bytes.clone(), &file_name, &edited.mime)
            .await
            .map_err(|e| ImagePipelineError::at(step, e))?;
        let public_url = public_link(&hosted)
            .ok_or_else(|| ImagePipelineError::at(step, "hosting returned no public URL"))?;

        step = step.next();
        info!(step = %step, "Pipeline step");
        let version = self
            .persist(
                conversation_id,
                source_object,
                instruction,
                &public_url,
                edited.origin_url,
            )
            .await
            .map_err(|e| ImagePipelineError::at(step, e))?;

        Ok(ImageEditResult {
            version,
            public_url,
        })
    }

    async fn persist(
        &self,
        conversation_id: Uuid,
        source: StoredObject,
        instruction: &str,
        public_url: &str,
        editor_output_url: Option<String>,
    ) -> Result<ImageVersion, crate::storage::StorageError> {
        let version_number = self.store.next_image_version(conversation_id).await?;
        let version = ImageVersion {
            conversation_id,
            version_number,
            source_ref: source.id,
            source_url: source.url,
            instruction: instruction.to_string(),
            result_url: public_url.to_string(),
            editor_output_url,
            created_at: Utc::now(),
        };
        self.store.save_image_version(version.clone()).await?;
        Ok(version)
    }
}

fn public_link(object: &StoredObject) -> Option<String> {
    object
        .url
        .clone()
        .or_else(|| object.id.starts_with("http").then(|| object.id.clone()))
}
