#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use postpilot_core::agent::ImageAttachment;
use postpilot_core::llm::{GenerationParams, LlmClient, LlmError, LlmProvider, Message, RetryPolicy};
use postpilot_core::media::{EditedImage, ImageEditor, MediaError, ObjectStore, SourceImage, StoredObject};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider that answers by inspecting the system prompt.
///
/// Platform prompts start with "You are an expert <Platform> ...", so the reply
/// names the platform. Prompts containing any `fail_on` fragment fail.
#[derive(Default)]
pub struct ScriptedProvider {
    pub fail_on: Vec<&'static str>,
    pub label: Option<&'static str>,
    pub general_reply: Option<&'static str>,
    pub calls: AtomicUsize,
    pub user_messages: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, fragment: &'static str) -> Self {
        self.fail_on.push(fragment);
        self
    }

    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_general_reply(mut self, reply: &'static str) -> Self {
        self.general_reply = Some(reply);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat_completion(
        &self,
        system_prompt: &str,
        _history: &[Message],
        user_message: &str,
        _model_id: &str,
        _params: GenerationParams,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.user_messages
            .lock()
            .expect("lock")
            .push(user_message.to_string());

        if self.fail_on.iter().any(|f| system_prompt.contains(f)) {
            return Err(LlmError::ApiError("500 internal error".to_string()));
        }
        if system_prompt.contains("intent classifier") {
            return self
                .label
                .map(str::to_string)
                .ok_or_else(|| LlmError::ApiError("no label scripted".to_string()));
        }
        if system_prompt.contains("helpful AI assistant") {
            return Ok(self.general_reply.unwrap_or("Happy to help!").to_string());
        }

        let platform = system_prompt
            .strip_prefix("You are an expert ")
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or("unknown");
        Ok(format!("Post for {platform}: {user_message}"))
    }
}

pub fn client(provider: Arc<ScriptedProvider>) -> LlmClient {
    LlmClient::with_provider(provider, "test-model".to_string()).with_retry_policy(RetryPolicy {
        max_attempts: 1,
        initial_backoff: Duration::from_millis(1),
    })
}

/// Object store recording every upload
pub struct FakeStore {
    pub name: &'static str,
    pub fail: bool,
    pub uploads: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fail: false,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().expect("lock").len()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn upload(
        &self,
        _bytes: Bytes,
        file_name: &str,
        _mime: &str,
    ) -> Result<StoredObject, MediaError> {
        if self.fail {
            return Err(MediaError::Network("connection reset".to_string()));
        }
        self.uploads
            .lock()
            .expect("lock")
            .push(file_name.to_string());
        Ok(StoredObject {
            id: format!("{}-{file_name}", self.name),
            url: Some(format!("https://{}.example/{file_name}", self.name)),
            public: true,
        })
    }

    async fn download(&self, reference: &str) -> Result<Bytes, MediaError> {
        Err(MediaError::Api(format!("not stored: {reference}")))
    }
}

/// Editor that returns a fixed PNG or fails
pub struct FakeEditor {
    pub fail: bool,
    pub instructions: Mutex<Vec<String>>,
}

impl FakeEditor {
    pub fn new() -> Self {
        Self {
            fail: false,
            instructions: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl ImageEditor for FakeEditor {
    fn name(&self) -> &'static str {
        "fake-editor"
    }

    async fn edit(
        &self,
        _source: &SourceImage,
        instruction: &str,
    ) -> Result<EditedImage, MediaError> {
        self.instructions
            .lock()
            .expect("lock")
            .push(instruction.to_string());
        if self.fail {
            return Err(MediaError::Timeout("prediction still running".to_string()));
        }
        Ok(EditedImage {
            bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\nedited"),
            mime: "image/png".to_string(),
            origin_url: Some("https://replicate.example/out.png".to_string()),
        })
    }
}

pub fn photo() -> ImageAttachment {
    ImageAttachment {
        bytes: Bytes::from_static(b"\xFF\xD8\xFF\xE0source"),
        mime: "image/jpeg".to_string(),
        file_name: "photo.jpg".to_string(),
    }
}
