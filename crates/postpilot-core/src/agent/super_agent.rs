//! Top-level router
//!
//! Loads history, records the user turn, classifies it and dispatches to the
//! post creator, the image improver or a direct reply. The reply is persisted
//! before it is returned. Internal failures surface as one fixed message.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::classifier::mentions_image_edit;
use super::{
    AgentError, AssistantReply, ImageAttachment, ImageImprover, Intent, IntentClassifier,
    LlmIntentClassifier, PostCreator, RuleBasedClassifier, UserTurn,
};
use crate::config::{AgentSettings, ClassifierKind, GENERAL_HISTORY_WINDOW, GENERAL_MAX_TOKENS};
use crate::llm::{GenerationParams, LlmClient, LlmError, Message};
use crate::storage::{ConversationStore, StoredMessage};

/// Reply for any internal failure
pub const ERROR_MESSAGE: &str = "❌ Sorry, I encountered an error. Please try again.";

/// Reply for an image without a caption
pub const IMAGE_INSTRUCTIONS_MESSAGE: &str =
    "📸 I received your image! What would you like me to do with it?\n\n\
You can:\n\
• Edit the image: 'Change the text to...', 'Make the background blue'\n\
• Create a post: 'Write a LinkedIn post about this image'\n\
• Both: 'Add a logo and create an Instagram post'";

/// Reply for an edit request that came without an image
pub const IMAGE_UPLOAD_REQUIRED_MESSAGE: &str =
    "📸 To edit an image, please upload an image along with your instructions.\n\n\
For example, upload a photo and add a caption like:\n\
• 'Change the text to Hello World'\n\
• 'Make the background blue'\n\
• 'Add a second dog to this image'";

/// Reply when an edit is requested but no editing backend is configured
pub const IMAGE_EDITING_UNAVAILABLE_MESSAGE: &str =
    "🎨 Image editing requires additional configuration.\n\n\
To enable image editing, please configure:\n\
• IMAGEBB_API_KEY\n\
• REPLICATE_API_TOKEN\n\n\
I can still help you create posts about your image!";

const GENERAL_PROMPT: &str = "You are a helpful AI assistant for a social media automation system.

You help users create social media content and edit images. Be friendly and guide them
on how to use the system effectively.

Your capabilities:
- Create posts for X (Twitter), LinkedIn, Instagram, YouTube, and School
- Edit images with AI
- Generate multi-platform content simultaneously

Keep responses concise and helpful.";

/// Central orchestrator for every user turn
pub struct SuperAgent {
    store: Arc<dyn ConversationStore>,
    classifier: Arc<dyn IntentClassifier>,
    post_creator: PostCreator,
    image_improver: Option<ImageImprover>,
    llm: LlmClient,
    history_limit: usize,
    temperature: f32,
}

impl SuperAgent {
    /// Assemble an agent without image editing
    #[must_use]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        classifier: Arc<dyn IntentClassifier>,
        post_creator: PostCreator,
        llm: LlmClient,
    ) -> Self {
        let defaults = AgentSettings::default();
        Self {
            store,
            classifier,
            post_creator,
            image_improver: None,
            llm,
            history_limit: defaults.max_conversation_history,
            temperature: defaults.openai_temperature,
        }
    }

    /// Build every collaborator from `settings`
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingConfig` when no LLM API key is configured.
    pub fn from_settings(
        settings: &AgentSettings,
        store: Arc<dyn ConversationStore>,
    ) -> Result<Self, LlmError> {
        let llm = LlmClient::new(settings)?;
        let classifier: Arc<dyn IntentClassifier> = match settings.intent_classifier {
            ClassifierKind::Llm => Arc::new(LlmIntentClassifier::new(llm.clone())),
            ClassifierKind::Rules => Arc::new(RuleBasedClassifier),
        };
        let improver = ImageImprover::from_settings(settings, Arc::clone(&store));
        if improver.is_none() {
            warn!("Image editing disabled: IMAGEBB_API_KEY or REPLICATE_API_TOKEN missing");
        }

        let agent = Self::new(store, classifier, PostCreator::from_llm(&llm), llm)
            .with_history_limit(settings.max_conversation_history)
            .with_temperature(settings.openai_temperature);
        Ok(match improver {
            Some(improver) => agent.with_image_improver(improver),
            None => agent,
        })
    }

    /// Enable the image edit pipeline
    #[must_use]
    pub fn with_image_improver(mut self, improver: ImageImprover) -> Self {
        self.image_improver = Some(improver);
        self
    }

    /// Number of history messages fetched per turn
    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sampling temperature for general chat
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// True when image edits can be served
    #[must_use]
    pub const fn image_editing_enabled(&self) -> bool {
        self.image_improver.is_some()
    }

    /// Handle one user turn. Never fails: internal errors are logged and
    /// answered with [`ERROR_MESSAGE`]. The error reply is persisted only
    /// once the user message it answers has been recorded.
    #[instrument(skip(self, turn), fields(conversation_id = %turn.conversation_id, user_id = turn.user_id))]
    pub async fn handle(&self, turn: UserTurn) -> AssistantReply {
        let history = match self.open_turn(&turn).await {
            Ok(history) => history,
            Err(e) => {
                error!(error = %e, "Turn could not be recorded");
                return AssistantReply::text(ERROR_MESSAGE);
            }
        };

        match self.process(&turn, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "Turn failed");
                let reply = AssistantReply::text(ERROR_MESSAGE);
                if let Err(e) = self.record_reply(turn.conversation_id, &reply).await {
                    warn!(error = %e, "Could not persist error reply");
                }
                reply
            }
        }
    }

    /// Load prior history, then record the user message
    async fn open_turn(&self, turn: &UserTurn) -> Result<Vec<Message>, AgentError> {
        let history = self
            .store
            .history(turn.conversation_id, self.history_limit)
            .await?
            .iter()
            .map(StoredMessage::to_llm_message)
            .collect();

        let user_message = StoredMessage::user(
            turn.conversation_id,
            turn.text().map(str::to_string),
            turn.image.as_ref().map(|image| image.file_name.clone()),
        );
        self.store.append(turn.conversation_id, user_message).await?;
        Ok(history)
    }

    async fn process(
        &self,
        turn: &UserTurn,
        history: &[Message],
    ) -> Result<AssistantReply, AgentError> {
        let reply = match (turn.text(), turn.image.as_ref()) {
            (None, Some(_)) => AssistantReply::text(IMAGE_INSTRUCTIONS_MESSAGE),
            (None, None) => AssistantReply::text(ERROR_MESSAGE),
            (Some(text), image) => {
                self.route(turn.conversation_id, text, image, history)
                    .await?
            }
        };

        if let Err(e) = self.record_reply(turn.conversation_id, &reply).await {
            debug!(reply = %reply.text, "Generated reply was not persisted");
            return Err(e);
        }
        Ok(reply)
    }

    async fn route(
        &self,
        conversation_id: Uuid,
        text: &str,
        image: Option<&ImageAttachment>,
        history: &[Message],
    ) -> Result<AssistantReply, AgentError> {
        let intent = self.classifier.classify(text, image.is_some(), history).await?;
        info!(intent = %intent, "Routing turn");

        match (intent, image) {
            (Intent::PostOnly, Some(_)) => {
                Ok(self.create_posts(&image_context(text), history).await)
            }
            (Intent::EditOnly, Some(image)) => {
                Ok(self.edit_image(image, text, conversation_id).await)
            }
            (Intent::Both, Some(image)) => {
                let context = image_context(text);
                let (edit, posts) = tokio::join!(
                    self.edit_image(image, text, conversation_id),
                    self.create_posts(&context, history)
                );
                Ok(AssistantReply {
                    text: format!("{}\n\n{}", edit.text, posts.text),
                    media: edit.media,
                })
            }
            (Intent::CreatePost, _) => Ok(self.create_posts(text, history).await),
            (_, None) if mentions_image_edit(text) => {
                Ok(AssistantReply::text(IMAGE_UPLOAD_REQUIRED_MESSAGE))
            }
            _ => self.general(text, history).await,
        }
    }

    async fn create_posts(&self, prompt: &str, history: &[Message]) -> AssistantReply {
        let results = self.post_creator.create(prompt, history).await;
        if results.is_empty() {
            return AssistantReply::text(super::post_creator::NO_PLATFORM_MESSAGE);
        }
        AssistantReply::text(results.render())
    }

    async fn edit_image(
        &self,
        image: &ImageAttachment,
        instruction: &str,
        conversation_id: Uuid,
    ) -> AssistantReply {
        let Some(improver) = &self.image_improver else {
            return AssistantReply::text(IMAGE_EDITING_UNAVAILABLE_MESSAGE);
        };

        match improver.improve(image, instruction, conversation_id).await {
            Ok(done) => AssistantReply {
                text: format!("✅ Image edited (version {})", done.version.version_number),
                media: vec![done.public_url],
            },
            Err(e) => AssistantReply::text(e.user_message()),
        }
    }

    async fn general(
        &self,
        text: &str,
        history: &[Message],
    ) -> Result<AssistantReply, AgentError> {
        let start = history.len().saturating_sub(GENERAL_HISTORY_WINDOW);
        let answer = self
            .llm
            .complete(
                GENERAL_PROMPT,
                &history[start..],
                text,
                GenerationParams::new(GENERAL_MAX_TOKENS, self.temperature),
            )
            .await
            .map_err(AgentError::BackendUnavailable)?;
        Ok(AssistantReply::text(answer))
    }

    async fn record_reply(
        &self,
        conversation_id: Uuid,
        reply: &AssistantReply,
    ) -> Result<(), AgentError> {
        let mut text = reply.text.clone();
        for url in &reply.media {
            text.push('\n');
            text.push_str(url);
        }
        self.store
            .append(conversation_id, StoredMessage::assistant(conversation_id, text))
            .await?;
        Ok(())
    }
}

fn image_context(caption: &str) -> String {
    format!("User uploaded an image and wants: {caption}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmProvider;
    use crate::storage::{MessageRole, MockConversationStore, StorageError};
    use crate::testing::{mock_llm_simple, mock_store_noop};

    fn agent(store: MockConversationStore, llm: LlmClient) -> SuperAgent {
        SuperAgent::new(
            Arc::new(store),
            Arc::new(RuleBasedClassifier),
            PostCreator::from_llm(&llm),
            llm,
        )
    }

    fn text_turn(text: &str) -> UserTurn {
        UserTurn {
            conversation_id: Uuid::new_v4(),
            user_id: 1,
            text: Some(text.to_string()),
            image: None,
        }
    }

    #[tokio::test]
    async fn test_general_chat_uses_backend() {
        let reply = agent(mock_store_noop(), mock_llm_simple("Hi there"))
            .handle(text_turn("How are you?"))
            .await;
        assert_eq!(reply, AssistantReply::text("Hi there"));
    }

    #[tokio::test]
    async fn test_edit_request_without_image_asks_for_upload() {
        let reply = agent(mock_store_noop(), mock_llm_simple("unused"))
            .handle(text_turn("Please remove the background from my photo"))
            .await;
        assert_eq!(reply.text, IMAGE_UPLOAD_REQUIRED_MESSAGE);
    }

    #[tokio::test]
    async fn test_post_without_platform_asks_which() {
        let reply = agent(mock_store_noop(), mock_llm_simple("unused"))
            .handle(text_turn("Create a post about AI automation"))
            .await;
        assert_eq!(reply.text, super::super::post_creator::NO_PLATFORM_MESSAGE);
    }

    #[tokio::test]
    async fn test_caption_less_image_gets_guidance() {
        let mut turn = text_turn("   ");
        turn.image = Some(ImageAttachment {
            bytes: bytes::Bytes::from_static(b"\x89PNG"),
            mime: "image/png".to_string(),
            file_name: "photo.png".to_string(),
        });
        let reply = agent(mock_store_noop(), mock_llm_simple("unused"))
            .handle(turn)
            .await;
        assert_eq!(reply.text, IMAGE_INSTRUCTIONS_MESSAGE);
    }

    #[tokio::test]
    async fn test_edit_without_backends_explains_configuration() {
        let mut turn = text_turn("Change the text to Hello World");
        turn.image = Some(ImageAttachment {
            bytes: bytes::Bytes::from_static(b"\xFF\xD8\xFF"),
            mime: "image/jpeg".to_string(),
            file_name: "photo.jpg".to_string(),
        });
        let reply = agent(mock_store_noop(), mock_llm_simple("unused"))
            .handle(turn)
            .await;
        assert_eq!(reply.text, IMAGE_EDITING_UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn test_history_failure_persists_nothing() {
        let mut store = MockConversationStore::new();
        store
            .expect_history()
            .returning(|id, _| Err(StorageError::ConversationNotFound(id)));
        store.expect_append().never();

        let reply = agent(store, mock_llm_simple("unused"))
            .handle(text_turn("hello"))
            .await;
        assert_eq!(reply.text, ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_unrecorded_user_turn_gets_no_assistant_reply() {
        let mut store = MockConversationStore::new();
        store.expect_history().returning(|_, _| Ok(Vec::new()));
        store
            .expect_append()
            .withf(|_, message| message.role == MessageRole::User)
            .times(1)
            .returning(|_, _| Err(StorageError::S3Put("unavailable".to_string())));

        let reply = agent(store, mock_llm_simple("unused"))
            .handle(text_turn("hello"))
            .await;
        assert_eq!(reply.text, ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_failed_turn_error_reply_follows_user_message() {
        let mut store = MockConversationStore::new();
        let mut seq = mockall::Sequence::new();
        store.expect_history().returning(|_, _| Ok(Vec::new()));
        store
            .expect_append()
            .withf(|_, message| message.role == MessageRole::User)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        store
            .expect_append()
            .withf(|_, message| {
                message.role == MessageRole::Assistant
                    && message.content.text.as_deref() == Some(ERROR_MESSAGE)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let mut provider = MockLlmProvider::new();
        provider
            .expect_chat_completion()
            .returning(|_, _, _, _, _| Err(LlmError::ApiError("invalid_request".into())));
        let llm = LlmClient::with_provider(Arc::new(provider), "test-model".to_string());

        let reply = agent(store, llm).handle(text_turn("How are you?")).await;
        assert_eq!(reply.text, ERROR_MESSAGE);
    }
}
