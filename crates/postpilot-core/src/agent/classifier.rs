//! Intent classification
//!
//! [`IntentClassifier`] returns a closed [`Intent`]. The rule-based variant is
//! deterministic and needs no backend; the LLM variant uses prompt-engineered
//! labels and falls back to the rules when the label is not recognised.

use async_trait::async_trait;
use std::fmt;
use tracing::{debug, warn};

use super::AgentError;
use crate::config::{CLASSIFIER_HISTORY_WINDOW, CLASSIFIER_MAX_TOKENS};
use crate::llm::{GenerationParams, LlmClient, Message};

/// Routing category of one user turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Text asking for social media content
    CreatePost,
    /// Anything else without an image
    General,
    /// Image with an edit instruction
    EditOnly,
    /// Image with a request for a post about it
    PostOnly,
    /// Image with both an edit and a post request
    Both,
}

impl Intent {
    /// Label used in prompts and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreatePost => "CREATE_POST",
            Self::General => "GENERAL",
            Self::EditOnly => "EDIT_ONLY",
            Self::PostOnly => "POST_ONLY",
            Self::Both => "BOTH",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pluggable intent classifier
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify a turn from its text, image presence and recent history
    async fn classify(
        &self,
        text: &str,
        has_image: bool,
        history: &[Message],
    ) -> Result<Intent, AgentError>;
}

const CREATION_WORDS: &[&str] = &[
    "create", "creating", "write", "writing", "generate", "draft", "compose", "post", "posts",
    "tweet", "tweets", "caption", "captions", "thread", "article", "content", "publish",
];

const EDIT_WORDS: &[&str] = &[
    "edit", "change", "replace", "remove", "add", "modify", "adjust", "enhance", "improve",
    "crop", "brighten", "darken", "fix", "retouch", "recolor", "background", "blur",
];

const IMAGE_WORDS: &[&str] = &["image", "images", "photo", "photos", "picture", "pic", "logo"];

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn contains_any(text: &str, vocabulary: &[&str]) -> bool {
    words(text).any(|w| vocabulary.contains(&w.as_str()))
}

/// True when the text asks for social media content
#[must_use]
pub fn has_creation_cue(text: &str) -> bool {
    contains_any(text, CREATION_WORDS)
}

/// True when the text asks for an image modification
#[must_use]
pub fn has_edit_cue(text: &str) -> bool {
    contains_any(text, EDIT_WORDS)
}

/// True when text without an attachment asks to edit an image
#[must_use]
pub fn mentions_image_edit(text: &str) -> bool {
    has_edit_cue(text) && contains_any(text, IMAGE_WORDS)
}

/// Deterministic keyword classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    /// Classify without any backend call
    #[must_use]
    pub fn classify_text(text: &str, has_image: bool) -> Intent {
        let create = has_creation_cue(text);
        if !has_image {
            return if create {
                Intent::CreatePost
            } else {
                Intent::General
            };
        }

        match (has_edit_cue(text), create) {
            (true, true) => Intent::Both,
            (false, true) => Intent::PostOnly,
            // An image with an instruction but no post wording is treated as an edit.
            (_, false) => Intent::EditOnly,
        }
    }
}

#[async_trait]
impl IntentClassifier for RuleBasedClassifier {
    async fn classify(
        &self,
        text: &str,
        has_image: bool,
        _history: &[Message],
    ) -> Result<Intent, AgentError> {
        Ok(Self::classify_text(text, has_image))
    }
}

const TEXT_INTENT_PROMPT: &str = "You are an intent classifier for an AI social media system.

Analyze the user's message and classify it into one of these intents:
- create_post: User wants to create social media content
- edit_image: User wants to edit an image (but no image uploaded yet)
- general: General conversation or unclear intent

Respond with ONLY the intent name, nothing else.";

const IMAGE_INTENT_PROMPT: &str = "You are an intent classifier for image-related requests.

Analyze the caption and classify it into one of these intents:
- edit_only: User wants to edit/modify the image
- post_only: User wants to create a social media post about the image
- both: User wants both image editing and post creation

Respond with ONLY the intent name, nothing else.";

/// Map a backend label to an intent; `None` for anything unexpected
#[must_use]
pub fn parse_label(raw: &str, has_image: bool) -> Option<Intent> {
    let label = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
        .to_lowercase();
    match (has_image, label.as_str()) {
        (false, "create_post") => Some(Intent::CreatePost),
        (false, "general" | "edit_image") => Some(Intent::General),
        (true, "edit_only") => Some(Intent::EditOnly),
        (true, "post_only") => Some(Intent::PostOnly),
        (true, "both") => Some(Intent::Both),
        _ => None,
    }
}

/// Prompt-engineered classifier backed by the LLM client
pub struct LlmIntentClassifier {
    llm: LlmClient,
}

impl LlmIntentClassifier {
    /// Create a classifier using `llm`
    #[must_use]
    pub const fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(
        &self,
        text: &str,
        has_image: bool,
        history: &[Message],
    ) -> Result<Intent, AgentError> {
        let (system_prompt, context) = if has_image {
            (IMAGE_INTENT_PROMPT, &history[..0])
        } else {
            let start = history.len().saturating_sub(CLASSIFIER_HISTORY_WINDOW);
            (TEXT_INTENT_PROMPT, &history[start..])
        };

        let raw = self
            .llm
            .complete(
                system_prompt,
                context,
                text,
                GenerationParams::new(CLASSIFIER_MAX_TOKENS, 0.0),
            )
            .await
            .map_err(AgentError::Classification)?;

        if let Some(intent) = parse_label(&raw, has_image) {
            debug!(label = %raw, intent = %intent, "Classified intent");
            return Ok(intent);
        }

        let fallback = RuleBasedClassifier::classify_text(text, has_image);
        warn!(label = %raw, fallback = %fallback, "Unrecognised intent label, using rules");
        Ok(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmProvider};
    use std::sync::Arc;

    #[test]
    fn test_rules_text_only() {
        assert_eq!(
            RuleBasedClassifier::classify_text("Create a LinkedIn post about AI automation", false),
            Intent::CreatePost
        );
        assert_eq!(
            RuleBasedClassifier::classify_text("Write something about productivity", false),
            Intent::CreatePost
        );
        assert_eq!(
            RuleBasedClassifier::classify_text("How are you today?", false),
            Intent::General
        );
    }

    #[test]
    fn test_rules_with_image() {
        assert_eq!(
            RuleBasedClassifier::classify_text("Change the text to Hello World", true),
            Intent::EditOnly
        );
        assert_eq!(
            RuleBasedClassifier::classify_text("Write a LinkedIn post about this image", true),
            Intent::PostOnly
        );
        assert_eq!(
            RuleBasedClassifier::classify_text("Add a logo and create an Instagram post", true),
            Intent::Both
        );
        assert_eq!(
            RuleBasedClassifier::classify_text("Sunset at the beach", true),
            Intent::EditOnly
        );
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label(" create_post\n", false), Some(Intent::CreatePost));
        assert_eq!(parse_label("\"BOTH\"", true), Some(Intent::Both));
        assert_eq!(parse_label("edit_image", false), Some(Intent::General));
        assert_eq!(parse_label("both", false), None);
        assert_eq!(parse_label("I think post_only", true), None);
    }

    #[test]
    fn test_mentions_image_edit() {
        assert!(mentions_image_edit("Can you remove the background of my photo?"));
        assert!(!mentions_image_edit("Create a LinkedIn post"));
    }

    fn classifier(provider: MockLlmProvider) -> LlmIntentClassifier {
        LlmIntentClassifier::new(LlmClient::with_provider(
            Arc::new(provider),
            "test-model".to_string(),
        ))
    }

    #[tokio::test]
    async fn test_llm_unrecognised_label_falls_back_to_rules() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_chat_completion()
            .withf(|_, _, _, _, params| params.max_tokens == 20 && params.temperature == 0.0)
            .returning(|_, _, _, _, _| Ok("social media stuff".to_string()));

        let intent = classifier(provider)
            .classify("Draft a tweet about Rust", false, &[])
            .await
            .expect("classified");
        assert_eq!(intent, Intent::CreatePost);
    }

    #[tokio::test]
    async fn test_llm_backend_failure_is_classification_error() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_chat_completion()
            .returning(|_, _, _, _, _| Err(LlmError::MissingConfig("key".into())));

        let err = classifier(provider)
            .classify("hello", false, &[])
            .await
            .expect_err("fails");
        assert!(matches!(err, AgentError::Classification(_)));
    }
}
