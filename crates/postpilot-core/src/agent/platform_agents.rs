//! One generation capability, configured per platform.

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::platform::Platform;
use super::AgentError;
use crate::config::{PLATFORM_HISTORY_WINDOW, X_MAX_CHARS};
use crate::llm::{GenerationParams, LlmClient, Message};
use crate::utils::truncate_with_ellipsis;

const X_PROMPT: &str = "You are an expert X (Twitter) content creator.

X POST REQUIREMENTS:
- MAXIMUM 280 characters (STRICT LIMIT)
- Strong, attention-grabbing opening
- Concise and punchy
- Clear value or insight
- Conversational and authentic
- 1-3 hashtags (included in character count)
- Use line breaks for readability

TONE: Confident, direct, engaging

Create an X post. MUST be under 280 characters.";

const LINKEDIN_PROMPT: &str = "You are an expert LinkedIn content creator.

LINKEDIN POST CHARACTERISTICS:
- Professional yet conversational and authentic
- Start with an attention-grabbing hook
- Use storytelling and personal insights
- Demonstrate thought leadership
- Include actionable insights
- Short paragraphs with line breaks
- End with engagement (question or CTA)
- 3-5 relevant hashtags at end
- 150-300 words optimal

TONE: Professional, confident, educational, engaging

Create a LinkedIn post based on the user's request.";

const INSTAGRAM_PROMPT: &str = "You are an expert Instagram content creator.

INSTAGRAM CAPTION CHARACTERISTICS:
- Visual-first: complement the image
- Strong opening hook
- Authentic and relatable
- Storytelling when appropriate
- 3-5 emojis naturally integrated
- Line breaks for readability
- End with CTA or question
- 5-10 relevant hashtags at end
- 125-150 words ideal

TONE: Authentic, personal, inspirational

Create an Instagram caption.";

const YOUTUBE_PROMPT: &str = "You are an expert YouTube content creator.

YOUTUBE CONTENT STRUCTURE:
1. Title (60-70 characters, attention-grabbing, keyword-rich)
2. Description (SEO-optimized, 150-300 words)

TITLE: Clear value, includes keywords, creates curiosity
DESCRIPTION: First 2-3 lines crucial, natural keywords, timestamps if relevant, CTA

Format as:
**Title:** [title]

**Description:**
[description]

TONE: Enthusiastic, clear, SEO-conscious

Create YouTube title and description.";

const SCHOOL_PROMPT: &str = "You are an expert community manager for School platform.

SCHOOL POST CHARACTERISTICS:
- Community-focused and collaborative
- Educational and value-driven
- Encourages discussion
- Friendly, supportive tone
- Clear structure with headings
- 150-250 words
- 2-4 emojis for visual breaks
- Often ends with \"Love an automation, Jack\"

TONE: Warm, expert but approachable, community-oriented

Create a School community post.";

/// Text appended to a post unless `marker` already appears in it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Substring whose presence means the post is already signed
    pub marker: &'static str,
    /// Text appended when unsigned
    pub text: &'static str,
}

/// Platform-specific generation settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformProfile {
    /// Platform this profile targets
    pub platform: Platform,
    /// System instructions (tone, structure, hashtag policy)
    pub system_prompt: &'static str,
    /// Sampling parameters
    pub params: GenerationParams,
    /// Hard character limit on the returned text
    pub char_limit: Option<usize>,
    /// Signature appended to unsigned posts
    pub signature: Option<Signature>,
    /// Most recent history messages forwarded to the backend
    pub history_window: usize,
}

impl PlatformProfile {
    /// Built-in profile for `platform`
    #[must_use]
    pub const fn for_platform(platform: Platform) -> Self {
        let (system_prompt, max_tokens) = match platform {
            Platform::X => (X_PROMPT, 150),
            Platform::Linkedin => (LINKEDIN_PROMPT, 800),
            Platform::Instagram => (INSTAGRAM_PROMPT, 600),
            Platform::Youtube => (YOUTUBE_PROMPT, 800),
            Platform::School => (SCHOOL_PROMPT, 700),
        };
        let char_limit = match platform {
            Platform::X => Some(X_MAX_CHARS),
            _ => None,
        };
        let signature = match platform {
            Platform::School => Some(Signature {
                marker: "Love an automation",
                text: "\n\nLove an automation,\nJack",
            }),
            _ => None,
        };

        Self {
            platform,
            system_prompt,
            params: GenerationParams::new(max_tokens, 0.7),
            char_limit,
            signature,
            history_window: PLATFORM_HISTORY_WINDOW,
        }
    }
}

/// Produces a post for one platform
#[async_trait]
pub trait PostGenerator: Send + Sync {
    /// Platform this generator writes for
    fn platform(&self) -> Platform;

    /// Generate a post for `prompt` using recent `history` as context
    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, AgentError>;
}

/// Shorten `text` to `limit` characters, ending in `...` when cut
#[must_use]
pub fn enforce_char_limit(text: &str, limit: usize) -> String {
    truncate_with_ellipsis(text.trim(), limit)
}

/// Append `signature` unless the post already carries its marker
#[must_use]
pub fn apply_signature(post: String, signature: Option<Signature>) -> String {
    match signature {
        Some(sig) if !post.contains(sig.marker) => post + sig.text,
        _ => post,
    }
}

/// LLM-backed generator driven by a [`PlatformProfile`]
pub struct PlatformAgent {
    profile: PlatformProfile,
    llm: LlmClient,
}

impl PlatformAgent {
    /// Create an agent with the built-in profile for `platform`
    #[must_use]
    pub fn new(platform: Platform, llm: LlmClient) -> Self {
        Self::with_profile(PlatformProfile::for_platform(platform), llm)
    }

    /// Create an agent with a custom profile
    #[must_use]
    pub fn with_profile(profile: PlatformProfile, llm: LlmClient) -> Self {
        Self { profile, llm }
    }

    /// One agent per supported platform
    #[must_use]
    pub fn all(llm: &LlmClient) -> Vec<Self> {
        Platform::ALL
            .iter()
            .map(|platform| Self::new(*platform, llm.clone()))
            .collect()
    }

    /// Profile in use
    #[must_use]
    pub const fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    fn recent<'a>(&self, history: &'a [Message]) -> &'a [Message] {
        let start = history.len().saturating_sub(self.profile.history_window);
        &history[start..]
    }

    async fn request(&self, prompt: &str, history: &[Message]) -> Result<String, AgentError> {
        self.llm
            .complete(self.profile.system_prompt, history, prompt, self.profile.params)
            .await
            .map_err(|source| AgentError::PlatformGeneration {
                platform: self.profile.platform,
                source,
            })
    }

    /// Ask once for a shorter rewrite, then cut to the limit regardless
    async fn fit_to_limit(&self, draft: String, history: &[Message], limit: usize) -> String {
        let length = draft.chars().count();
        if length <= limit {
            return draft;
        }

        warn!(
            platform = %self.profile.platform,
            length,
            limit,
            "Draft exceeds character limit, requesting rewrite"
        );
        let rewrite_prompt = format!(
            "Rewrite this post in at most {limit} characters, keeping its message and hashtags:\n\n{draft}"
        );
        let candidate = match self.request(&rewrite_prompt, history).await {
            Ok(rewrite) => rewrite,
            Err(e) => {
                warn!(error = %e, "Rewrite failed, truncating first draft");
                draft
            }
        };
        enforce_char_limit(&candidate, limit)
    }
}

#[async_trait]
impl PostGenerator for PlatformAgent {
    fn platform(&self) -> Platform {
        self.profile.platform
    }

    #[instrument(skip(self, prompt, history), fields(platform = %self.profile.platform))]
    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, AgentError> {
        let history = self.recent(history);
        debug!(history_len = history.len(), "Generating post");

        let mut post = self.request(prompt, history).await?;
        if let Some(limit) = self.profile.char_limit {
            // Leave room for a signature that will be appended.
            let reserved = self
                .profile
                .signature
                .filter(|sig| !post.contains(sig.marker))
                .map_or(0, |sig| sig.text.chars().count());
            post = self
                .fit_to_limit(post, history, limit.saturating_sub(reserved))
                .await;
        }
        let post = apply_signature(post, self.profile.signature);

        info!(chars = post.chars().count(), "Post created");
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmProvider};
    use std::sync::Arc;

    fn client(provider: MockLlmProvider) -> LlmClient {
        LlmClient::with_provider(Arc::new(provider), "test-model".to_string())
    }

    #[test]
    fn test_profiles() {
        let x = PlatformProfile::for_platform(Platform::X);
        assert_eq!(x.char_limit, Some(280));
        assert_eq!(x.params.max_tokens, 150);
        assert!(PlatformProfile::for_platform(Platform::Linkedin)
            .char_limit
            .is_none());
        assert!(PlatformProfile::for_platform(Platform::School)
            .signature
            .is_some());
    }

    #[test]
    fn test_apply_signature_once() {
        let sig = PlatformProfile::for_platform(Platform::School).signature;
        let signed = apply_signature("Welcome!".to_string(), sig);
        assert_eq!(signed, "Welcome!\n\nLove an automation,\nJack");
        assert_eq!(apply_signature(signed.clone(), sig), signed);
    }

    #[tokio::test]
    async fn test_x_rewrites_then_truncates() {
        let mut provider = MockLlmProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_chat_completion()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _| Ok("word ".repeat(100)));
        provider
            .expect_chat_completion()
            .withf(|_, _, user, _, _| user.starts_with("Rewrite this post"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _| Ok("still too long ".repeat(30)));

        let agent = PlatformAgent::new(Platform::X, client(provider));
        let post = agent.generate("AI", &[]).await.expect("post");
        assert!(post.chars().count() <= 280);
        assert!(post.ends_with("..."));
    }

    #[tokio::test]
    async fn test_signature_fits_within_char_limit() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_chat_completion()
            .returning(|_, _, _, _, _| Ok("word ".repeat(100)));

        let profile = PlatformProfile {
            signature: PlatformProfile::for_platform(Platform::School).signature,
            ..PlatformProfile::for_platform(Platform::X)
        };
        let agent = PlatformAgent::with_profile(profile, client(provider));
        let post = agent.generate("AI", &[]).await.expect("post");
        assert!(post.chars().count() <= 280);
        assert!(post.ends_with("Love an automation,\nJack"));
    }

    #[tokio::test]
    async fn test_history_is_windowed() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_chat_completion()
            .withf(|_, history, _, _, _| {
                history.len() == 3 && history[0].content == "m2"
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok("LinkedIn post".to_string()));

        let history: Vec<Message> = (0..5).map(|i| Message::user(&format!("m{i}"))).collect();
        let agent = PlatformAgent::new(Platform::Linkedin, client(provider));
        assert_eq!(
            agent.generate("AI", &history).await.expect("post"),
            "LinkedIn post"
        );
    }

    #[tokio::test]
    async fn test_failure_is_attributed_to_platform() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_chat_completion()
            .returning(|_, _, _, _, _| Err(LlmError::ApiError("invalid_request".into())));

        let agent = PlatformAgent::new(Platform::Instagram, client(provider));
        let err = agent.generate("AI", &[]).await.expect_err("fails");
        assert!(matches!(
            err,
            AgentError::PlatformGeneration {
                platform: Platform::Instagram,
                ..
            }
        ));
    }
}
