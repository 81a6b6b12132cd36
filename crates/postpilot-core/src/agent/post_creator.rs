//! Multi-platform fan-out with partial-failure aggregation.

use std::fmt::Write as _;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{error, info, instrument};

use super::platform::{detect_platforms, Platform};
use super::platform_agents::{PlatformAgent, PostGenerator};
use crate::llm::{LlmClient, Message};

/// Reply used when a post request names no platform
pub const NO_PLATFORM_MESSAGE: &str = "📝 I can create posts for multiple platforms!\n\n\
Which platform(s) would you like?\n\
• X (Twitter)\n\
• LinkedIn\n\
• Instagram\n\
• YouTube\n\
• School\n\n\
Example: 'Create a LinkedIn post about AI automation'";

/// Result of one platform task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOutcome {
    /// The post was generated
    Generated {
        /// Target platform
        platform: Platform,
        /// Generated text
        post: String,
    },
    /// Generation failed; `reason` is for logs only
    Failed {
        /// Target platform
        platform: Platform,
        /// Internal failure description
        reason: String,
    },
}

impl PlatformOutcome {
    /// Platform this outcome belongs to
    #[must_use]
    pub const fn platform(&self) -> Platform {
        match self {
            Self::Generated { platform, .. } | Self::Failed { platform, .. } => *platform,
        }
    }
}

/// Outcomes of one request, in platform detection order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformResults {
    outcomes: Vec<PlatformOutcome>,
}

impl PlatformResults {
    /// Wrap outcomes already in detection order
    #[must_use]
    pub const fn new(outcomes: Vec<PlatformOutcome>) -> Self {
        Self { outcomes }
    }

    /// True when no platform was requested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// All outcomes in detection order
    #[must_use]
    pub fn outcomes(&self) -> &[PlatformOutcome] {
        &self.outcomes
    }

    /// Requested platforms in detection order
    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        self.outcomes.iter().map(PlatformOutcome::platform).collect()
    }

    /// Successful posts in detection order
    pub fn successes(&self) -> impl Iterator<Item = (Platform, &str)> + '_ {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            PlatformOutcome::Generated { platform, post } => Some((*platform, post.as_str())),
            PlatformOutcome::Failed { .. } => None,
        })
    }

    /// Failed platforms in detection order
    pub fn failures(&self) -> impl Iterator<Item = Platform> + '_ {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            PlatformOutcome::Failed { platform, .. } => Some(*platform),
            PlatformOutcome::Generated { .. } => None,
        })
    }

    /// User-facing reply: successes with headers, then a generic line per failure
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("✨ **Generated Posts**\n");
        for (platform, post) in self.successes() {
            let _ = write!(out, "\n📱 **{platform}**\n{post}\n");
        }
        for platform in self.failures() {
            let _ = write!(out, "\n❌ **{platform}**: Error generating post\n");
        }
        out.trim_end().to_string()
    }
}

/// Detects requested platforms and runs their generators concurrently
pub struct PostCreator {
    generators: Vec<Arc<dyn PostGenerator>>,
}

impl PostCreator {
    /// Build from explicit generators (one per platform)
    #[must_use]
    pub fn new(generators: Vec<Arc<dyn PostGenerator>>) -> Self {
        Self { generators }
    }

    /// Build with the built-in agent for every platform
    #[must_use]
    pub fn from_llm(llm: &LlmClient) -> Self {
        Self::new(
            PlatformAgent::all(llm)
                .into_iter()
                .map(|agent| Arc::new(agent) as Arc<dyn PostGenerator>)
                .collect(),
        )
    }

    fn generator(&self, platform: Platform) -> Option<&Arc<dyn PostGenerator>> {
        self.generators.iter().find(|g| g.platform() == platform)
    }

    async fn run_one(
        &self,
        platform: Platform,
        prompt: &str,
        history: &[Message],
    ) -> PlatformOutcome {
        let Some(generator) = self.generator(platform) else {
            return PlatformOutcome::Failed {
                platform,
                reason: "no generator registered".to_string(),
            };
        };

        match generator.generate(prompt, history).await {
            Ok(post) => PlatformOutcome::Generated { platform, post },
            Err(e) => {
                error!(platform = %platform, error = %e, "Post generation failed");
                PlatformOutcome::Failed {
                    platform,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Generate a post for every platform named in `prompt`.
    ///
    /// Returns empty results when no platform is named. One platform failing
    /// never affects the others.
    #[instrument(skip(self, prompt, history))]
    pub async fn create(&self, prompt: &str, history: &[Message]) -> PlatformResults {
        let platforms = detect_platforms(prompt);
        if platforms.is_empty() {
            info!("No platform named in request");
            return PlatformResults::default();
        }

        info!(platforms = ?platforms, "Creating posts");
        let tasks = platforms
            .iter()
            .map(|platform| self.run_one(*platform, prompt, history));
        PlatformResults::new(join_all(tasks).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_successes_then_failures() {
        let results = PlatformResults::new(vec![
            PlatformOutcome::Failed {
                platform: Platform::X,
                reason: "timeout".to_string(),
            },
            PlatformOutcome::Generated {
                platform: Platform::Linkedin,
                post: "Hello LinkedIn".to_string(),
            },
        ]);
        let text = results.render();
        assert_eq!(
            text,
            "✨ **Generated Posts**\n\n📱 **LinkedIn**\nHello LinkedIn\n\n❌ **X**: Error generating post"
        );
        assert!(!text.contains("timeout"));
    }
}
