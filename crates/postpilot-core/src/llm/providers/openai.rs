use crate::llm::{openai_compat, GenerationParams, LlmError, LlmProvider, Message};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;

/// LLM provider for `OpenAI` and OpenAI-compatible endpoints
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Create a new provider; `api_base` overrides the default endpoint
    #[must_use]
    pub fn new(api_key: String, api_base: Option<String>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base.filter(|b| !b.trim().is_empty()) {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat_completion(
        &self,
        system_prompt: &str,
        history: &[Message],
        user_message: &str,
        model_id: &str,
        params: GenerationParams,
    ) -> Result<String, LlmError> {
        openai_compat::chat_completion(
            &self.client,
            system_prompt,
            history,
            user_message,
            model_id,
            params,
        )
        .await
    }
}
