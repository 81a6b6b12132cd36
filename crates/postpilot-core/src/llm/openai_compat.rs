//! OpenAI-compatible provider utilities
//!
//! Shared request path for providers using the async-openai client.

use super::common::{build_openai_messages, extract_openai_response, map_openai_error};
use super::{GenerationParams, LlmError, Message};
use async_openai::{config::OpenAIConfig, types::chat::CreateChatCompletionRequestArgs, Client};

/// Perform a chat completion using an OpenAI-compatible API
pub async fn chat_completion(
    client: &Client<OpenAIConfig>,
    system_prompt: &str,
    history: &[Message],
    user_message: &str,
    model_id: &str,
    params: GenerationParams,
) -> Result<String, LlmError> {
    let messages = build_openai_messages(system_prompt, history, user_message)?;

    let request = CreateChatCompletionRequestArgs::default()
        .model(model_id)
        .messages(messages)
        .max_tokens(params.max_tokens)
        .temperature(params.temperature)
        .build()
        .map_err(|e| LlmError::Unknown(e.to_string()))?;

    let response = client
        .chat()
        .create(request)
        .await
        .map_err(map_openai_error)?;

    extract_openai_response(&response)
}
