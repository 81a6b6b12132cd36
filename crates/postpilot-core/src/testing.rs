//! Shared mocks for unit tests

use std::sync::Arc;

use crate::llm::{LlmClient, MockLlmProvider, RetryPolicy};
use crate::storage::MockConversationStore;

/// Client whose provider answers every request with `response`
pub fn mock_llm_simple(response: &'static str) -> LlmClient {
    let mut provider = MockLlmProvider::new();
    provider
        .expect_chat_completion()
        .returning(move |_, _, _, _, _| Ok(response.to_string()));
    LlmClient::with_provider(Arc::new(provider), "test-model".to_string()).with_retry_policy(
        RetryPolicy {
            max_attempts: 1,
            initial_backoff: std::time::Duration::from_millis(1),
        },
    )
}

/// Store with an empty history that accepts every append
pub fn mock_store_noop() -> MockConversationStore {
    let mut store = MockConversationStore::new();
    store.expect_history().returning(|_, _| Ok(Vec::new()));
    store.expect_append().returning(|_, _| Ok(()));
    store
}
