mod common;

use common::{client, photo, FakeEditor, FakeStore, ScriptedProvider};
use postpilot_core::agent::super_agent::{ERROR_MESSAGE, IMAGE_INSTRUCTIONS_MESSAGE};
use postpilot_core::agent::{
    ImageImprover, LlmIntentClassifier, PostCreator, RuleBasedClassifier, SuperAgent, UserTurn,
};
use postpilot_core::storage::{ConversationStore, InMemoryStore, MessageRole};
use std::sync::Arc;
use uuid::Uuid;

struct Harness {
    agent: SuperAgent,
    store: Arc<InMemoryStore>,
    provider: Arc<ScriptedProvider>,
    conversation_id: Uuid,
}

async fn harness(provider: ScriptedProvider, with_editing: bool) -> Harness {
    let provider = Arc::new(provider);
    let llm = client(Arc::clone(&provider));
    let store = Arc::new(InMemoryStore::new());
    let conversation = store
        .get_or_create_conversation(42, 42)
        .await
        .expect("conversation");

    let mut agent = SuperAgent::new(
        store.clone(),
        Arc::new(RuleBasedClassifier),
        PostCreator::from_llm(&llm),
        llm,
    );
    if with_editing {
        let host = Arc::new(FakeStore::new("imgbb"));
        agent = agent.with_image_improver(ImageImprover::new(
            host.clone(),
            Arc::new(FakeEditor::new()),
            host,
            store.clone(),
        ));
    }

    Harness {
        agent,
        store,
        provider,
        conversation_id: conversation.id,
    }
}

fn turn(conversation_id: Uuid, text: &str, with_image: bool) -> UserTurn {
    UserTurn {
        conversation_id,
        user_id: 42,
        text: Some(text.to_string()),
        image: with_image.then(photo),
    }
}

#[tokio::test]
async fn test_linkedin_request_produces_one_post_and_persists_both_turns() {
    let h = harness(ScriptedProvider::new(), false).await;

    let reply = h
        .agent
        .handle(turn(h.conversation_id, "Create a LinkedIn post about AI automation", false))
        .await;

    assert!(reply.text.starts_with("✨ **Generated Posts**"));
    assert!(reply.text.contains("📱 **LinkedIn**"));
    assert_eq!(reply.text.matches("📱").count(), 1);

    let history = h.store.history(h.conversation_id, 10).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, MessageRole::User);
    assert_eq!(history[1].role, MessageRole::Assistant);
    assert_eq!(history[1].content.text.as_deref(), Some(reply.text.as_str()));
}

#[tokio::test]
async fn test_edit_only_creates_version_one_without_posts() {
    let h = harness(ScriptedProvider::new(), true).await;

    let reply = h
        .agent
        .handle(turn(h.conversation_id, "Change the text to Hello World", true))
        .await;

    assert_eq!(reply.text, "✅ Image edited (version 1)");
    assert_eq!(reply.media.len(), 1);
    assert!(!reply.text.contains("Generated Posts"));
    assert_eq!(h.provider.call_count(), 0);

    let versions = h.store.image_versions(h.conversation_id).await.expect("versions");
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_number, 1);
    assert_eq!(versions[0].instruction, "Change the text to Hello World");
}

#[tokio::test]
async fn test_both_returns_edit_and_posts() {
    let h = harness(ScriptedProvider::new(), true).await;

    let reply = h
        .agent
        .handle(turn(
            h.conversation_id,
            "Add a logo and create an Instagram post",
            true,
        ))
        .await;

    assert!(reply.text.starts_with("✅ Image edited (version 1)\n\n✨ **Generated Posts**"));
    assert!(reply.text.contains("📱 **Instagram**"));
    assert_eq!(reply.media.len(), 1);
    let prompts = h.provider.user_messages.lock().expect("lock").clone();
    assert_eq!(
        prompts,
        vec!["User uploaded an image and wants: Add a logo and create an Instagram post"]
    );
}

#[tokio::test]
async fn test_image_without_caption_skips_classification() {
    let h = harness(ScriptedProvider::new(), true).await;

    let reply = h.agent.handle(turn(h.conversation_id, "", true)).await;

    assert_eq!(reply.text, IMAGE_INSTRUCTIONS_MESSAGE);
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn test_general_backend_failure_returns_fixed_message() {
    let h = harness(ScriptedProvider::new().failing_on("helpful AI assistant"), false).await;

    let reply = h.agent.handle(turn(h.conversation_id, "What can you do?", false)).await;

    assert_eq!(reply.text, ERROR_MESSAGE);
    let history = h.store.history(h.conversation_id, 10).await.expect("history");
    assert_eq!(history.last().and_then(|m| m.content.text.as_deref()), Some(ERROR_MESSAGE));
}

#[tokio::test]
async fn test_missing_conversation_returns_fixed_message() {
    let h = harness(ScriptedProvider::new(), false).await;

    let reply = h.agent.handle(turn(Uuid::new_v4(), "Hello", false)).await;

    assert_eq!(reply.text, ERROR_MESSAGE);
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn test_llm_classifier_routes_by_label() {
    let provider = Arc::new(ScriptedProvider::new().with_label("create_post"));
    let llm = client(Arc::clone(&provider));
    let store = Arc::new(InMemoryStore::new());
    let conversation = store
        .get_or_create_conversation(7, 7)
        .await
        .expect("conversation");
    let agent = SuperAgent::new(
        store,
        Arc::new(LlmIntentClassifier::new(llm.clone())),
        PostCreator::from_llm(&llm),
        llm,
    );

    let reply = agent
        .handle(turn(conversation.id, "Something for YouTube on async Rust", false))
        .await;

    assert!(reply.text.contains("📱 **YouTube**"));
    assert_eq!(provider.call_count(), 2);
}
