mod common;

use common::{client, ScriptedProvider};
use postpilot_core::agent::{Platform, PlatformOutcome, PostCreator};
use std::sync::Arc;

#[tokio::test]
async fn test_one_failing_platform_does_not_affect_others() {
    let provider = Arc::new(ScriptedProvider::new().failing_on("LinkedIn"));
    let creator = PostCreator::from_llm(&client(Arc::clone(&provider)));

    let results = creator
        .create("Write posts for X, LinkedIn and Instagram about remote work", &[])
        .await;

    assert_eq!(
        results.platforms(),
        vec![Platform::X, Platform::Linkedin, Platform::Instagram]
    );
    assert_eq!(results.successes().count(), 2);
    assert_eq!(results.failures().collect::<Vec<_>>(), vec![Platform::Linkedin]);
    assert!(matches!(
        &results.outcomes()[1],
        PlatformOutcome::Failed { platform: Platform::Linkedin, .. }
    ));

    let reply = results.render();
    assert!(reply.contains("📱 **X**"));
    assert!(reply.contains("📱 **Instagram**"));
    assert!(reply.contains("❌ **LinkedIn**: Error generating post"));
    assert!(!reply.contains("500 internal error"));
}

#[tokio::test]
async fn test_two_platforms_in_mention_order() {
    let provider = Arc::new(ScriptedProvider::new());
    let creator = PostCreator::from_llm(&client(Arc::clone(&provider)));

    let results = creator
        .create("Make posts for X and Instagram about productivity", &[])
        .await;

    assert_eq!(results.platforms(), vec![Platform::X, Platform::Instagram]);
    let reply = results.render();
    let x = reply.find("📱 **X**").expect("X header");
    let ig = reply.find("📱 **Instagram**").expect("Instagram header");
    assert!(x < ig);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_no_platform_makes_no_backend_call() {
    let provider = Arc::new(ScriptedProvider::new());
    let creator = PostCreator::from_llm(&client(Arc::clone(&provider)));

    let results = creator.create("Create a post about AI automation", &[]).await;

    assert!(results.is_empty());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_school_post_is_signed() {
    let provider = Arc::new(ScriptedProvider::new());
    let creator = PostCreator::from_llm(&client(provider));

    let results = creator.create("A School post about onboarding", &[]).await;
    let (_, post) = results.successes().next().expect("school post");
    assert!(post.ends_with("Love an automation,\nJack"));
}
