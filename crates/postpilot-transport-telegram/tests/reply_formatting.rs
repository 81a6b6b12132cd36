use postpilot_core::agent::{Platform, PlatformOutcome, PlatformResults};
use postpilot_transport_telegram::bot::messaging::{
    format_message_parts, format_text, TELEGRAM_MESSAGE_LIMIT,
};

#[test]
fn test_rendered_posts_become_telegram_html() {
    let results = PlatformResults::new(vec![
        PlatformOutcome::Generated {
            platform: Platform::X,
            post: "Rust <3 & async #rustlang".to_string(),
        },
        PlatformOutcome::Failed {
            platform: Platform::School,
            reason: "timeout".to_string(),
        },
    ]);

    let html = format_text(&results.render());

    assert!(html.starts_with("✨ <b>Generated Posts</b>"));
    assert!(html.contains("📱 <b>X</b>\nRust &lt;3 &amp; async #rustlang"));
    assert!(html.contains("❌ <b>School</b>: Error generating post"));
    assert!(!html.contains("**"));
}

#[test]
fn test_long_multi_platform_reply_is_split_within_limit() {
    let outcomes = [Platform::Linkedin, Platform::Youtube, Platform::School]
        .into_iter()
        .map(|platform| PlatformOutcome::Generated {
            platform,
            post: "A paragraph of generated content.\n".repeat(60),
        })
        .collect();
    let text = PlatformResults::new(outcomes).render();

    let parts = format_message_parts(&text, TELEGRAM_MESSAGE_LIMIT);

    assert!(parts.len() > 1);
    assert!(parts
        .iter()
        .all(|p| p.chars().count() <= TELEGRAM_MESSAGE_LIMIT));
    assert_eq!(parts.concat().matches("📱").count(), 3);
}

#[test]
fn test_markup_heavy_reply_stays_within_telegram_limit() {
    let results = PlatformResults::new(vec![PlatformOutcome::Generated {
        platform: Platform::Linkedin,
        post: "Q&A: <R&D> & <ops> & <sales>\n".repeat(400),
    }]);

    let parts = format_message_parts(&results.render(), TELEGRAM_MESSAGE_LIMIT);

    assert!(parts.len() > 1);
    assert!(parts
        .iter()
        .all(|p| p.chars().count() <= TELEGRAM_MESSAGE_LIMIT));
    assert!(parts[0].starts_with("✨ <b>Generated Posts</b>"));
    assert!(parts.iter().all(|p| !p.contains("<R&D>")));
}
