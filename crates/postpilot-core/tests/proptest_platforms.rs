use postpilot_core::agent::platform_agents::enforce_char_limit;
use postpilot_core::agent::{detect_platforms, Platform};
use postpilot_core::config::X_MAX_CHARS;
use proptest::prelude::*;

proptest! {
    /// X output never exceeds the character limit, whatever the draft.
    #[test]
    fn x_output_within_limit(draft in "\\PC{0,1200}") {
        let post = enforce_char_limit(&draft, X_MAX_CHARS);
        prop_assert!(post.chars().count() <= X_MAX_CHARS);
    }

    /// Drafts already within the limit are kept (modulo surrounding whitespace).
    #[test]
    fn short_drafts_untouched(draft in "[a-zA-Z0-9 #!.,]{0,280}") {
        prop_assert_eq!(enforce_char_limit(&draft, X_MAX_CHARS), draft.trim());
    }

    /// Detection is deterministic.
    #[test]
    fn detection_is_idempotent(prompt in "\\PC{0,200}") {
        prop_assert_eq!(detect_platforms(&prompt), detect_platforms(&prompt));
    }

    /// Every named platform is found once, in mention order.
    #[test]
    fn detects_named_platforms_in_order(
        picks in proptest::collection::vec(0usize..5, 1..6),
        filler in proptest::sample::select(vec!["", "about hiring", "on async rust", "for the team"]),
    ) {
        let names = ["X", "LinkedIn", "Instagram", "YouTube", "School"];
        let prompt = picks
            .iter()
            .map(|i| format!("{} {filler}", names[*i]))
            .collect::<Vec<_>>()
            .join(" and ");

        let mut expected: Vec<Platform> = Vec::new();
        for i in &picks {
            let platform = Platform::ALL[*i];
            if !expected.contains(&platform) {
                expected.push(platform);
            }
        }
        prop_assert_eq!(detect_platforms(&prompt), expected);
    }
}
