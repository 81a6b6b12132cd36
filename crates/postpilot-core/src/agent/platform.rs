use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported publishing destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    /// X (formerly Twitter)
    X,
    /// `LinkedIn`
    Linkedin,
    /// Instagram
    Instagram,
    /// `YouTube`
    Youtube,
    /// School community
    School,
}

impl Platform {
    /// Every platform in menu order
    pub const ALL: [Self; 5] = [
        Self::X,
        Self::Linkedin,
        Self::Instagram,
        Self::Youtube,
        Self::School,
    ];

    /// Name shown to users
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::X => "X",
            Self::Linkedin => "LinkedIn",
            Self::Instagram => "Instagram",
            Self::Youtube => "YouTube",
            Self::School => "School",
        }
    }

    /// Resolve a lowercase word to a platform
    #[must_use]
    pub fn from_alias(word: &str) -> Option<Self> {
        match word {
            "x" | "twitter" | "tweet" | "tweets" => Some(Self::X),
            "linkedin" | "linked-in" => Some(Self::Linkedin),
            "instagram" | "insta" | "ig" => Some(Self::Instagram),
            "youtube" | "yt" => Some(Self::Youtube),
            "school" | "skool" => Some(Self::School),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

fn normalize_word(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let trimmed = lower.trim_matches(|c| c == '-' || c == '\'' || c == '\u{2019}');
    trimmed
        .strip_suffix("'s")
        .or_else(|| trimmed.strip_suffix("\u{2019}s"))
        .unwrap_or(trimmed)
        .to_string()
}

/// Platforms named in `prompt`, in order of first mention, without duplicates.
///
/// Matching is case-insensitive and whole-word, so "x" inside "xbox" or
/// "linkedin" inside "linkedinfluencer" does not count.
///
/// Every platform name counts as a request, whatever the context: "a LinkedIn
/// post about my school reunion" names both LinkedIn and School.
#[must_use]
pub fn detect_platforms(prompt: &str) -> Vec<Platform> {
    let mut found = Vec::new();
    let words = prompt
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\'' || c == '\u{2019}'))
        .filter(|w| !w.is_empty());

    for word in words {
        if let Some(platform) = Platform::from_alias(&normalize_word(word)) {
            if !found.contains(&platform) {
                found.push(platform);
            }
        }
    }
    found
}
