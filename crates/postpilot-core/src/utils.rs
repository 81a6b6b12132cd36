//! Text helpers and retry wrappers shared by the agents and transports.

use std::fmt::Display;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// Truncate a string to at most `max_chars` characters (Unicode scalar values).
#[must_use]
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Shorten `text` to at most `limit` characters, ending with `...`.
///
/// Cuts on a grapheme boundary, preferring the last whitespace inside the
/// budget so words stay whole. Text already within the limit is returned
/// unchanged. The result never exceeds `limit` characters.
#[must_use]
pub fn truncate_with_ellipsis(text: &str, limit: usize) -> String {
    const ELLIPSIS: &str = "...";

    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit <= ELLIPSIS.len() {
        return truncate_str(ELLIPSIS, limit);
    }

    let budget = limit - ELLIPSIS.len();
    let mut cut = 0;
    let mut used = 0;
    let mut last_space = None;
    for (idx, grapheme) in text.grapheme_indices(true) {
        let width = grapheme.chars().count();
        if used + width > budget {
            break;
        }
        if grapheme.chars().all(char::is_whitespace) {
            last_space = Some(idx);
        }
        used += width;
        cut = idx + grapheme.len();
    }

    // Only back off to a word boundary when it keeps most of the budget.
    let end = match last_space {
        Some(space) if space * 2 >= cut => space,
        _ => cut,
    };

    let mut out = text[..end].trim_end().to_string();
    out.push_str(ELLIPSIS);
    out
}

/// Retry a transport operation with exponential backoff.
///
/// Used for Telegram file downloads and media backend calls that may fail
/// on transient network errors. Delays start at 500ms, cap at 4s, with
/// jitter, for up to 3 retries (see `config.rs`).
///
/// # Errors
///
/// Returns the last error once every attempt has failed.
pub async fn retry_transport_operation<F, Fut, T, E>(operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    use crate::config::{
        TRANSPORT_INITIAL_BACKOFF_MS, TRANSPORT_MAX_BACKOFF_MS, TRANSPORT_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TRANSPORT_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TRANSPORT_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TRANSPORT_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Transport operation failed after {} attempts: {}",
            TRANSPORT_MAX_RETRIES + 1,
            e
        );
        e
    })
}
