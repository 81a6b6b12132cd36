//! Telegram rendering of agent replies.
//!
//! Replies use `**bold**` markup; Telegram receives HTML. Long replies are
//! formatted line by line and split on the formatted length, so escaping never
//! pushes a part past the limit and no tag spans two messages.

use anyhow::Result;
use lazy_regex::regex_replace_all;
use postpilot_core::agent::AssistantReply;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, ParseMode};
use tracing::warn;

use super::resilient::send_message_resilient;

/// Maximum formatted message length for Telegram with safety margin.
/// The official limit is 4096.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

/// Escape HTML and turn `**bold**` into `<b>bold</b>`
///
/// # Examples
///
/// ```
/// use postpilot_transport_telegram::bot::messaging::format_text;
/// assert_eq!(format_text("**X** <3"), "<b>X</b> &lt;3");
/// ```
#[must_use]
pub fn format_text(text: &str) -> String {
    let escaped = html_escape::encode_text(text);
    regex_replace_all!(r"\*\*([^*\n]+?)\*\*", escaped.as_ref(), |_, inner| {
        format!("<b>{inner}</b>")
    })
    .into_owned()
}

/// Characters `c` occupies once HTML-escaped
const fn escaped_width(c: char) -> usize {
    match c {
        '&' => 5,
        '<' | '>' => 4,
        _ => 1,
    }
}

/// Format one line, cutting it into pieces that each fit `max_chars`.
///
/// Bold markup is only converted on lines that fit whole.
fn format_line(line: &str, max_chars: usize) -> Vec<String> {
    let formatted = format_text(line);
    if formatted.chars().count() <= max_chars {
        return vec![formatted];
    }

    let mut pieces = Vec::new();
    let mut chunk = String::new();
    let mut chunk_len = 0;
    for c in line.chars() {
        let width = escaped_width(c);
        if chunk_len > 0 && chunk_len + width > max_chars {
            pieces.push(html_escape::encode_text(&chunk).into_owned());
            chunk.clear();
            chunk_len = 0;
        }
        chunk.push(c);
        chunk_len += width;
    }
    if !chunk.is_empty() {
        pieces.push(html_escape::encode_text(&chunk).into_owned());
    }
    pieces
}

/// Format `message` as Telegram HTML in parts of at most `max_chars`
/// characters each.
///
/// Breaks at line boundaries where possible; a single line longer than the
/// limit is cut by characters.
#[must_use]
pub fn format_message_parts(message: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in message.lines().flat_map(|line| format_line(line, max_chars)) {
        let piece_len = piece.chars().count();
        if current_len > 0 && current_len + 1 + piece_len > max_chars {
            parts.push(current.trim_end().to_string());
            current.clear();
            current_len = 0;
        }
        if current_len > 0 {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(&piece);
        current_len += piece_len;
    }

    if !current.trim().is_empty() {
        parts.push(current.trim_end().to_string());
    }
    parts
}

/// Sends a long message as multiple HTML parts.
///
/// # Errors
///
/// Returns an error if any part fails to send after retries.
pub async fn send_long_message(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    for part in format_message_parts(text, TELEGRAM_MESSAGE_LIMIT) {
        send_message_resilient(bot, chat_id, part, Some(ParseMode::Html)).await?;
    }
    Ok(())
}

/// Deliver an agent reply: the text, then each produced image.
///
/// An image Telegram cannot fetch is sent as a plain link instead.
///
/// # Errors
///
/// Returns an error if the text or a fallback link cannot be sent.
pub async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &AssistantReply) -> Result<()> {
    send_long_message(bot, chat_id, &reply.text).await?;

    for url in &reply.media {
        let sent = match url.parse().map(InputFile::url) {
            Ok(photo) => bot
                .send_photo(chat_id, photo)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("invalid URL: {e}")),
        };
        if let Err(e) = sent {
            warn!(error = %e, "Photo delivery failed, sending link");
            send_message_resilient(bot, chat_id, format!("🖼 {url}"), None).await?;
        }
    }
    Ok(())
}
