//! Telegram API calls wrapped in the shared transport retry policy.

use anyhow::Result;
use bytes::Bytes;
use postpilot_core::utils::retry_transport_operation;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId, Message, ParseMode};

/// Send a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = text.into();
    retry_transport_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Download a Telegram file with automatic retry.
///
/// # Errors
///
/// Returns an error if the file cannot be resolved or downloaded.
pub async fn download_file_resilient(bot: &Bot, file_id: &FileId) -> Result<Bytes> {
    retry_transport_operation(|| async {
        let file = bot.get_file(file_id.clone()).await?;
        let mut buf = Vec::new();
        bot.download_file(&file.path, &mut buf).await?;
        Ok::<_, anyhow::Error>(Bytes::from(buf))
    })
    .await
}
