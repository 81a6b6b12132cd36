use crate::bot::messaging::{send_long_message, send_reply};
use crate::bot::resilient::{download_file_resilient, send_message_resilient};
use crate::config::BotSettings;
use anyhow::{anyhow, Result};
use postpilot_core::agent::super_agent::ERROR_MESSAGE;
use postpilot_core::agent::{ImageAttachment, SuperAgent, UserTurn};
use postpilot_core::health::HealthReport;
use postpilot_core::media::{extension_for_mime, sniff_image_mime};
use postpilot_core::storage::ConversationStore;
use postpilot_core::utils::truncate_str;
use std::sync::Arc;
use teloxide::{
    prelude::*,
    types::{ChatAction, ParseMode},
    utils::command::BotCommands,
};
use tracing::{debug, error, info, warn};

const WELCOME_TEXT: &str = "🤖 **AI Social Media System**\n\n\
I can help you with:\n\
• Generate posts for X, LinkedIn, Instagram, YouTube, and School\n\
• Create multi-platform content simultaneously\n\
• Edit images from a caption instruction\n\n\
Just send me a message to get started!\n\n\
Use /help for more information.";

const HELP_TEXT: &str = "📖 **How to Use**\n\n\
**Creating Posts:**\n\
• Send a text prompt: 'Create a LinkedIn post about AI automation'\n\
• Request multiple platforms: 'Make posts for X and Instagram'\n\n\
**Images:**\n\
• Upload a photo with an instruction: 'Make the background blue'\n\
• Ask for a post about it: 'Write a LinkedIn post about this image'\n\
• Or both: 'Add a logo and create an Instagram post'\n\n\
**Commands:**\n\
• /clear - forget this conversation\n\
• /health - service status\n\n\
**Tips:**\n\
• Be specific with your requests\n\
• You can generate content for multiple platforms at once";

// Helper function to get user name from Message
fn get_user_name(msg: &Message) -> String {
    if let Some(ref user) = msg.from {
        if let Some(ref username) = user.username {
            return username.clone();
        }
        if !user.first_name.is_empty() {
            return user.first_name.clone();
        }
    }
    "Unknown".to_string()
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show usage
    #[command(description = "Show usage examples.")]
    Help,
    /// Delete the conversation with its history and image versions
    #[command(description = "Clear conversation history.")]
    Clear,
    /// Show the health report
    #[command(description = "Check bot health.")]
    Health,
}

/// Start handler
///
/// # Errors
///
/// Returns an error if the welcome message cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!(user_id, user_name = %get_user_name(&msg), "/start");
    send_long_message(&bot, msg.chat.id, WELCOME_TEXT).await
}

/// Help handler
///
/// # Errors
///
/// Returns an error if the help message cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    info!(user_id = get_user_id_safe(&msg), "/help");
    send_long_message(&bot, msg.chat.id, HELP_TEXT).await
}

/// Clear handler: cascade-deletes the caller's conversation
///
/// # Errors
///
/// Returns an error if the confirmation cannot be sent.
pub async fn clear(bot: Bot, msg: Message, store: Arc<dyn ConversationStore>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!(user_id, "Clearing conversation");

    let outcome = match store.find_conversation(user_id, msg.chat.id.0).await {
        Ok(Some(conversation)) => store
            .cascade_delete(conversation.id)
            .await
            .map(|()| "🗑 Conversation cleared."),
        Ok(None) => Ok("Nothing to clear."),
        Err(e) => Err(e),
    };

    let text = outcome.unwrap_or_else(|e| {
        error!(user_id, error = %e, "Error clearing conversation");
        "An error occurred while clearing the conversation."
    });
    send_message_resilient(&bot, msg.chat.id, text, None).await?;
    Ok(())
}

/// Health handler
///
/// # Errors
///
/// Returns an error if the report cannot be serialized or sent.
pub async fn health(bot: Bot, msg: Message, store: Arc<dyn ConversationStore>) -> Result<()> {
    let bot_ok = bot.get_me().await.is_ok();
    let db_ok = match store.check_connection().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Storage health check failed");
            false
        }
    };

    let report = HealthReport::from_checks(bot_ok, db_ok);
    info!(status = report.status, "Health check");
    let body = html_escape::encode_text(&report.to_json()?).into_owned();
    send_message_resilient(
        &bot,
        msg.chat.id,
        format!("<pre>{body}</pre>"),
        Some(ParseMode::Html),
    )
    .await?;
    Ok(())
}

/// Text message handler
///
/// # Errors
///
/// Returns an error if the reply cannot be delivered.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    store: Arc<dyn ConversationStore>,
    agent: Arc<SuperAgent>,
) -> Result<()> {
    let text = msg.text().unwrap_or_default().to_string();
    info!(
        user_id = get_user_id_safe(&msg),
        text = %truncate_str(&text, 100),
        "Handling text message"
    );
    run_turn(&bot, &msg, &store, &agent, Some(text), None).await
}

/// Photo message handler
///
/// # Errors
///
/// Returns an error if the photo is missing or the reply cannot be delivered.
pub async fn handle_photo(
    bot: Bot,
    msg: Message,
    store: Arc<dyn ConversationStore>,
    agent: Arc<SuperAgent>,
    settings: Arc<BotSettings>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let photo = msg
        .photo()
        .and_then(|sizes| sizes.last())
        .ok_or_else(|| anyhow!("No photo found"))?;

    let limit = settings.agent.max_image_size_bytes();
    if u64::from(photo.file.size) > limit {
        warn!(user_id, size = photo.file.size, limit, "Photo rejected: too large");
        let text = format!(
            "❌ Image is too large. Maximum size is {} MB.",
            settings.agent.max_image_size_mb
        );
        send_message_resilient(&bot, msg.chat.id, text, None).await?;
        return Ok(());
    }

    let _ = bot.send_chat_action(msg.chat.id, ChatAction::UploadPhoto).await;
    let bytes = match download_file_resilient(&bot, &photo.file.id).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(user_id, error = %e, "Photo download failed");
            send_message_resilient(&bot, msg.chat.id, ERROR_MESSAGE, None).await?;
            return Ok(());
        }
    };

    let mime = sniff_image_mime(&bytes).to_string();
    let image = ImageAttachment {
        file_name: format!(
            "telegram-{}-{}.{}",
            msg.chat.id.0,
            msg.id.0,
            extension_for_mime(&mime)
        ),
        bytes,
        mime,
    };
    info!(user_id, file_name = %image.file_name, "Handling photo");

    let caption = msg.caption().map(str::to_string);
    run_turn(&bot, &msg, &store, &agent, caption, Some(image)).await
}

async fn run_turn(
    bot: &Bot,
    msg: &Message,
    store: &Arc<dyn ConversationStore>,
    agent: &Arc<SuperAgent>,
    text: Option<String>,
    image: Option<ImageAttachment>,
) -> Result<()> {
    let user_id = get_user_id_safe(msg);
    let conversation = match store.get_or_create_conversation(user_id, msg.chat.id.0).await {
        Ok(conversation) => conversation,
        Err(e) => {
            error!(user_id, error = %e, "Could not load conversation");
            send_message_resilient(bot, msg.chat.id, ERROR_MESSAGE, None).await?;
            return Ok(());
        }
    };

    if let Err(e) = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await {
        debug!(error = %e, "Typing indicator failed");
    }

    let reply = agent
        .handle(UserTurn {
            conversation_id: conversation.id,
            user_id,
            text,
            image,
        })
        .await;
    send_reply(bot, msg.chat.id, &reply).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/start", "bot").ok(), Some(Command::Start));
        assert_eq!(Command::parse("/health", "bot").ok(), Some(Command::Health));
        assert_eq!(Command::parse("/clear", "bot").ok(), Some(Command::Clear));
        assert!(Command::parse("/unknown", "bot").is_err());
    }

    #[test]
    fn test_command_descriptions_list_every_command() {
        let text = Command::descriptions().to_string();
        for name in ["/start", "/help", "/clear", "/health"] {
            assert!(text.contains(name), "{name} missing from {text}");
        }
    }
}
