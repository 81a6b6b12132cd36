use crate::bot;
use crate::bot::handlers::{get_user_id_safe, Command};
use crate::bot::UnauthorizedCache;
use crate::config::{
    get_unauthorized_cache_max_size, get_unauthorized_cache_ttl, get_unauthorized_cooldown,
    BotSettings,
};
use anyhow::Result;
use postpilot_core::agent::SuperAgent;
use postpilot_core::storage::{ConversationStore, InMemoryStore, R2Storage};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{error, info, warn};

/// Run the Telegram transport runtime until Ctrl-C.
///
/// # Errors
///
/// Returns an error if storage or the agent cannot be initialized.
pub async fn run_bot(settings: Arc<BotSettings>) -> Result<()> {
    let store = init_storage(&settings).await?;

    let agent = Arc::new(SuperAgent::from_settings(
        settings.agent.as_ref(),
        Arc::clone(&store),
    )?);
    info!(
        image_editing = agent.image_editing_enabled(),
        classifier = ?settings.agent.intent_classifier,
        "Super agent initialized."
    );

    if settings.telegram.is_open() {
        warn!("ALLOWED_USERS is empty: the bot answers every Telegram user.");
    }

    let bot = Bot::new(settings.telegram.telegram_token.clone());
    let unauthorized_cache = init_unauthorized_cache();
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![store, agent, settings, unauthorized_cache])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

async fn init_storage(settings: &BotSettings) -> Result<Arc<dyn ConversationStore>> {
    if !settings.agent.is_r2_enabled() {
        warn!("R2 is not configured; conversations are kept in memory only.");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let storage = R2Storage::new(settings.agent.as_ref()).await?;
    info!("R2 Storage initialized.");
    if let Err(e) = storage.check_connection().await {
        error!(error = %e, "R2 Storage connection check returned error.");
    }
    Ok(Arc::new(storage))
}

fn init_unauthorized_cache() -> Arc<UnauthorizedCache> {
    let cooldown = get_unauthorized_cooldown();
    let ttl = get_unauthorized_cache_ttl();
    let max_size = get_unauthorized_cache_max_size();

    info!(cooldown, ttl, max_size, "Initializing UnauthorizedCache");
    Arc::new(UnauthorizedCache::new(cooldown, ttl, max_size))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::filter(|msg: Message, settings: Arc<BotSettings>| {
                settings.telegram.is_allowed(get_user_id_safe(&msg))
            })
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(handle_command),
            )
            .branch(
                dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo),
            )
            .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text)),
        )
        .branch(
            dptree::filter(|msg: Message, settings: Arc<BotSettings>| {
                !settings.telegram.is_allowed(get_user_id_safe(&msg))
            })
            .endpoint(handle_unauthorized),
        )
}

async fn handle_unauthorized(
    bot: Bot,
    msg: Message,
    cache: Arc<UnauthorizedCache>,
) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    let user_name = msg
        .from
        .as_ref()
        .map_or_else(|| "Unknown".to_string(), |u| u.first_name.clone());

    if cache.should_send(user_id, &user_name).await {
        info!(user_id, user_name = %user_name, "Unauthorized access, sending denial");
        match bot.send_message(msg.chat.id, "⛔️ Access denied").await {
            Ok(_) => cache.mark_sent(user_id).await,
            Err(e) => error!(user_id, error = %e, "Failed to send access denied message"),
        }
    }
    respond(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    store: Arc<dyn ConversationStore>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
        Command::Help => bot::handlers::help(bot, msg).await,
        Command::Clear => bot::handlers::clear(bot, msg, store).await,
        Command::Health => bot::handlers::health(bot, msg, store).await,
    };
    if let Err(e) = res {
        error!(error = %e, "Command error");
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    store: Arc<dyn ConversationStore>,
    agent: Arc<SuperAgent>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_text(bot, msg, store, agent).await {
        error!(error = %e, "Text handler error");
    }
    respond(())
}

async fn handle_photo(
    bot: Bot,
    msg: Message,
    store: Arc<dyn ConversationStore>,
    agent: Arc<SuperAgent>,
    settings: Arc<BotSettings>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_photo(bot, msg, store, agent, settings).await {
        error!(error = %e, "Photo handler error");
    }
    respond(())
}
