use crate::bot::handlers::{self, get_user_id_safe, Command};
use crate::bot::{TelegramDeliveryChannel, UnauthorizedCache};
use crate::config::{
    get_unauthorized_cache_max_size, get_unauthorized_cache_ttl, get_unauthorized_cooldown,
    BotSettings,
};
use pastpaper_core::config::ScraperSettings;
use pastpaper_core::extract::SelectorExtractor;
use pastpaper_core::fetcher::HttpFetcher;
use pastpaper_core::{PastPaperCatalog, ReplyRouter, SelectionController};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{error, info};

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let bot = Bot::new(settings.telegram.telegram_token.clone());
    let controller = init_controller(&bot, &settings.scraper);
    let unauthorized_cache = init_unauthorized_cache();

    if settings.telegram.allowed_users().is_empty() {
        info!("No allow-list configured; the bot is open to everyone.");
    }

    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, controller, unauthorized_cache])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn init_controller(bot: &Bot, settings: &Arc<ScraperSettings>) -> SelectionController {
    let fetcher = match HttpFetcher::new(settings) {
        Ok(f) => Arc::new(f),
        Err(e) => {
            error!("Failed to initialize HTTP fetcher: {}", e);
            std::process::exit(1);
        }
    };
    let extractor = match SelectorExtractor::from_settings(settings) {
        Ok(x) => Arc::new(x),
        Err(e) => {
            error!("Failed to initialize page extractor: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Scraper initialized (site: {}, file host: {})",
        settings.search_base_url, settings.file_host_domain
    );

    let catalog = PastPaperCatalog::new(fetcher, extractor, settings);
    let channel = Arc::new(TelegramDeliveryChannel::new(bot.clone()));
    SelectionController::new(catalog, channel, Arc::new(ReplyRouter::new()), settings)
}

fn init_unauthorized_cache() -> Arc<UnauthorizedCache> {
    let cooldown = get_unauthorized_cooldown();
    let ttl = get_unauthorized_cache_ttl();
    let max_size = get_unauthorized_cache_max_size();

    info!(
        "Initializing UnauthorizedCache (cooldown: {}s, ttl: {}s, max_size: {})",
        cooldown, ttl, max_size
    );

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
            .branch(dptree::endpoint(handle_reply)),
        )
        // Everyone not admitted above
        .branch(dptree::endpoint(handle_unauthorized))
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
        .map(|u| u.first_name.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    if cache.should_send(user_id, &user_name).await {
        info!(
            "⛔️ Unauthorized access from user {} ({}). Sending denial message.",
            user_id, user_name
        );

        if let Err(e) = bot.send_message(msg.chat.id, "⛔️ Access denied").await {
            error!("Failed to send access denied message to {}: {}", user_id, e);
        } else {
            cache.mark_sent(user_id).await;
        }
    }

    respond(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    controller: SelectionController,
) -> Result<(), teloxide::RequestError> {
    match cmd {
        Command::Start | Command::Help => {
            if let Err(e) = handlers::help(bot, msg).await {
                error!("Command error: {}", e);
            }
        }
        Command::Pastpaper(query) => handlers::pastpaper(bot, msg, query, controller),
    }
    respond(())
}

async fn handle_reply(
    msg: Message,
    controller: SelectionController,
) -> Result<(), teloxide::RequestError> {
    handlers::reply(msg, controller).await;
    respond(())
}
