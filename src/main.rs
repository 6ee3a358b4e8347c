use anyhow::{Context, Result};
use shipment_admin_bot::bot::{self, AdminContext};
use shipment_admin_bot::config::AppConfig;
use shipment_admin_bot::db::{self, PgShipmentRepository};
use shipment_admin_bot::dialogue::{AdminDialogue, AdminDialogueState};
use shipment_admin_bot::notifications::HttpNotifier;
use shipment_admin_bot::observability::{self, ReadinessProbe};
use shipment_admin_bot::rate_limiter::RateLimiter;
use shipment_admin_bot::shipments::ShipmentService;
use shipment_admin_bot::store::{keys, KeyValueStore, MemoryStore, RedisStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use tracing::{info, warn};

/// How long the route templates stay cached for the web application
const ROUTE_TEMPLATES_TTL: Duration = Duration::from_secs(86400);

/// Redis when configured, otherwise a process-local store
fn open_store(config: &AppConfig) -> Result<Arc<dyn KeyValueStore>> {
    match &config.store.redis_url {
        Some(url) => {
            let store = RedisStore::open(url).context("Failed to configure Redis client")?;
            info!("Using Redis key-value store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("REDIS_URL not set; using in-memory store. Rate limits and caches are not shared with the web application");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Publish route templates for the web application. Failure only loses the cache.
async fn cache_route_templates(store: &dyn KeyValueStore, config: &AppConfig) {
    let templates = match serde_json::to_string(&config.admin.route_templates) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize route templates");
            return;
        }
    };
    match store
        .set_ex(keys::ROUTE_TEMPLATES, &templates, ROUTE_TEMPLATES_TTL)
        .await
    {
        Ok(()) => info!(routes = config.admin.route_templates.len(), "Route templates cached"),
        Err(e) => warn!(error = %e, "Failed to cache route templates"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    config.validate()?;

    let metrics_handle = observability::init_observability(&config.observability)?;
    info!("{}", config.summary());
    info!(webhook_url = %config.bot.webhook_url, "Using long polling; webhook URL is informational");

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    // Initialize database schema
    db::init_database_schema(&pool).await?;

    let store = open_store(&config)?;
    if let Err(e) = store.ping().await {
        warn!(error = %e, "Key-value store unreachable at startup; continuing with fail-open behavior");
    }
    cache_route_templates(store.as_ref(), &config).await;

    observability::start_observability_servers(
        &config.observability,
        metrics_handle,
        ReadinessProbe {
            db_pool: Some(pool.clone()),
            store: Some(Arc::clone(&store)),
            bot_token: Some(config.bot.token.clone()),
        },
    )
    .await?;

    let notifier = HttpNotifier::new(
        &config.bot.websocket_server,
        Duration::from_secs(config.bot.notification_timeout_secs),
        Arc::clone(&store),
    )?;
    let service = ShipmentService::new(
        Arc::new(PgShipmentRepository::new(pool)),
        Arc::clone(&store),
        Arc::new(notifier),
        Arc::new(config.admin.clone()),
        config.smtp.from.clone(),
    );
    let rate_limiter = RateLimiter::from_config(Arc::clone(&store), &config.rate_limit);
    let ctx = Arc::new(AdminContext::new(service, rate_limiter));

    // Initialize the bot with custom client configuration for better reliability
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.bot.http_timeout_secs))
        .build()
        .context("Failed to create HTTP client")?;

    let bot = Bot::with_client(config.bot.token.clone(), client);

    info!(
        timeout_secs = config.bot.http_timeout_secs,
        admins = config.admin.allowed_admins.len(),
        "Bot initialized, starting dispatcher"
    );

    // Create shared dialogue storage
    let dialogue_storage = InMemStorage::<AdminDialogueState>::new();

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let ctx = Arc::clone(&ctx);
            let storage = dialogue_storage.clone();
            move |bot: Bot, msg: Message| {
                let ctx = Arc::clone(&ctx);
                let dialogue = AdminDialogue::new(storage.clone(), msg.chat.id);
                async move { bot::message_handler(bot, msg, ctx, dialogue).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let ctx = Arc::clone(&ctx);
            let storage = dialogue_storage.clone();
            move |bot: Bot, q: CallbackQuery| {
                let ctx = Arc::clone(&ctx);
                // Use the chat ID from the original message that contained the inline keyboard
                let chat_id = match &q.message {
                    Some(teloxide::types::MaybeInaccessibleMessage::Regular(msg)) => msg.chat.id,
                    _ => ChatId::from(q.from.id),
                };
                let dialogue = AdminDialogue::new(storage.clone(), chat_id);
                async move { bot::callback_handler(bot, q, ctx, dialogue).await }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
