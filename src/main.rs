use std::sync::Arc;

use futures::StreamExt;

use kabo_bot::config::BotConfig;
use kabo_bot::flows::FlowContext;
use kabo_bot::records::RecordStore;
use kabo_bot::router::Router;
use kabo_bot::store::LibSqlRepository;
use kabo_bot::telegram::TelegramBot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(BotConfig::from_env()?);

    eprintln!("🤖 Kabo v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Admins: {}", config.admin_ids.len());

    let repo = Arc::new(LibSqlRepository::open(&config.db_path).await?);
    let records = Arc::new(RecordStore::new(repo, config.cache_ttl));

    let bot = Arc::new(TelegramBot::new(config.bot_token.clone()));
    let router = Arc::new(Router::new(FlowContext {
        records,
        messenger: Arc::clone(&bot) as Arc<dyn kabo_bot::messenger::Messenger>,
        config,
    }));

    let mut updates = bot.updates();
    while let Some(update) = updates.next().await {
        // Each update is dispatched on its own task; the router's per-user
        // locks keep one user's conversation ordered while a broadcast for
        // another user runs to completion.
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            router.dispatch(&update.user_id, update.event).await;
        });
    }

    Ok(())
}
