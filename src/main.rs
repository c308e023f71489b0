//! # MoMo Bot
//!
//! Telegram bot that sends each subscriber a daily excess-mortality report
//! from the MoMo dataset.
//!
//! Usage:
//!   momo-bot                        # Run the bot
//!   momo-bot --config ./momo.toml   # Custom config file
//!   momo-bot --once 123456          # Print one user's report and exit
//!   momo-bot --refresh-now          # Download the dataset instead of using the cache

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use momo_channels::{IncomingMessage, TelegramChannel};
use momo_core::{MomoConfig, UserId};
use momo_data::{DatasetSource, DatasetStore, HttpCsvSource};
use momo_scheduler::refresh;
use momo_scheduler::{Dispatcher, JobScheduler, SchedulerDb, SelectionRegistry, spawn_scheduler};

use handlers::Bot;

#[derive(Parser)]
#[command(
    name = "momo-bot",
    version,
    about = "📈 MoMo Bot: daily excess-mortality notifications"
)]
struct Cli {
    /// Config file (default: ~/.momo/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the on-demand report for one user and exit
    #[arg(long, value_name = "USER_ID")]
    once: Option<String>,

    /// Download the dataset at startup instead of reading the cache
    #[arg(long)]
    refresh_now: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "momo_bot=debug,momo_core=debug,momo_data=debug,momo_scheduler=debug,momo_channels=debug"
    } else {
        "momo_bot=info,momo_core=info,momo_data=info,momo_scheduler=info,momo_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => MomoConfig::load_from(path)?,
        None => MomoConfig::load()?,
    }
    .with_env_overrides();

    let tz = config.schedule.tz()?;
    let default_time = config.schedule.default_time()?;

    // Durable state
    let db_path = config.storage.path();
    let db = Arc::new(SchedulerDb::open(&db_path)?);
    tracing::info!("🗄️ Database: {}", db_path.display());
    let scheduler = Arc::new(JobScheduler::new(db.clone(), tz, default_time));
    let registry = Arc::new(SelectionRegistry::new(db.clone(), scheduler.clone(), default_time));

    // Dataset
    let store = Arc::new(DatasetStore::new());
    let source: Arc<dyn DatasetSource> = Arc::new(HttpCsvSource::new(
        &config.dataset.url,
        &config.dataset.cache_path(),
        config.dataset.timeout_secs,
    ));
    if cli.refresh_now {
        refresh::refresh_once(&store, source.as_ref()).await;
    } else {
        refresh::load_initial(&store, source.as_ref()).await;
    }

    let channel = TelegramChannel::new(&config.bot);
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        store.clone(),
        Arc::new(channel.clone()),
        tz,
    ));

    // --once: print a report and exit
    if let Some(user) = cli.once {
        let report = dispatcher
            .report_at(&UserId::new(user), dispatcher.today())?
            .into_result()?;
        println!("{}", report.render());
        return Ok(());
    }

    if config.bot.bot_token.is_empty() {
        anyhow::bail!(
            "No bot token configured. Set BOT_TOKEN or [bot].bot_token in {}",
            cli.config
                .unwrap_or_else(MomoConfig::default_path)
                .display()
        );
    }

    scheduler.reconcile_on_startup(&db.enabled_subscriptions(default_time)?)?;

    match channel.get_me().await {
        Ok(me) => tracing::info!(
            "🤖 Telegram bot: @{} ({})",
            me.username.as_deref().unwrap_or("unknown"),
            me.first_name
        ),
        Err(e) => tracing::warn!("⚠️ Could not reach Telegram: {e}"),
    }

    // Background loops
    tokio::spawn(refresh::spawn_refresh_loop(
        store.clone(),
        source.clone(),
        config.dataset.refresh_time()?,
        tz,
    ));

    let fire_dispatcher = dispatcher.clone();
    tokio::spawn(spawn_scheduler(
        scheduler.clone(),
        move |user| {
            let dispatcher = fire_dispatcher.clone();
            async move { dispatcher.fire(&user).await.map(|_| ()) }
        },
        config.schedule.tick_secs,
    ));

    // Command loop
    let bot = Bot::new(registry, dispatcher);
    let mut updates = channel.clone().start_polling();
    tracing::info!("🚀 MoMo Bot running (zone {tz})");

    loop {
        tokio::select! {
            incoming = updates.next() => {
                let Some(msg) = incoming else {
                    tracing::warn!("Telegram update stream ended");
                    break;
                };
                let bot = bot.clone();
                let channel = channel.clone();
                tokio::spawn(async move { handle_message(&bot, &channel, msg).await });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("👋 Shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_message(bot: &Bot, channel: &TelegramChannel, msg: IncomingMessage) {
    let command = momo_channels::parse(&msg.text);
    tracing::debug!(
        "💬 {} from {} ({}): {:?}",
        msg.text,
        msg.sender_name.as_deref().unwrap_or("unknown"),
        msg.user,
        command
    );

    let replies = match bot.handle(&msg.user, command) {
        Ok(replies) => replies,
        Err(e) => {
            tracing::error!("❌ Command failed for user {}: {e}", msg.user);
            return;
        }
    };

    for reply in replies {
        if let Err(e) = channel.reply(msg.chat_id, &reply).await {
            tracing::warn!("⚠️ Reply to user {} failed: {e}", msg.user);
        }
    }
}
