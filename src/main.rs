mod app;
mod config;
mod health;
mod platform;
mod rates;
mod reconciler;
mod render;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::platform::telegram::TelegramSink;
use crate::rates::RateFetcher;
use crate::reconciler::{Reconciler, Trigger};
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kursbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Channel: {}", config.telegram.channel_id);
    info!("  Update interval: {}s", config.rates.update_interval_secs);
    info!("  Health port: {}", config.health.port);

    let utc_offset = FixedOffset::east_opt(config.rates.utc_offset_hours * 3600)
        .context("utc_offset_hours is out of range")?;

    let bot = Bot::new(&config.telegram.bot_token);
    let channel = ChatId(config.telegram.channel_id);

    let fetcher = RateFetcher::new(config.rates.clone())?;
    let sink = TelegramSink::new(bot.clone());
    let reconciler = Reconciler::new(sink, channel, utc_offset);
    let state = Arc::new(AppState::new(fetcher, channel, reconciler));

    // Liveness endpoint for the hosting platform's probe
    let health_port = config.health.port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_port).await {
            error!("Health endpoint failed: {:#}", e);
        }
    });

    // First update on startup, before the timer takes over
    state.run_cycle(Trigger::Tick).await;

    let sched = Scheduler::new().await?;
    let tick_state = state.clone();
    sched
        .add_interval_job(
            Duration::from_secs(config.rates.update_interval_secs),
            "rate-update",
            move || {
                let state = tick_state.clone();
                Box::pin(async move {
                    state.run_cycle(Trigger::Tick).await;
                })
            },
        )
        .await?;
    sched.start().await?;

    // Watch the channel until shutdown
    info!("Bot is starting...");
    platform::telegram::run(bot, state).await?;

    Ok(())
}
