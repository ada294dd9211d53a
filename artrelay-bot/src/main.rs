//! artrelay-bot - Artwork Relay Service
//!
//! Ingests artwork URLs submitted over Telegram, runs the normalization
//! pipeline, and publishes batched media groups to the curated channel.

use anyhow::Result;
use artrelay_bot::{commands, AppState};
use artrelay_common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting artrelay-bot");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    info!("Database: {}", config.db_path.display());
    info!("Channel: {}", config.channel);

    let state = AppState::init(config).await?;

    // Finish the continuation a restart left behind, then bootstrap admins
    commands::recover_pending(&state).await?;
    commands::refresh_admins(&state).await;
    match state.bot.get_me().await {
        Ok(me) => info!("Authorized as {}", me.display_name()),
        Err(e) => warn!(error = %e, "getMe failed; check the bot token"),
    }

    run_polling(state).await
}

/// Long-polling loop. Each update is handled on its own task so inbound
/// events interleave freely; the loop itself only tracks the offset.
async fn run_polling(state: Arc<AppState>) -> Result<()> {
    let mut offset = 0i64;
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                info!("Shutting down");
                return Ok(());
            }
            updates = state.bot.get_updates(offset) => match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        tokio::spawn(commands::handle_update(state.clone(), update));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, retrying");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}
