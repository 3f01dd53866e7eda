#![allow(clippy::result_large_err)]

mod bot;
mod cache;
mod commands;
mod config;
mod data;
mod errors;
mod models;
mod sheets;
mod tasks;

use crate::data::DataManager;
use crate::errors::{Error, Result};
use crate::sheets::{SheetsApi, SheetsClient};
use dotenvy::dotenv;
use std::{env, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file (as early as possible)
    dotenv().ok(); // Make it non-fatal, env vars can be set externally
    info!("Attempted to load .env file.");

    // 3. Load the main application configuration
    let app_config = config::load_app_configuration()
        .inspect_err(|e| error!("Critical error loading application configuration: {}", e))?;
    info!("Successfully processed application configuration.");

    // 4. Build the spreadsheet backend and the data manager
    let access_token = env::var("SHEETS_ACCESS_TOKEN")
        .inspect_err(|e| error!("SHEETS_ACCESS_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;
    let api: Arc<dyn SheetsApi> = Arc::new(SheetsClient::new(access_token));

    let app_config = Arc::new(app_config);
    let manager = Arc::new(DataManager::new(
        api,
        app_config.members_sheet(),
        app_config.passages_sheet(),
        Duration::from_secs(app_config.cache_ttl_secs),
    ));

    // 5. Warm the passage pricing table before going online. A failure is
    // not fatal; the background refresh will retry.
    if manager.load_passages(false).await {
        info!("Initial passage data loaded.");
    } else {
        warn!("Initial passage data load failed; continuing without it.");
    }

    // 6. Run the bot
    // DISCORD_BOT_TOKEN is loaded here, directly before use, not stored in AppConfig
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;

    bot::run_bot(token, Arc::clone(&app_config), Arc::clone(&manager))
        .await
        .map_err(Error::from)?;

    Ok(())
}
