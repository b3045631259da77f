use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ziggler_bot::catalog::{CatalogLookup, InMemoryCatalog};
use ziggler_bot::config::BotConfig;
use ziggler_bot::localization::init_localization;
use ziggler_bot::runtime::BotRuntime;
use ziggler_bot::webhook;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting Ziggler storefront bot");

    let config = BotConfig::from_env().context("invalid configuration")?;
    if config.telegram_bot_token.is_none() && !config.simulation {
        // requests are answered with 500 until the token is set
        warn!("TELEGRAM_BOT_TOKEN is not set");
    }

    init_localization()?;

    let catalog: Arc<dyn CatalogLookup> = match &config.catalog_path {
        Some(path) => {
            info!(path = %path, "Loading catalog from file");
            Arc::new(InMemoryCatalog::from_json_file(path).with_context(|| format!("failed to load catalog {path}"))?)
        }
        None => Arc::new(InMemoryCatalog::seeded()),
    };

    let eviction_interval = config.eviction_interval;
    let runtime = Arc::new(BotRuntime::new(config, catalog));
    let sweeper = runtime.engine().spawn_eviction(eviction_interval);

    let served = webhook::serve(Arc::clone(&runtime)).await;
    sweeper.abort();
    served.context("webhook server failed")?;

    Ok(())
}
