//! # Bot Runtime Module
//!
//! Owns the configuration and the engine for the lifetime of the process.
//! `init` is idempotent: the first successful call records the activation
//! time, later calls return it unchanged.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::bot::{BotEngine, SimulatedTransport, TelegramTransport, Transport, Update};
use crate::catalog::{CatalogLookup, GuardedCatalog};
use crate::config::BotConfig;
use crate::errors::{BotError, Result};

/// Shared state handed to the HTTP layer
pub type AppState = Arc<BotRuntime>;

pub struct BotRuntime {
    config: BotConfig,
    engine: BotEngine,
    activated_at: OnceLock<DateTime<Utc>>,
}

impl BotRuntime {
    /// Build a runtime whose transport follows `config.simulation`
    pub fn new(config: BotConfig, catalog: Arc<dyn CatalogLookup>) -> Self {
        let transport: Arc<dyn Transport> = if config.simulation {
            info!("Simulation mode: Bot API calls are recorded, not sent");
            Arc::new(SimulatedTransport::new())
        } else {
            Arc::new(TelegramTransport::new(
                config.telegram_bot_token.clone().unwrap_or_default(),
                &config.telegram_api_url,
            ))
        };
        Self::with_transport(config, catalog, transport)
    }

    /// Build a runtime around an explicit transport
    pub fn with_transport(config: BotConfig, catalog: Arc<dyn CatalogLookup>, transport: Arc<dyn Transport>) -> Self {
        let catalog = Arc::new(GuardedCatalog::new(
            catalog,
            config.catalog_timeout,
            config.recovery.clone(),
        ));
        let engine = BotEngine::from_config(&config, catalog, transport);
        Self {
            config,
            engine,
            activated_at: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn engine(&self) -> &BotEngine {
        &self.engine
    }

    /// Fail with a configuration error unless the bot can talk to Telegram
    pub fn ensure_configured(&self) -> Result<()> {
        if self.config.simulation {
            return Ok(());
        }
        self.config.require_token().map(|_| ())
    }

    /// Activate the runtime; safe to call any number of times
    pub fn init(&self) -> Result<DateTime<Utc>> {
        self.ensure_configured()?;
        Ok(*self.activated_at.get_or_init(|| {
            info!(
                simulation = self.config.simulation,
                webhook_url = %self.config.webhook_url(),
                "Bot runtime activated"
            );
            Utc::now()
        }))
    }

    pub fn is_active(&self) -> bool {
        self.activated_at.get().is_some()
    }

    pub fn activated_at(&self) -> Option<DateTime<Utc>> {
        self.activated_at.get().copied()
    }

    /// Parse and process one raw webhook body
    pub async fn process_update(&self, body: &[u8]) -> Result<()> {
        self.init()?;
        let update: Update = serde_json::from_slice(body)
            .map_err(|e| BotError::Internal(format!("update is not valid JSON: {e}")))?;
        debug!(update_id = update.update_id, "Processing update");
        self.engine.handle_update(&update).await;
        Ok(())
    }
}
