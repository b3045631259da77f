//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `callback_token`: Encodes and decodes inline button payloads
//! - `cart`: Conversation-scoped cart lines
//! - `favorites`: Conversation-scoped favorite products
//! - `dialogue_manager`: The flow state machine
//! - `ui_builder`: Renders screens into text and keyboards
//! - `transport`: Outbound Bot API calls and failure policies
//! - `update`: Inbound update payloads
//! - `message_handler` / `callback_handler`: Per-event entry points

pub mod callback_handler;
pub mod callback_token;
pub mod cart;
pub mod dialogue_manager;
pub mod favorites;
pub mod message_handler;
pub mod transport;
pub mod ui_builder;
pub mod update;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::catalog::GuardedCatalog;
use crate::config::BotConfig;
use crate::conversation_store::ConversationStore;

pub use callback_handler::callback_handler;
pub use dialogue_manager::{Event, FlowRouter, Reply, Sender};
pub use message_handler::message_handler;
pub use transport::{Delivery, SimulatedTransport, TelegramTransport, Transport};
pub use update::Update;

/// Everything needed to process updates
pub struct BotEngine {
    store: Arc<ConversationStore>,
    router: FlowRouter,
    delivery: Delivery,
}

impl BotEngine {
    pub fn new(store: Arc<ConversationStore>, router: FlowRouter, delivery: Delivery) -> Self {
        Self {
            store,
            router,
            delivery,
        }
    }

    /// Wire an engine from configuration
    pub fn from_config(config: &BotConfig, catalog: Arc<GuardedCatalog>, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(ConversationStore::new(config.conversation_ttl, config.max_conversations));
        let delivery = Delivery::new(transport, transport::failure_policy(config), config.transport_timeout);
        Self::new(store, FlowRouter::new(catalog), delivery)
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn router(&self) -> &FlowRouter {
        &self.router
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Dispatch one update to the matching handler
    ///
    /// Update kinds other than messages and callback queries are ignored.
    pub async fn handle_update(&self, update: &Update) {
        if let Some(q) = &update.callback_query {
            callback_handler(self, q).await;
        } else if let Some(msg) = &update.message {
            message_handler(self, msg).await;
        } else {
            debug!(update_id = update.update_id, "Ignoring update without message or callback");
        }
    }

    /// Periodically drop idle conversations
    pub fn spawn_eviction(&self, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.evict_expired();
            }
        })
    }
}
