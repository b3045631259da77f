//! # Ziggler Storefront Bot
//!
//! Conversational shopping flow for the Ziggler Telegram bot: catalog
//! browsing, size and color selection and a conversation-scoped cart,
//! served behind a Telegram webhook.

pub mod bot;
pub mod catalog;
pub mod circuit_breaker;
pub mod config;
pub mod conversation_store;
pub mod dialogue;
pub mod errors;
pub mod localization;
pub mod runtime;
pub mod webhook;
