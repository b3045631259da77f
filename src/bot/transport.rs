//! Transport module: outbound Bot API calls
//!
//! The flow engine only talks to the `Transport` trait. `TelegramTransport`
//! sends through a teloxide `Bot`, `SimulatedTransport` records calls in a
//! bounded in-memory log. `Delivery` wraps either one with a deadline and a
//! failure policy.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, CallbackQueryId, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tracing::{debug, error, info, warn};

use crate::bot::ui_builder::Menu;
use crate::config::{BotConfig, FailurePolicyKind, RecoveryConfig};
use crate::errors::TransportError;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Calls kept by `SimulatedTransport` before the oldest are dropped
pub const SIMULATED_LOG_CAPACITY: usize = 256;

/// Outbound messaging seam
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat_id: i64, menu: &Menu) -> TransportResult<()>;

    async fn edit_message(&self, chat_id: i64, message_id: i64, menu: &Menu) -> TransportResult<()>;

    /// Answer a callback query, optionally with a toast
    async fn acknowledge_callback(&self, callback_id: &str, text: Option<&str>) -> TransportResult<()>;

    async fn set_webhook(&self, url: &str) -> TransportResult<Value>;

    async fn delete_webhook(&self) -> TransportResult<Value>;

    async fn webhook_info(&self) -> TransportResult<Value>;
}

/// Map a teloxide failure onto the transport error taxonomy
pub fn transport_error(method: &str, error: RequestError) -> TransportError {
    let method = method.to_string();
    match error {
        RequestError::Api(api) => TransportError::Api {
            method,
            description: api.to_string(),
        },
        RequestError::RetryAfter(seconds) => TransportError::RateLimited {
            method,
            retry_after: seconds.duration(),
        },
        RequestError::MigrateToChatId(chat_id) => TransportError::Api {
            method,
            description: format!("chat migrated to supergroup {chat_id}"),
        },
        // teloxide redacts the token from network errors
        RequestError::Network(e) => TransportError::Network {
            method,
            message: e.to_string(),
        },
        RequestError::InvalidJson { source, .. } => TransportError::Network {
            method,
            message: format!("unparseable response: {source}"),
        },
        RequestError::Io(e) => TransportError::Network {
            method,
            message: e.to_string(),
        },
    }
}

/// Bot API client backed by teloxide
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// `api_url` replaces the public Bot API root, e.g. for a local Bot API server
    pub fn new(token: impl Into<String>, api_url: &str) -> Self {
        let bot = Bot::new(token);
        let bot = match reqwest::Url::parse(api_url) {
            Ok(url) => bot.set_api_url(url),
            Err(e) => {
                warn!(api_url, error = %e, "Invalid Bot API URL, using the default");
                bot
            }
        };
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

fn api_rejection(method: &str, description: String) -> TransportError {
    TransportError::Api {
        method: method.to_string(),
        description,
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(&self, chat_id: i64, menu: &Menu) -> TransportResult<()> {
        debug!(chat_id, "Calling sendMessage");
        self.bot
            .send_message(ChatId(chat_id), menu.text.clone())
            .parse_mode(ParseMode::Html)
            .reply_markup(menu.reply_markup())
            .await
            .map(|_| ())
            .map_err(|e| transport_error("sendMessage", e))
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, menu: &Menu) -> TransportResult<()> {
        let message_id = i32::try_from(message_id)
            .map_err(|_| api_rejection("editMessageText", format!("message id {message_id} out of range")))?;
        debug!(chat_id, message_id, "Calling editMessageText");

        let result = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), menu.text.clone())
            .parse_mode(ParseMode::Html)
            .reply_markup(menu.reply_markup())
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(RequestError::Api(ApiError::MessageNotModified)) => {
                debug!(chat_id, message_id, "Message already up to date");
                Ok(())
            }
            Err(e) => Err(transport_error("editMessageText", e)),
        }
    }

    async fn acknowledge_callback(&self, callback_id: &str, text: Option<&str>) -> TransportResult<()> {
        let mut request = self
            .bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()));
        if let Some(text) = text {
            request = request.text(text);
        }
        request
            .await
            .map(|_| ())
            .map_err(|e| transport_error("answerCallbackQuery", e))
    }

    async fn set_webhook(&self, url: &str) -> TransportResult<Value> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| api_rejection("setWebhook", format!("invalid webhook URL: {e}")))?;
        self.bot
            .set_webhook(url)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .await
            .map(|_| Value::Bool(true))
            .map_err(|e| transport_error("setWebhook", e))
    }

    async fn delete_webhook(&self) -> TransportResult<Value> {
        self.bot
            .delete_webhook()
            .await
            .map(|_| Value::Bool(true))
            .map_err(|e| transport_error("deleteWebhook", e))
    }

    async fn webhook_info(&self) -> TransportResult<Value> {
        let info = self
            .bot
            .get_webhook_info()
            .await
            .map_err(|e| transport_error("getWebhookInfo", e))?;
        serde_json::to_value(info).map_err(|e| TransportError::Network {
            method: "getWebhookInfo".to_string(),
            message: e.to_string(),
        })
    }
}

/// One call recorded by `SimulatedTransport`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCall {
    SendMessage { chat_id: i64, menu: Menu },
    EditMessage { chat_id: i64, message_id: i64, menu: Menu },
    AcknowledgeCallback { callback_id: String, text: Option<String> },
    SetWebhook { url: String },
    DeleteWebhook,
    WebhookInfo,
}

impl OutboundCall {
    /// The menu carried by a send or edit
    pub fn menu(&self) -> Option<&Menu> {
        match self {
            OutboundCall::SendMessage { menu, .. } | OutboundCall::EditMessage { menu, .. } => Some(menu),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedState {
    calls: VecDeque<OutboundCall>,
    webhook_url: Option<String>,
}

/// Transport that records calls instead of sending them
///
/// Only the most recent `capacity` calls are kept.
#[derive(Debug)]
pub struct SimulatedTransport {
    state: Mutex<SimulatedState>,
    capacity: usize,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::with_capacity(SIMULATED_LOG_CAPACITY)
    }
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(SimulatedState::default()),
            capacity: capacity.max(1),
        }
    }

    fn record(&self, call: OutboundCall) {
        info!(call = ?call, "Simulated Bot API call");
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.calls.len() == self.capacity {
            state.calls.pop_front();
        }
        state.calls.push_back(call);
    }

    /// Every retained call, oldest first
    pub fn calls(&self) -> Vec<OutboundCall> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .iter()
            .cloned()
            .collect()
    }

    /// Remove and return the recorded calls
    pub fn take_calls(&self) -> Vec<OutboundCall> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .drain(..)
            .collect()
    }

    /// The most recent menu sent or edited into `chat_id`
    pub fn last_menu(&self, chat_id: i64) -> Option<Menu> {
        self.calls()
            .into_iter()
            .rev()
            .find(|call| match call {
                OutboundCall::SendMessage { chat_id: id, .. } | OutboundCall::EditMessage { chat_id: id, .. } => {
                    *id == chat_id
                }
                _ => false,
            })
            .and_then(|call| call.menu().cloned())
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn send_message(&self, chat_id: i64, menu: &Menu) -> TransportResult<()> {
        self.record(OutboundCall::SendMessage {
            chat_id,
            menu: menu.clone(),
        });
        Ok(())
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, menu: &Menu) -> TransportResult<()> {
        self.record(OutboundCall::EditMessage {
            chat_id,
            message_id,
            menu: menu.clone(),
        });
        Ok(())
    }

    async fn acknowledge_callback(&self, callback_id: &str, text: Option<&str>) -> TransportResult<()> {
        self.record(OutboundCall::AcknowledgeCallback {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }

    async fn set_webhook(&self, url: &str) -> TransportResult<Value> {
        self.record(OutboundCall::SetWebhook { url: url.to_string() });
        self.state.lock().unwrap_or_else(PoisonError::into_inner).webhook_url = Some(url.to_string());
        Ok(Value::Bool(true))
    }

    async fn delete_webhook(&self) -> TransportResult<Value> {
        self.record(OutboundCall::DeleteWebhook);
        self.state.lock().unwrap_or_else(PoisonError::into_inner).webhook_url = None;
        Ok(Value::Bool(true))
    }

    async fn webhook_info(&self) -> TransportResult<Value> {
        self.record(OutboundCall::WebhookInfo);
        let url = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .webhook_url
            .clone()
            .unwrap_or_default();
        Ok(json!({ "url": url, "pending_update_count": 0 }))
    }
}

/// Decides whether a failed call is tried again
pub trait FailurePolicy: Send + Sync {
    /// Delay before attempt `attempt + 1`, or `None` to give up
    fn next_delay(&self, attempt: u32, error: &TransportError) -> Option<Duration>;
}

/// Give up after the first failure
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAndContinue;

impl FailurePolicy for LogAndContinue {
    fn next_delay(&self, _attempt: u32, _error: &TransportError) -> Option<Duration> {
        None
    }
}

/// Exponential backoff with random jitter
#[derive(Debug, Clone)]
pub struct RetryWithBackoff {
    recovery: RecoveryConfig,
}

impl RetryWithBackoff {
    pub fn new(recovery: RecoveryConfig) -> Self {
        Self { recovery }
    }

    /// Backoff for `attempt` before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let millis = self
            .recovery
            .base_retry_delay_ms
            .saturating_mul(factor)
            .min(self.recovery.max_retry_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Rejections fail the same way again
fn is_retryable(error: &TransportError) -> bool {
    !matches!(error, TransportError::Api { .. })
}

impl FailurePolicy for RetryWithBackoff {
    fn next_delay(&self, attempt: u32, error: &TransportError) -> Option<Duration> {
        if attempt >= self.recovery.max_retries || !is_retryable(error) {
            return None;
        }
        let jitter = if self.recovery.retry_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.recovery.retry_jitter_ms)
        } else {
            0
        };
        let delay = self.base_delay(attempt) + Duration::from_millis(jitter);
        match error {
            TransportError::RateLimited { retry_after, .. } => Some(delay.max(*retry_after)),
            _ => Some(delay),
        }
    }
}

/// Failure policy selected by configuration
pub fn failure_policy(config: &BotConfig) -> Arc<dyn FailurePolicy> {
    match config.failure_policy {
        FailurePolicyKind::LogAndContinue => Arc::new(LogAndContinue),
        FailurePolicyKind::Retry => Arc::new(RetryWithBackoff::new(config.recovery.clone())),
    }
}

/// Transport calls with a deadline and a failure policy
///
/// Failures are logged here; callers may ignore the returned error.
#[derive(Clone)]
pub struct Delivery {
    transport: Arc<dyn Transport>,
    policy: Arc<dyn FailurePolicy>,
    timeout: Duration,
}

impl Delivery {
    pub fn new(transport: Arc<dyn Transport>, policy: Arc<dyn FailurePolicy>, timeout: Duration) -> Self {
        Self {
            transport,
            policy,
            timeout,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    async fn attempt<T, F, Fut>(&self, method: &'static str, call: F) -> TransportResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout {
                    method: method.to_string(),
                    millis: self.timeout.as_millis() as u64,
                }),
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.policy.next_delay(attempt, &error) {
                Some(delay) => {
                    warn!(
                        method,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transport call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    error!(method, attempts = attempt + 1, error = %error, "Transport call failed");
                    return Err(error);
                }
            }
        }
    }

    pub async fn send(&self, chat_id: i64, menu: &Menu) -> TransportResult<()> {
        let transport = &self.transport;
        self.attempt("sendMessage", move || transport.send_message(chat_id, menu))
            .await
    }

    pub async fn edit(&self, chat_id: i64, message_id: i64, menu: &Menu) -> TransportResult<()> {
        let transport = &self.transport;
        self.attempt("editMessageText", move || {
            transport.edit_message(chat_id, message_id, menu)
        })
        .await
    }

    pub async fn acknowledge(&self, callback_id: &str, text: Option<&str>) -> TransportResult<()> {
        let transport = &self.transport;
        self.attempt("answerCallbackQuery", move || {
            transport.acknowledge_callback(callback_id, text)
        })
        .await
    }

    pub async fn set_webhook(&self, url: &str) -> TransportResult<Value> {
        let transport = &self.transport;
        self.attempt("setWebhook", move || transport.set_webhook(url)).await
    }

    pub async fn delete_webhook(&self) -> TransportResult<Value> {
        let transport = &self.transport;
        self.attempt("deleteWebhook", move || transport.delete_webhook())
            .await
    }

    pub async fn webhook_info(&self) -> TransportResult<Value> {
        let transport = &self.transport;
        self.attempt("getWebhookInfo", move || transport.webhook_info())
            .await
    }
}
