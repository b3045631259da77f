//! # Configuration Module
//!
//! This module defines the runtime configuration of the bot: Telegram
//! credentials, HTTP binding, timeouts, conversation store bounds and the
//! transport recovery settings. Values come from the environment (a `.env`
//! file is honoured by `main`).

use std::time::Duration;

use crate::errors::{BotError, Result};

// Constants for bot configuration
pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://zigglerkz.vercel.app";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const WEBHOOK_PATH: &str = "/api/bot/webhook";

/// Recovery configuration for error handling
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay
    pub retry_jitter_ms: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 500, // 0.5 second
            max_retry_delay_ms: 5000, // 5 seconds
            retry_jitter_ms: 250,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// What to do when an outbound transport call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicyKind {
    /// Log the failure and carry on (the default)
    LogAndContinue,
    /// Retry with exponential backoff before giving up
    Retry,
}

/// Complete bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot API token; absence is reported per request as a configuration error
    pub telegram_bot_token: Option<String>,
    /// Public URL the webhook is registered under
    pub public_base_url: String,
    /// Socket address for the HTTP server
    pub bind_address: String,
    /// Bot API root, overridable for local Bot API servers
    pub telegram_api_url: String,
    /// Record outbound calls instead of sending them
    pub simulation: bool,
    /// Optional JSON file replacing the bundled catalog
    pub catalog_path: Option<String>,
    /// Deadline for one catalog lookup
    pub catalog_timeout: Duration,
    /// Deadline for one transport call
    pub transport_timeout: Duration,
    /// Idle time after which a conversation is evicted
    pub conversation_ttl: Duration,
    /// Maximum number of live conversations
    pub max_conversations: usize,
    /// Period of the background eviction sweep
    pub eviction_interval: Duration,
    /// Transport failure handling
    pub failure_policy: FailurePolicyKind,
    /// Recovery and circuit breaker settings
    pub recovery: RecoveryConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            simulation: false,
            catalog_path: None,
            catalog_timeout: Duration::from_secs(5),
            transport_timeout: Duration::from_secs(10),
            conversation_ttl: Duration::from_secs(30 * 60),
            max_conversations: 10_000,
            eviction_interval: Duration::from_secs(60),
            failure_policy: FailurePolicyKind::LogAndContinue,
            recovery: RecoveryConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Missing keys fall back to defaults; present but unparseable values are
    /// reported as `BotError::Configuration`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let failure_policy = match get("TRANSPORT_FAILURE_POLICY").as_deref() {
            None | Some("log") => FailurePolicyKind::LogAndContinue,
            Some("retry") => FailurePolicyKind::Retry,
            Some(other) => {
                return Err(BotError::Configuration(format!(
                    "TRANSPORT_FAILURE_POLICY must be \"log\" or \"retry\", got \"{other}\""
                )))
            }
        };

        let telegram_api_url = match get("TELEGRAM_API_URL") {
            Some(url) => {
                reqwest::Url::parse(&url).map_err(|e| {
                    BotError::Configuration(format!("TELEGRAM_API_URL is not a valid URL: {e}"))
                })?;
                url.trim_end_matches('/').to_string()
            }
            None => defaults.telegram_api_url,
        };

        let recovery = RecoveryConfig {
            max_retries: parse_or(&get, "TRANSPORT_MAX_RETRIES", defaults.recovery.max_retries)?,
            ..RecoveryConfig::default()
        };

        Ok(Self {
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            public_base_url: get("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            bind_address: get("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            telegram_api_url,
            simulation: parse_or(&get, "BOT_SIMULATION", defaults.simulation)?,
            catalog_path: get("CATALOG_PATH"),
            catalog_timeout: Duration::from_secs(parse_or(&get, "CATALOG_TIMEOUT_SECS", 5)?),
            transport_timeout: Duration::from_secs(parse_or(&get, "TRANSPORT_TIMEOUT_SECS", 10)?),
            conversation_ttl: Duration::from_secs(parse_or(&get, "CONVERSATION_TTL_SECS", 1800)?),
            max_conversations: parse_or(&get, "MAX_CONVERSATIONS", defaults.max_conversations)?,
            eviction_interval: Duration::from_secs(parse_or(&get, "EVICTION_INTERVAL_SECS", 60)?),
            failure_policy,
            recovery,
        })
    }

    /// Bot token, or a configuration error when it is not set
    pub fn require_token(&self) -> Result<&str> {
        self.telegram_bot_token
            .as_deref()
            .ok_or_else(|| BotError::Configuration("TELEGRAM_BOT_TOKEN is not configured".to_string()))
    }

    /// Absolute URL Telegram should deliver updates to
    pub fn webhook_url(&self) -> String {
        format!("{}{}", self.public_base_url, WEBHOOK_PATH)
    }

    /// Token prefix safe to show in status output
    pub fn token_prefix(&self) -> Option<String> {
        self.telegram_bot_token
            .as_deref()
            .map(|token| format!("{}...", token.chars().take(10).collect::<String>()))
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| BotError::Configuration(format!("{key} has an invalid value: \"{raw}\""))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = BotConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.telegram_bot_token.is_none());
        assert_eq!(config.public_base_url, DEFAULT_PUBLIC_BASE_URL);
        assert_eq!(config.failure_policy, FailurePolicyKind::LogAndContinue);
        assert_eq!(config.catalog_timeout, Duration::from_secs(5));
        assert!(config.require_token().is_err());
    }

    #[test]
    fn test_values_are_parsed() {
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "8542343040:secret"),
            ("PUBLIC_BASE_URL", "https://shop.example/"),
            ("BOT_SIMULATION", "true"),
            ("MAX_CONVERSATIONS", "42"),
            ("TRANSPORT_FAILURE_POLICY", "retry"),
            ("TRANSPORT_MAX_RETRIES", "5"),
        ]))
        .unwrap();

        assert_eq!(config.require_token().unwrap(), "8542343040:secret");
        assert_eq!(config.webhook_url(), "https://shop.example/api/bot/webhook");
        assert!(config.simulation);
        assert_eq!(config.max_conversations, 42);
        assert_eq!(config.failure_policy, FailurePolicyKind::Retry);
        assert_eq!(config.recovery.max_retries, 5);
        assert_eq!(config.token_prefix().unwrap(), "8542343040...");
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        let err = BotConfig::from_lookup(lookup(&[("CATALOG_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, BotError::Configuration(_)));

        let err = BotConfig::from_lookup(lookup(&[("TRANSPORT_FAILURE_POLICY", "panic")])).unwrap_err();
        assert!(err.to_string().contains("TRANSPORT_FAILURE_POLICY"));

        let err = BotConfig::from_lookup(lookup(&[("TELEGRAM_API_URL", "not a url")])).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_API_URL"));
    }

    #[test]
    fn test_local_bot_api_url() {
        let config = BotConfig::from_lookup(lookup(&[("TELEGRAM_API_URL", "http://localhost:8081/")])).unwrap();
        assert_eq!(config.telegram_api_url, "http://localhost:8081");
    }

    #[test]
    fn test_blank_token_is_treated_as_missing() {
        let config = BotConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "   ")])).unwrap();
        assert!(config.telegram_bot_token.is_none());
    }
}
