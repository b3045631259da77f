//! # Bot Error Types Module
//!
//! This module defines the error taxonomy used by the conversational flow.
//! Every variant has a fixed recovery policy:
//!
//! - `MalformedToken`: fall back to the main menu
//! - `Validation`: re-render the current screen with a notice
//! - `CatalogUnavailable`: render a retry menu
//! - `Transport`: log and continue
//! - `Configuration`: every webhook request answers 500 until fixed

use std::time::Duration;

use thiserror::Error;

/// Result type for bot operations.
pub type Result<T> = std::result::Result<T, BotError>;

/// Errors raised by the flow engine and its collaborators.
#[derive(Debug, Error)]
pub enum BotError {
    /// Callback data could not be decoded or encoded.
    #[error("malformed callback token: {0}")]
    MalformedToken(String),

    /// A selection referenced something the catalog does not offer.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Catalog lookup failed, timed out or is short-circuited.
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Outbound Bot API call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Required configuration is missing or unparseable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal fault.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Selections rejected against catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("product {0} not found")]
    UnknownProduct(String),
    #[error("category {0} not found")]
    UnknownCategory(String),
    #[error("size {size} is not available for product {product_id}")]
    UnavailableSize { product_id: String, size: String },
    #[error("color {color} is not available for product {product_id}")]
    UnavailableColor { product_id: String, color: String },
    #[error("unsupported language {0}")]
    UnsupportedLanguage(String),
}

impl ValidationError {
    /// Localization key of the inline notice shown to the user.
    pub fn notice_key(&self) -> &'static str {
        match self {
            ValidationError::UnknownProduct(_) => "notice-product-not-found",
            ValidationError::UnknownCategory(_) => "notice-category-not-found",
            ValidationError::UnavailableSize { .. } => "notice-size-unavailable",
            ValidationError::UnavailableColor { .. } => "notice-color-unavailable",
            ValidationError::UnsupportedLanguage(_) => "notice-language-unsupported",
        }
    }
}

/// Failures of the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Telegram rejected the request.
    #[error("{method} rejected: {description}")]
    Api { method: String, description: String },
    /// Flood control; the request may be repeated after the given delay.
    #[error("{method} rate limited, retry after {retry_after:?}")]
    RateLimited { method: String, retry_after: Duration },
    /// The request never produced a usable response.
    #[error("{method} failed: {message}")]
    Network { method: String, message: String },
    /// The call exceeded its deadline.
    #[error("{method} timed out after {millis}ms")]
    Timeout { method: String, millis: u64 },
}

impl TransportError {
    /// Bot API method the failure belongs to.
    pub fn method(&self) -> &str {
        match self {
            TransportError::Api { method, .. }
            | TransportError::RateLimited { method, .. }
            | TransportError::Network { method, .. }
            | TransportError::Timeout { method, .. } => method,
        }
    }
}
