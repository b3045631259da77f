//! HTTP surface: the Telegram webhook and its administration endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::WEBHOOK_PATH;
use crate::errors::BotError;
use crate::runtime::AppState;

pub const STATUS_PATH: &str = "/api/bot/status";
pub const SETUP_WEBHOOK_PATH: &str = "/api/bot/setup-webhook";

/// Error returned by an endpoint
#[derive(Debug, Error)]
pub enum ApiError {
    /// The bot is not configured; the message is shown verbatim
    #[error("{0}")]
    Configuration(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The Bot API refused or could not be reached
    #[error("telegram request failed: {0}")]
    Upstream(String),

    /// Details are logged, never returned
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Configuration(_) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string()
        }));
        (status, body).into_response()
    }
}

impl From<BotError> for ApiError {
    fn from(err: BotError) -> Self {
        match err {
            BotError::Configuration(message) => ApiError::Configuration(message),
            BotError::Transport(e) => ApiError::Upstream(e.to_string()),
            other => {
                error!(error = %other, "Request failed");
                ApiError::Internal
            }
        }
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Creates the router with every bot endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(receive_update).get(webhook_status))
        .route(STATUS_PATH, get(bot_status))
        .route(SETUP_WEBHOOK_PATH, get(webhook_info).post(setup_webhook))
        .with_state(state)
}

/// Starts the HTTP server
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = state.config().bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Webhook server listening");
    axum::serve(listener, create_router(state)).await
}

/// POST /api/bot/webhook - Receive one Telegram update
async fn receive_update(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    state.process_update(&body).await?;
    Ok(Json(json!({ "ok": true })))
}

/// GET /api/bot/webhook - Activate the runtime and report its state
async fn webhook_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let activated_at = state.init()?;
    Ok(Json(json!({
        "status": "Bot webhook is active",
        "webhook_active": state.is_active(),
        "activated_at": activated_at.to_rfc3339(),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// GET /api/bot/status - Configuration and load overview
async fn bot_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.ensure_configured()?;
    let config = state.config();
    Ok(Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "simulation": config.simulation,
        "webhook_active": state.is_active(),
        "bot": {
            "configured": config.telegram_bot_token.is_some(),
            "token_prefix": config.token_prefix(),
        },
        "conversations": state.engine().store().len(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub action: String,
}

/// GET /api/bot/setup-webhook - Current webhook registration
async fn webhook_info(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    run_setup(&state, "info").await
}

/// POST /api/bot/setup-webhook - Register, remove or inspect the webhook
async fn setup_webhook(State(state): State<AppState>, Json(request): Json<SetupRequest>) -> ApiResult<Json<Value>> {
    run_setup(&state, &request.action).await
}

async fn run_setup(state: &AppState, action: &str) -> ApiResult<Json<Value>> {
    state.ensure_configured()?;
    let delivery = state.engine().delivery();

    let body = match action {
        "set" => {
            let url = state.config().webhook_url();
            let result = delivery.set_webhook(&url).await.map_err(BotError::from)?;
            info!(url = %url, "Webhook registered");
            json!({ "ok": true, "action": "set", "url": url, "result": result })
        }
        "delete" => {
            let result = delivery.delete_webhook().await.map_err(BotError::from)?;
            info!("Webhook deleted");
            json!({ "ok": true, "action": "delete", "result": result })
        }
        "info" => {
            let result = delivery.webhook_info().await.map_err(BotError::from)?;
            json!({ "ok": true, "action": "info", "result": result })
        }
        other => {
            warn!(action = other, "Unknown setup-webhook action");
            return Err(ApiError::BadRequest(format!(
                "unknown action \"{other}\", expected set, delete or info"
            )));
        }
    };
    Ok(Json(body))
}
