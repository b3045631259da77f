//! Inbound Telegram update payloads
//!
//! Only the fields the flow reads are modelled; everything else in the
//! update JSON is ignored.

use serde::{Deserialize, Serialize};

use crate::bot::dialogue_manager::Sender;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Advisory; updates are not deduplicated
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<IncomingCallback>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingCallback {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: Option<User>,
    /// The message carrying the pressed keyboard; absent for inline-mode messages
    #[serde(default)]
    pub message: Option<CallbackMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackMessage {
    #[serde(default)]
    pub message_id: i64,
    pub chat: Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

impl From<Option<&User>> for Sender {
    fn from(user: Option<&User>) -> Self {
        Self {
            first_name: user.and_then(|u| u.first_name.clone()),
            language_code: user.and_then(|u| u.language_code.clone()),
        }
    }
}
