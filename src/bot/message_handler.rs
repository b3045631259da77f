//! Message Handler module for processing incoming Telegram messages

use tracing::debug;

use super::dialogue_manager::{Event, Sender};
use super::update::IncomingMessage;
use super::BotEngine;

/// Route a text (or any other) message through the flow and answer with a new message
pub async fn message_handler(engine: &BotEngine, msg: &IncomingMessage) {
    let chat_id = msg.chat.id;
    let event = match &msg.text {
        Some(text) => Event::Text(text.clone()),
        None => Event::Unsupported,
    };
    debug!(chat_id, event = ?event, "Received message");

    let sender = Sender::from(msg.from.as_ref());
    let conversation = engine.store().acquire(chat_id);
    // held until the reply is delivered
    let mut conversation = conversation.lock().await;

    let reply = engine.router().handle(&mut conversation, &event, &sender).await;
    // Delivery already logged the failure
    let _ = engine.delivery().send(chat_id, &reply.menu).await;
}
