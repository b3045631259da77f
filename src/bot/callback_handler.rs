//! Callback Handler module for processing inline keyboard callback queries

use tracing::{debug, warn};

use super::dialogue_manager::{Event, Sender};
use super::update::IncomingCallback;
use super::BotEngine;

/// Handle a pressed inline button
///
/// The reply replaces the message that carried the keyboard; if the edit
/// fails a fresh message is sent instead. The query is always acknowledged
/// so the client stops showing its loading state.
pub async fn callback_handler(engine: &BotEngine, q: &IncomingCallback) {
    let data = q.data.clone().unwrap_or_default();

    let Some(msg) = &q.message else {
        warn!(callback_id = %q.id, data = %data, "Callback without a message, acknowledging only");
        let _ = engine.delivery().acknowledge(&q.id, None).await;
        return;
    };

    let chat_id = msg.chat.id;
    debug!(chat_id, data = %data, "Received callback query");

    let sender = Sender::from(q.from.as_ref());
    let conversation = engine.store().acquire(chat_id);
    let mut conversation = conversation.lock().await;

    let reply = engine
        .router()
        .handle(&mut conversation, &Event::Callback(data), &sender)
        .await;

    if engine
        .delivery()
        .edit(chat_id, msg.message_id, &reply.menu)
        .await
        .is_err()
    {
        let _ = engine.delivery().send(chat_id, &reply.menu).await;
    }

    // Answer the callback query to remove the loading state
    let _ = engine.delivery().acknowledge(&q.id, reply.toast.as_deref()).await;
}
