use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::relay::{ClientEvent, RoomRegistry, ServerEvent, SignalingHandler};

pub async fn handle_relay_websocket(websocket: WebSocket, registry: Arc<RoomRegistry>) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let mut signaling_handler = SignalingHandler::new(registry, tx);
    let connection_id = signaling_handler.connection_id();
    tracing::info!(connection_id, "Signaling connection established");

    // Writer half: serialize queued events onto the socket
    let sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(connection_id, error = %e, "Failed to serialize signaling event");
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::text(text)).await {
                tracing::debug!(connection_id, error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) if message.is_close() => break,
            Ok(message) => handle_websocket_message(&mut signaling_handler, message).await,
            Err(e) => {
                tracing::debug!(connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    signaling_handler.cleanup().await;
    sender_task.abort();
    tracing::info!(connection_id, "Signaling connection closed");
}

/// Parses one frame and hands it to the handler. Bad frames are logged and dropped.
async fn handle_websocket_message(signaling_handler: &mut SignalingHandler, message: Message) {
    let Ok(text) = message.to_str() else {
        return;
    };

    tracing::trace!(connection_id = signaling_handler.connection_id(), "Received signaling message: {}", text);

    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => {
            signaling_handler.handle_message(event).await;
        }
        Err(e) => {
            tracing::error!(
                connection_id = signaling_handler.connection_id(),
                error = %e,
                raw_message = %text,
                "Failed to parse signaling message"
            );
        }
    }
}
