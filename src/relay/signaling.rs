use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::room::{ConnectionId, EventSender, RoomRegistry};

/// Events a participant sends to the relay.
///
/// Negotiation payloads are opaque JSON and are never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        room_id: String,
        user_id: String,
    },

    Offer {
        offer: Value,
        room_id: String,
    },

    Answer {
        answer: Value,
        room_id: String,
    },

    IceCandidate {
        candidate: Value,
        room_id: String,
    },

    MuteAll {
        room_id: String,
    },

    RaiseHand {
        room_id: String,
        user_id: String,
    },

    EndSession {
        room_id: String,
    },
}

impl ClientEvent {
    pub fn room_id(&self) -> &str {
        match self {
            ClientEvent::JoinRoom { room_id, .. }
            | ClientEvent::Offer { room_id, .. }
            | ClientEvent::Answer { room_id, .. }
            | ClientEvent::IceCandidate { room_id, .. }
            | ClientEvent::MuteAll { room_id }
            | ClientEvent::RaiseHand { room_id, .. }
            | ClientEvent::EndSession { room_id } => room_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::Offer { .. } => "offer",
            ClientEvent::Answer { .. } => "answer",
            ClientEvent::IceCandidate { .. } => "ice-candidate",
            ClientEvent::MuteAll { .. } => "mute-all",
            ClientEvent::RaiseHand { .. } => "raise-hand",
            ClientEvent::EndSession { .. } => "end-session",
        }
    }
}

/// Events the relay delivers to the other members of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    UserJoined { user_id: String },

    Offer { offer: Value },

    Answer { answer: Value },

    IceCandidate { candidate: Value },

    MuteAll,

    RaiseHand { user_id: String },

    EndSession,
}

/// Per-connection side of the relay.
///
/// Owns the connection id and its outbound queue and turns each inbound
/// event into one registry operation.
pub struct SignalingHandler {
    registry: Arc<RoomRegistry>,
    connection_id: ConnectionId,
    sender: EventSender,
}

impl SignalingHandler {
    pub fn new(registry: Arc<RoomRegistry>, sender: EventSender) -> Self {
        let connection_id = registry.next_connection_id();
        Self {
            registry,
            connection_id,
            sender,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Applies one inbound event. Returns how many peers it reached.
    pub async fn handle_message(&mut self, event: ClientEvent) -> usize {
        let name = event.name();
        let room_id = event.room_id().to_string();

        let recipients = match event {
            ClientEvent::JoinRoom { room_id, user_id } => {
                self.registry
                    .join(self.connection_id, &room_id, &user_id, self.sender.clone())
                    .await
            }
            ClientEvent::Offer { offer, room_id } => {
                self.relay(&room_id, ServerEvent::Offer { offer }).await
            }
            ClientEvent::Answer { answer, room_id } => {
                self.relay(&room_id, ServerEvent::Answer { answer }).await
            }
            ClientEvent::IceCandidate { candidate, room_id } => {
                self.relay(&room_id, ServerEvent::IceCandidate { candidate }).await
            }
            ClientEvent::MuteAll { room_id } => self.relay(&room_id, ServerEvent::MuteAll).await,
            ClientEvent::RaiseHand { room_id, user_id } => {
                self.relay(&room_id, ServerEvent::RaiseHand { user_id }).await
            }
            ClientEvent::EndSession { room_id } => {
                self.registry.end_session(&room_id, self.connection_id).await
            }
        };

        tracing::debug!(
            connection_id = self.connection_id,
            room_id = %room_id,
            event = name,
            recipients,
            "Relayed signaling event"
        );
        recipients
    }

    async fn relay(&self, room_id: &str, event: ServerEvent) -> usize {
        self.registry
            .broadcast(room_id, self.connection_id, event)
            .await
    }

    /// Drops the connection's membership. Peers are not told.
    pub async fn cleanup(&self) {
        if let Some(room_id) = self.registry.leave(self.connection_id).await {
            tracing::debug!(
                connection_id = self.connection_id,
                room_id = %room_id,
                "Disconnected without end-session; peers not notified"
            );
        }
    }
}
