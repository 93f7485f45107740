//! Real-time signaling relay for live classes.
//!
//! Participants join a room over a WebSocket and exchange WebRTC negotiation
//! and classroom control messages. The relay forwards each message to the
//! other members of the room without looking at the payload, keeps no
//! history and never reports delivery failures back to the sender.

mod room;
mod signaling;

pub use room::{ConnectionId, EventSender, RegistryStats, RoomRegistry};
pub use signaling::{ClientEvent, ServerEvent, SignalingHandler};
