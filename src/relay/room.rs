use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use super::signaling::ServerEvent;

/// Transient, process-unique id of one WebSocket connection.
pub type ConnectionId = u64;

/// Outbound queue of a single connection.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone)]
struct Participant {
    user_id: String,
    room_id: String,
    sender: EventSender,
}

#[derive(Debug, Default)]
struct Rooms {
    /// room id -> member connections
    members: HashMap<String, HashSet<ConnectionId>>,
    /// connection -> its current membership
    participants: HashMap<ConnectionId, Participant>,
}

impl Rooms {
    /// Drops the connection from whatever room it is in. Empty rooms are removed.
    fn detach(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        let participant = self.participants.remove(&connection_id)?;

        if let Some(members) = self.members.get_mut(&participant.room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.members.remove(&participant.room_id);
            }
        }

        Some(participant)
    }

    /// Sends `event` to every member of `room_id` except `from`; returns how many peers got it.
    fn fan_out(&self, room_id: &str, from: ConnectionId, event: &ServerEvent) -> usize {
        let Some(members) = self.members.get(room_id) else {
            return 0;
        };

        members
            .iter()
            .filter(|id| **id != from)
            .filter_map(|id| self.participants.get(id))
            .filter(|participant| participant.sender.send(event.clone()).is_ok())
            .count()
    }
}

/// Membership snapshot used by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub rooms: usize,
    pub connections: usize,
}

/// In-memory room membership for the signaling relay.
///
/// Every operation takes the write lock for its whole mutation and fan-out,
/// so one event is applied completely before the next one touching the same
/// state. Rooms exist only while they have members and are never persisted.
pub struct RoomRegistry {
    rooms: RwLock<Rooms>,
    next_connection_id: AtomicU64,
}

impl RoomRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(Rooms::default()),
            next_connection_id: AtomicU64::new(1),
        })
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Binds a connection to `room_id` and announces `user_id` to the members already there.
    ///
    /// A connection belongs to one room at a time; joining another room leaves
    /// the previous one without notifying its members. Returns the number of
    /// peers that received `user-joined`.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        user_id: &str,
        sender: EventSender,
    ) -> usize {
        let mut rooms = self.rooms.write().await;

        if let Some(previous) = rooms.participants.get(&connection_id) {
            if previous.room_id != room_id {
                let previous_room = previous.room_id.clone();
                rooms.detach(connection_id);
                tracing::debug!(
                    connection_id,
                    from_room = %previous_room,
                    to_room = %room_id,
                    "Connection switched rooms"
                );
            }
        }

        rooms.participants.insert(
            connection_id,
            Participant {
                user_id: user_id.to_string(),
                room_id: room_id.to_string(),
                sender,
            },
        );
        rooms
            .members
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id);

        let notified = rooms.fan_out(
            room_id,
            connection_id,
            &ServerEvent::UserJoined {
                user_id: user_id.to_string(),
            },
        );

        tracing::info!(
            connection_id,
            room_id = %room_id,
            user_id = %user_id,
            notified,
            "Participant joined room"
        );
        notified
    }

    /// Forwards `event` to every member of `room_id` except the sender.
    ///
    /// The sender does not have to be a member. Unknown or empty rooms are a no-op.
    pub async fn broadcast(&self, room_id: &str, from: ConnectionId, event: ServerEvent) -> usize {
        let rooms = self.rooms.read().await;
        rooms.fan_out(room_id, from, &event)
    }

    /// Tells the room the session is over, then empties it.
    ///
    /// Returns the number of peers notified. Every member, the sender
    /// included, loses its membership.
    pub async fn end_session(&self, room_id: &str, from: ConnectionId) -> usize {
        let mut rooms = self.rooms.write().await;

        let notified = rooms.fan_out(room_id, from, &ServerEvent::EndSession);

        let removed = match rooms.members.remove(room_id) {
            Some(members) => {
                for connection_id in &members {
                    rooms.participants.remove(connection_id);
                }
                members.len()
            }
            None => 0,
        };

        tracing::info!(room_id = %room_id, notified, removed, "Live session ended, room cleared");
        notified
    }

    /// Removes a connection from its room without telling anyone.
    ///
    /// Returns the room it was in, if any.
    pub async fn leave(&self, connection_id: ConnectionId) -> Option<String> {
        let mut rooms = self.rooms.write().await;
        let participant = rooms.detach(connection_id)?;

        tracing::info!(
            connection_id,
            room_id = %participant.room_id,
            user_id = %participant.user_id,
            "Participant left room"
        );
        Some(participant.room_id)
    }

    /// Room the connection is currently bound to.
    pub async fn room_of(&self, connection_id: ConnectionId) -> Option<String> {
        let rooms = self.rooms.read().await;
        rooms
            .participants
            .get(&connection_id)
            .map(|p| p.room_id.clone())
    }

    /// User ids currently in a room, sorted.
    pub async fn room_users(&self, room_id: &str) -> Vec<String> {
        let rooms = self.rooms.read().await;
        let mut users: Vec<String> = rooms
            .members
            .get(room_id)
            .into_iter()
            .flatten()
            .filter_map(|id| rooms.participants.get(id))
            .map(|p| p.user_id.clone())
            .collect();
        users.sort();
        users
    }

    pub async fn member_count(&self, room_id: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.members.get(room_id).map_or(0, HashSet::len)
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        let rooms = self.rooms.read().await;
        rooms.members.contains_key(room_id)
    }

    pub async fn stats(&self) -> RegistryStats {
        let rooms = self.rooms.read().await;
        RegistryStats {
            rooms: rooms.members.len(),
            connections: rooms.participants.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct TestPeer {
        id: ConnectionId,
        tx: EventSender,
        rx: mpsc::UnboundedReceiver<ServerEvent>,
    }

    fn peer(registry: &RoomRegistry) -> TestPeer {
        let (tx, rx) = mpsc::unbounded_channel();
        TestPeer {
            id: registry.next_connection_id(),
            tx,
            rx,
        }
    }

    fn drain(peer: &mut TestPeer) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = peer.rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn offer() -> ServerEvent {
        ServerEvent::Offer {
            offer: json!({ "type": "offer", "sdp": "v=0" }),
        }
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let registry = RoomRegistry::new();
        let a = registry.next_connection_id();
        let b = registry.next_connection_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_join_notifies_existing_members_only() {
        let registry = RoomRegistry::new();
        let mut teacher = peer(&registry);
        let mut student = peer(&registry);

        let notified = registry.join(teacher.id, "class-1", "teacher_1", teacher.tx.clone()).await;
        assert_eq!(notified, 0);

        let notified = registry.join(student.id, "class-1", "student_1", student.tx.clone()).await;
        assert_eq!(notified, 1);

        assert_eq!(
            drain(&mut teacher),
            vec![ServerEvent::UserJoined {
                user_id: "student_1".to_string()
            }]
        );
        // No backlog for the new joiner
        assert!(drain(&mut student).is_empty());
    }

    #[tokio::test]
    async fn test_relay_reaches_peer_exactly_once_and_not_other_rooms() {
        let registry = RoomRegistry::new();
        let mut p1 = peer(&registry);
        let mut p2 = peer(&registry);
        let mut p3 = peer(&registry);

        registry.join(p1.id, "room-r", "u1", p1.tx.clone()).await;
        registry.join(p2.id, "room-r", "u2", p2.tx.clone()).await;
        registry.join(p3.id, "room-s", "u3", p3.tx.clone()).await;
        drain(&mut p1);

        let delivered = registry.broadcast("room-r", p1.id, offer()).await;
        assert_eq!(delivered, 1);

        assert_eq!(drain(&mut p2), vec![offer()]);
        assert!(drain(&mut p1).is_empty());
        assert!(drain(&mut p3).is_empty());
    }

    #[tokio::test]
    async fn test_relay_from_non_member_reaches_all_members() {
        let registry = RoomRegistry::new();
        let outsider = peer(&registry);
        let mut a = peer(&registry);
        let mut b = peer(&registry);

        registry.join(a.id, "room", "a", a.tx.clone()).await;
        registry.join(b.id, "room", "b", b.tx.clone()).await;
        drain(&mut a);

        let delivered = registry.broadcast("room", outsider.id, ServerEvent::MuteAll).await;
        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut a), vec![ServerEvent::MuteAll]);
        assert_eq!(drain(&mut b), vec![ServerEvent::MuteAll]);
    }

    #[tokio::test]
    async fn test_relay_to_unknown_room_is_noop() {
        let registry = RoomRegistry::new();
        let p = peer(&registry);
        assert_eq!(registry.broadcast("nowhere", p.id, offer()).await, 0);
        assert!(!registry.room_exists("nowhere").await);
    }

    #[tokio::test]
    async fn test_end_session_clears_room() {
        let registry = RoomRegistry::new();
        let mut teacher = peer(&registry);
        let mut s1 = peer(&registry);
        let mut s2 = peer(&registry);

        registry.join(teacher.id, "class", "t", teacher.tx.clone()).await;
        registry.join(s1.id, "class", "s1", s1.tx.clone()).await;
        registry.join(s2.id, "class", "s2", s2.tx.clone()).await;
        drain(&mut teacher);
        drain(&mut s1);

        let notified = registry.end_session("class", teacher.id).await;
        assert_eq!(notified, 2);
        assert_eq!(drain(&mut s1), vec![ServerEvent::EndSession]);
        assert_eq!(drain(&mut s2), vec![ServerEvent::EndSession]);
        assert!(drain(&mut teacher).is_empty());

        assert_eq!(registry.member_count("class").await, 0);
        assert!(!registry.room_exists("class").await);
        assert!(registry.room_of(teacher.id).await.is_none());
        assert!(registry.room_of(s1.id).await.is_none());

        // Nobody is reachable until someone joins again
        assert_eq!(registry.broadcast("class", s1.id, offer()).await, 0);
        assert!(drain(&mut s2).is_empty());

        registry.join(s2.id, "class", "s2", s2.tx.clone()).await;
        assert_eq!(registry.broadcast("class", teacher.id, offer()).await, 1);
        assert_eq!(drain(&mut s2), vec![offer()]);
    }

    #[tokio::test]
    async fn test_leave_removes_membership_without_notification() {
        let registry = RoomRegistry::new();
        let mut a = peer(&registry);
        let mut b = peer(&registry);

        registry.join(a.id, "room", "a", a.tx.clone()).await;
        registry.join(b.id, "room", "b", b.tx.clone()).await;
        drain(&mut a);

        assert_eq!(registry.leave(b.id).await.as_deref(), Some("room"));
        assert!(drain(&mut a).is_empty());
        assert_eq!(registry.member_count("room").await, 1);

        // Relays no longer reach the departed connection
        assert_eq!(registry.broadcast("room", a.id, offer()).await, 0);
        assert!(drain(&mut b).is_empty());

        assert_eq!(registry.leave(b.id).await, None);
    }

    #[tokio::test]
    async fn test_last_leave_drops_room() {
        let registry = RoomRegistry::new();
        let a = peer(&registry);
        registry.join(a.id, "room", "a", a.tx.clone()).await;
        registry.leave(a.id).await;
        assert!(!registry.room_exists("room").await);
        assert_eq!(registry.stats().await, RegistryStats { rooms: 0, connections: 0 });
    }

    #[tokio::test]
    async fn test_joining_second_room_leaves_first() {
        let registry = RoomRegistry::new();
        let mut a = peer(&registry);
        let mut b = peer(&registry);
        let mut c = peer(&registry);

        registry.join(b.id, "first", "b", b.tx.clone()).await;
        registry.join(c.id, "second", "c", c.tx.clone()).await;
        registry.join(a.id, "first", "a", a.tx.clone()).await;
        registry.join(a.id, "second", "a", a.tx.clone()).await;
        drain(&mut b);
        drain(&mut c);

        assert_eq!(registry.room_of(a.id).await.as_deref(), Some("second"));
        assert_eq!(registry.room_users("first").await, vec!["b".to_string()]);
        assert_eq!(
            registry.room_users("second").await,
            vec!["a".to_string(), "c".to_string()]
        );

        registry.broadcast("first", b.id, offer()).await;
        assert!(drain(&mut a).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_join_keeps_single_membership() {
        let registry = RoomRegistry::new();
        let mut a = peer(&registry);
        let mut b = peer(&registry);

        registry.join(a.id, "room", "a", a.tx.clone()).await;
        registry.join(b.id, "room", "b", b.tx.clone()).await;
        registry.join(b.id, "room", "b", b.tx.clone()).await;

        assert_eq!(registry.member_count("room").await, 2);

        drain(&mut a);
        drain(&mut b);
        assert_eq!(registry.broadcast("room", a.id, offer()).await, 1);
        assert_eq!(drain(&mut b), vec![offer()]);
    }

    #[tokio::test]
    async fn test_closed_peer_is_skipped() {
        let registry = RoomRegistry::new();
        let a = peer(&registry);
        let b = peer(&registry);
        let mut c = peer(&registry);

        registry.join(a.id, "room", "a", a.tx.clone()).await;
        registry.join(b.id, "room", "b", b.tx.clone()).await;
        registry.join(c.id, "room", "c", c.tx.clone()).await;

        let TestPeer { id: b_id, tx: b_tx, rx: b_rx } = b;
        drop(b_tx);
        drop(b_rx);

        let delivered = registry.broadcast("room", a.id, offer()).await;
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut c), vec![offer()]);
        // Still a member until it disconnects
        assert_eq!(registry.room_of(b_id).await.as_deref(), Some("room"));
    }
}
