use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use meshcall_core::{PeerId, RoomId, SignalMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Identifies one websocket connection, so that a stale connection going
/// away never unregisters a newer one bound to the same identity.
pub type ConnectionId = u64;

struct Member {
    connection: ConnectionId,
    tx: mpsc::UnboundedSender<Message>,
}

struct RelayInner {
    rooms: DashMap<RoomId, HashMap<PeerId, Member>>,
    next_connection: AtomicU64,
}

/// Room-scoped fan-out of signaling frames between websocket connections.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayInner>,
}

impl RelayService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                rooms: DashMap::new(),
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.inner.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Bind `peer_id` in `room` to a connection's outbound queue. A previous
    /// connection with the same identity is replaced.
    pub fn register(
        &self,
        room: &RoomId,
        peer_id: &PeerId,
        connection: ConnectionId,
        tx: mpsc::UnboundedSender<Message>,
    ) {
        let mut members = self.inner.rooms.entry(room.clone()).or_default();
        if members
            .insert(peer_id.clone(), Member { connection, tx })
            .is_some()
        {
            warn!("{} re-registered in room {}, replacing old connection", peer_id, room);
        }
        info!("{} joined room {} ({} members)", peer_id, room, members.len());
    }

    /// Drops the binding if it still belongs to `connection`. Empty rooms
    /// are forgotten.
    pub fn unregister(&self, room: &RoomId, peer_id: &PeerId, connection: ConnectionId) {
        let Some(mut members) = self.inner.rooms.get_mut(room) else {
            return;
        };
        if members
            .get(peer_id)
            .is_some_and(|m| m.connection == connection)
        {
            members.remove(peer_id);
            info!("{} left room {}", peer_id, room);
        }
        drop(members);

        self.inner.rooms.remove_if(room, |_, members| members.is_empty());
    }

    /// Forward `text` to every other member of the message's room it is
    /// addressed to. Returns how many members it was queued for.
    pub fn relay(&self, msg: &SignalMessage, text: &Utf8Bytes) -> usize {
        let Some(members) = self.inner.rooms.get(&msg.room) else {
            return 0;
        };

        let mut delivered = 0;
        for (peer_id, member) in members.iter() {
            if *peer_id == msg.from || !msg.is_addressed_to(peer_id) {
                continue;
            }
            match member.tx.send(Message::Text(text.clone())) {
                Ok(()) => delivered += 1,
                Err(e) => error!("Failed to queue WS message to {}: {:?}", peer_id, e),
            }
        }

        if delivered == 0 && msg.to.is_some() {
            warn!(
                "Attempted to send {:?} to disconnected user {:?}",
                msg.kind(),
                msg.to
            );
        } else {
            debug!("Relayed {:?} from {} to {} member(s)", msg.kind(), msg.from, delivered);
        }
        delivered
    }

    pub fn peers_in(&self, room: &RoomId) -> Vec<PeerId> {
        self.inner
            .rooms
            .get(room)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new()
    }
}
