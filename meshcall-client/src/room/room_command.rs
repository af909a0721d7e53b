use crate::room::NegotiationState;
use meshcall_core::{PeerId, RoomId};
use tokio::sync::oneshot;

/// Requests from a [`crate::RoomHandle`] to its room actor.
#[derive(Debug)]
pub enum RoomCommand {
    SetMuted { muted: bool },
    SetVideoEnabled { enabled: bool },
    Snapshot { reply: oneshot::Sender<RoomSnapshot> },
    Leave { done: oneshot::Sender<()> },
}

/// Point-in-time view of a room as one participant sees it.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub identity: PeerId,
    pub room: RoomId,
    pub status: String,
    pub peers: Vec<PeerSnapshot>,
}

impl RoomSnapshot {
    pub fn peer(&self, identity: &PeerId) -> Option<&PeerSnapshot> {
        self.peers.iter().find(|p| &p.identity == identity)
    }

    pub fn connected_count(&self) -> usize {
        self.peers
            .iter()
            .filter(|p| p.state == NegotiationState::Connected)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub identity: PeerId,
    pub display_name: Option<String>,
    pub state: NegotiationState,
}

