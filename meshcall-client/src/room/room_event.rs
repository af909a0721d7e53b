use crate::transport::RemoteMedia;
use meshcall_core::PeerId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Channel,
    MalformedMessage,
    Negotiation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Channel => "channel",
            ErrorKind::MalformedMessage => "malformed message",
            ErrorKind::Negotiation => "negotiation",
        };
        f.write_str(name)
    }
}

/// Observable room events, delivered in the order the room actor produced them.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    StatusChanged(String),
    PeerVideoAvailable {
        peer_id: PeerId,
        media: RemoteMedia,
        display_name: String,
    },
    PeerRemoved(PeerId),
    Error {
        kind: ErrorKind,
        message: String,
    },
}
