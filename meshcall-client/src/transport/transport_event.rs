use crate::room::PeerCommand;
use crate::transport::TrackKind;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::track::track_remote::TrackRemote;

/// Connection state reported by a media session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }

    pub(crate) fn from_rtc(state: RTCPeerConnectionState) -> Option<Self> {
        match state {
            RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
            RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
            RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
            RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
            RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
            _ => None,
        }
    }
}

/// A remote track that became available on a media session.
#[derive(Clone)]
pub struct RemoteMedia {
    pub track_id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    /// `None` for sessions without a real transport behind them.
    pub track: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMedia")
            .field("track_id", &self.track_id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Events a media session pushes back to its owning negotiation.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    ConnectionState(ConnectionState),
    RemoteTrack(RemoteMedia),
    /// A locally gathered ICE candidate, serialized as JSON.
    LocalCandidate(String),
}

/// Delivers media events into the owning peer's mailbox, tagged with the
/// session generation so events from a replaced session can be told apart.
#[derive(Clone)]
pub struct MediaEventSink {
    generation: u64,
    mailbox: mpsc::UnboundedSender<PeerCommand>,
}

impl MediaEventSink {
    pub fn new(generation: u64, mailbox: mpsc::UnboundedSender<PeerCommand>) -> Self {
        Self {
            generation,
            mailbox,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the peer has gone away.
    pub fn emit(&self, event: MediaEvent) -> bool {
        self.mailbox
            .send(PeerCommand::Media {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}
