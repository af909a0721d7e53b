use crate::transport::{LocalMediaHandle, MediaEventSink};
use async_trait::async_trait;
use meshcall_core::PeerId;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, Error)]
pub enum MediaError {
    #[error("local media unavailable: {0}")]
    Unavailable(String),

    #[error("media session error: {0}")]
    Session(String),
}

impl From<webrtc::Error> for MediaError {
    fn from(err: webrtc::Error) -> Self {
        MediaError::Session(err.to_string())
    }
}

/// One negotiable media connection to a single remote peer.
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Create a local offer and install it as the local description.
    async fn create_offer(&self) -> Result<String, MediaError>;

    /// Create a local answer to the applied remote offer and install it.
    async fn create_answer(&self) -> Result<String, MediaError>;

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<(), MediaError>;

    async fn add_remote_candidate(&self, candidate: String) -> Result<(), MediaError>;

    async fn close(&self) -> Result<(), MediaError>;
}

/// Produces media sessions for remote peers.
#[async_trait]
pub trait MediaSessionFactory: Send + Sync {
    async fn create(
        &self,
        peer_id: &PeerId,
        local_media: &LocalMediaHandle,
        events: MediaEventSink,
    ) -> Result<Box<dyn MediaSession>, MediaError>;
}
