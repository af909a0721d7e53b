use crate::room::NegotiationState;
use crate::signaling::ChannelError;
use crate::transport::MediaError;
use thiserror::Error;

/// Failures that end a join attempt or an established room session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Local capture could not be acquired; no room state was created.
    #[error("local media unavailable: {0}")]
    MediaUnavailable(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("room name must not be empty")]
    EmptyRoom,

    /// The room actor has already torn the session down.
    #[error("room session has ended")]
    Closed,
}

/// Per-peer negotiation failure. Never escapes the peer it belongs to.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: NegotiationState,
    },

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl NegotiationError {
    /// Media failures remove the peer; invalid transitions are only logged.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NegotiationError::Media(_))
    }
}
