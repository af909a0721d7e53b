use async_trait::async_trait;
use meshcall_core::{PeerId, RoomId, SignalMessage};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("failed to connect signaling channel: {0}")]
    Connect(String),

    #[error("failed to send signal: {0}")]
    Send(String),

    #[error("signaling channel closed: {0}")]
    Closed(String),
}

/// Outbound half of a room-scoped signaling channel.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Send one message; `to == None` broadcasts to the room.
    async fn send(&self, msg: SignalMessage) -> Result<(), ChannelError>;

    async fn close(&self);
}

/// What the inbound half of the channel yields. Text is still undecoded so
/// that validation happens in one place, at the room boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Closed(String),
}

pub struct SignalingLink {
    pub output: Arc<dyn SignalingOutput>,
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

/// Opens signaling channels scoped to one room.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    async fn connect(&self, room: &RoomId, identity: &PeerId)
    -> Result<SignalingLink, ChannelError>;
}
