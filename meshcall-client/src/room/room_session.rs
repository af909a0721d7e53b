use crate::error::SessionError;
use crate::room::peer_task::PeerSpawner;
use crate::room::room::Room;
use crate::room::{PeerRegistry, RoomCommand, RoomEvent, RoomSnapshot, SelfEntry};
use crate::signaling::SignalingConnector;
use crate::transport::{LocalMedia, MediaSessionFactory};
use meshcall_core::{PeerId, RoomId, SignalMessage};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed identity; a fresh UUID is generated per join when `None`.
    pub identity: Option<PeerId>,
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: None,
            command_buffer: 32,
        }
    }
}

/// Entry point for joining rooms. Holds the collaborators every room
/// session needs; each [`RoomSession::join`] spawns an independent room
/// actor with its own registry.
pub struct RoomSession {
    config: SessionConfig,
    connector: Arc<dyn SignalingConnector>,
    local_media: Arc<dyn LocalMedia>,
    factory: Arc<dyn MediaSessionFactory>,
}

impl RoomSession {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn SignalingConnector>,
        local_media: Arc<dyn LocalMedia>,
        factory: Arc<dyn MediaSessionFactory>,
    ) -> Self {
        Self {
            config,
            connector,
            local_media,
            factory,
        }
    }

    /// Acquires local media, connects signaling, announces the local
    /// participant and starts the room actor.
    ///
    /// Local media is acquired first so that a capture failure leaves no
    /// channel behind. Any failure after that releases the media again.
    pub async fn join(
        &self,
        room: impl Into<RoomId>,
        display_name: &str,
    ) -> Result<(RoomHandle, mpsc::UnboundedReceiver<RoomEvent>), SessionError> {
        let room = room.into();
        if room.is_empty() {
            return Err(SessionError::EmptyRoom);
        }
        let identity = self.config.identity.clone().unwrap_or_else(PeerId::new);

        let media = self
            .local_media
            .acquire()
            .await
            .map_err(|e| SessionError::MediaUnavailable(e.to_string()))?;

        let link = match self.connector.connect(&room, &identity).await {
            Ok(link) => link,
            Err(e) => {
                error!("Could not open signaling for room {}: {}", room, e);
                self.local_media.release(&media).await;
                return Err(e.into());
            }
        };

        let announced_name = (!display_name.is_empty()).then(|| display_name.to_owned());
        let join = SignalMessage::join(room.clone(), identity.clone(), announced_name);
        if let Err(e) = link.output.send(join).await {
            error!("Could not announce {} in room {}: {}", identity, room, e);
            link.output.close().await;
            self.local_media.release(&media).await;
            return Err(e.into());
        }
        info!("Joined room {} as {} ({})", room, identity, display_name);

        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();

        let me = SelfEntry {
            identity: identity.clone(),
            display_name: display_name.to_owned(),
            media: Arc::clone(&media),
        };
        let spawner = PeerSpawner {
            room: room.clone(),
            local_id: identity.clone(),
            local_display_name: display_name.to_owned(),
            local_media: media,
            factory: Arc::clone(&self.factory),
            output: link.output,
            events: peer_tx,
            next_task: AtomicU64::new(1),
        };
        let actor = Room::new(
            PeerRegistry::new(me),
            spawner,
            Arc::clone(&self.local_media),
            command_rx,
            link.inbound,
            peer_rx,
            events_tx,
        );
        let task = tokio::spawn(actor.run());

        let handle = RoomHandle {
            identity,
            room,
            command_tx,
            task,
        };
        Ok((handle, events_rx))
    }
}

/// Caller side of a joined room. Dropping it leaves the room.
pub struct RoomHandle {
    identity: PeerId,
    room: RoomId,
    command_tx: mpsc::Sender<RoomCommand>,
    task: JoinHandle<()>,
}

impl RoomHandle {
    pub fn identity(&self) -> &PeerId {
        &self.identity
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// `false` once the room actor has torn the session down.
    pub fn is_active(&self) -> bool {
        !self.command_tx.is_closed()
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), SessionError> {
        self.send(RoomCommand::SetMuted { muted }).await
    }

    pub async fn set_video_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.send(RoomCommand::SetVideoEnabled { enabled }).await
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Closes every peer, releases local media and closes signaling. Returns
    /// once the room actor has finished. Leaving a room whose session has
    /// already ended is not an error.
    pub async fn leave(self) -> Result<(), SessionError> {
        let (done, done_rx) = oneshot::channel();
        if self.send(RoomCommand::Leave { done }).await.is_ok() {
            let _ = done_rx.await;
        }
        let _ = self.task.await;
        Ok(())
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), SessionError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::Closed)
    }
}
