use crate::error::NegotiationError;
use crate::room::{NegotiationContext, NegotiationEngine, NegotiationState, PeerLink};
use crate::signaling::SignalingOutput;
use crate::transport::{LocalMediaHandle, MediaEvent, MediaSessionFactory, RemoteMedia};
use meshcall_core::{PeerId, RoomId, SignalBody, SignalMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Mailbox messages for one peer task.
#[derive(Debug)]
pub enum PeerCommand {
    InitiateOffer,
    Signal(SignalBody),
    Media { generation: u64, event: MediaEvent },
}

/// What peer tasks report back to the room actor. `task` identifies the
/// task that produced the event, so that reports from a task the room has
/// already replaced can be told apart.
#[derive(Debug)]
pub(crate) enum PeerEvent {
    StateChanged {
        peer_id: PeerId,
        task: u64,
        state: NegotiationState,
    },
    RemoteMedia {
        peer_id: PeerId,
        task: u64,
        media: RemoteMedia,
    },
    Failed {
        peer_id: PeerId,
        task: u64,
        error: String,
    },
    /// An offer that reached the mailbox after the engine had closed.
    UndeliveredOffer { peer_id: PeerId, body: SignalBody },
}

/// Everything shared by the peer tasks of one room.
pub(crate) struct PeerSpawner {
    pub room: RoomId,
    pub local_id: PeerId,
    pub local_display_name: String,
    pub local_media: LocalMediaHandle,
    pub factory: Arc<dyn MediaSessionFactory>,
    pub output: Arc<dyn SignalingOutput>,
    pub events: mpsc::UnboundedSender<PeerEvent>,
    pub next_task: AtomicU64,
}

impl PeerSpawner {
    pub fn spawn(&self, remote_id: &PeerId) -> PeerLink {
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let ctx = NegotiationContext {
            room: self.room.clone(),
            local_id: self.local_id.clone(),
            local_display_name: Some(self.local_display_name.clone()),
            remote_id: remote_id.clone(),
            local_media: Arc::clone(&self.local_media),
            factory: Arc::clone(&self.factory),
            mailbox: mailbox_tx.clone(),
        };
        let id = self.next_task.fetch_add(1, Ordering::Relaxed);
        let task = PeerTask {
            id,
            remote_id: remote_id.clone(),
            output: Arc::clone(&self.output),
            events: self.events.clone(),
        };

        let handle = tokio::spawn(task.run(ctx, mailbox_rx, shutdown_rx));
        PeerLink::new(id, mailbox_tx, shutdown_tx, handle)
    }
}

struct PeerTask {
    id: u64,
    remote_id: PeerId,
    output: Arc<dyn SignalingOutput>,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerTask {
    async fn run(
        self,
        ctx: NegotiationContext,
        mut mailbox: mpsc::UnboundedReceiver<PeerCommand>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut engine = tokio::select! {
            biased;
            _ = &mut shutdown => return,
            opened = NegotiationEngine::open(ctx) => match opened {
                Ok(engine) => engine,
                Err(e) => {
                    error!("Failed to open media session for {}: {}", self.remote_id, e);
                    self.report(PeerEvent::Failed {
                        peer_id: self.remote_id.clone(),
                        task: self.id,
                        error: e.to_string(),
                    });
                    return;
                }
            },
        };
        debug!("Peer task for {} started", self.remote_id);

        loop {
            let cmd = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                cmd = mailbox.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };

            let before = engine.state();
            let result = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                result = self.step(&mut engine, cmd) => result,
            };

            if let Err(e) = result {
                if e.is_fatal() {
                    error!("Negotiation with {} failed: {}", self.remote_id, e);
                    engine.close().await;
                    self.report(PeerEvent::Failed {
                        peer_id: self.remote_id.clone(),
                        task: self.id,
                        error: e.to_string(),
                    });
                    break;
                }
                warn!("Ignoring signal from {}: {}", self.remote_id, e);
            }

            let after = engine.state();
            if after != before {
                self.report(PeerEvent::StateChanged {
                    peer_id: self.remote_id.clone(),
                    task: self.id,
                    state: after,
                });
            }
            if after == NegotiationState::Closed {
                break;
            }
        }

        mailbox.close();
        while let Ok(cmd) = mailbox.try_recv() {
            if let PeerCommand::Signal(body @ SignalBody::Offer { .. }) = cmd {
                self.report(PeerEvent::UndeliveredOffer {
                    peer_id: self.remote_id.clone(),
                    body,
                });
            }
        }

        engine.close().await;
        debug!("Peer task for {} finished", self.remote_id);
    }

    /// Applies one command and sends whatever the engine produced.
    async fn step(
        &self,
        engine: &mut NegotiationEngine,
        cmd: PeerCommand,
    ) -> Result<(), NegotiationError> {
        let outbound = match cmd {
            PeerCommand::InitiateOffer => Some(engine.initiate_offer().await?),
            PeerCommand::Signal(body) => self.on_signal(engine, body).await?,
            PeerCommand::Media { generation, event } => {
                if generation != engine.generation() {
                    debug!(
                        "Dropping event from replaced session {} of {}",
                        generation, self.remote_id
                    );
                    None
                } else {
                    self.on_media(engine, event).await
                }
            }
        };

        if let Some(msg) = outbound {
            let kind = msg.kind();
            if let Err(e) = self.output.send(msg).await {
                error!("Failed to send {:?} to {}: {}", kind, self.remote_id, e);
            }
        }
        Ok(())
    }

    async fn on_signal(
        &self,
        engine: &mut NegotiationEngine,
        body: SignalBody,
    ) -> Result<Option<SignalMessage>, NegotiationError> {
        match body {
            SignalBody::Offer { sdp, .. } => engine.on_offer_received(sdp).await,
            SignalBody::Answer { sdp } => {
                engine.on_answer_received(sdp).await?;
                Ok(None)
            }
            SignalBody::Candidate { candidate } => {
                engine.on_candidate_received(candidate).await;
                Ok(None)
            }
            SignalBody::Join { .. } => Ok(None),
        }
    }

    async fn on_media(
        &self,
        engine: &mut NegotiationEngine,
        event: MediaEvent,
    ) -> Option<SignalMessage> {
        match event {
            MediaEvent::ConnectionState(state) => {
                engine.on_connection_state(state).await;
                None
            }
            MediaEvent::RemoteTrack(media) => {
                info!("Remote {} track from {}", media.kind, self.remote_id);
                self.report(PeerEvent::RemoteMedia {
                    peer_id: self.remote_id.clone(),
                    task: self.id,
                    media,
                });
                None
            }
            MediaEvent::LocalCandidate(candidate) => engine.on_local_candidate(candidate),
        }
    }

    fn report(&self, event: PeerEvent) {
        if self.events.send(event).is_err() {
            debug!("Room is gone, dropping event from {}", self.remote_id);
        }
    }
}
