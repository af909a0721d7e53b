use crate::room::peer_task::{PeerEvent, PeerSpawner};
use crate::room::{
    ErrorKind, Initiative, NegotiationState, PeerCommand, PeerRegistry, PeerSnapshot,
    RoomCommand, RoomEvent, RoomSnapshot,
};
use crate::signaling::InboundFrame;
use crate::transport::{LocalMedia, TrackKind};
use meshcall_core::{PeerId, SignalBody, SignalMessage};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

pub(crate) const STATUS_NOT_CONNECTED: &str = "Not connected";

pub(crate) fn connected_status(connected: usize) -> String {
    match connected {
        0 => "Connected (alone)".to_owned(),
        1 => "Connected (1 peer)".to_owned(),
        n => format!("Connected ({} peers)", n),
    }
}

enum Exit {
    Leave(oneshot::Sender<()>),
    HandleDropped,
    ChannelLost(String),
}

/// The room actor. Owns the registry and handles caller commands, inbound
/// frames and peer events one at a time.
pub(crate) struct Room {
    registry: PeerRegistry,
    spawner: PeerSpawner,
    local_media: Arc<dyn LocalMedia>,
    command_rx: mpsc::Receiver<RoomCommand>,
    inbound: mpsc::UnboundedReceiver<InboundFrame>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    events: mpsc::UnboundedSender<RoomEvent>,
    status: String,
}

impl Room {
    pub fn new(
        registry: PeerRegistry,
        spawner: PeerSpawner,
        local_media: Arc<dyn LocalMedia>,
        command_rx: mpsc::Receiver<RoomCommand>,
        inbound: mpsc::UnboundedReceiver<InboundFrame>,
        peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
        events: mpsc::UnboundedSender<RoomEvent>,
    ) -> Self {
        Self {
            registry,
            spawner,
            local_media,
            command_rx,
            inbound,
            peer_rx,
            events,
            status: String::new(),
        }
    }

    pub async fn run(mut self) {
        info!(
            "Room {} event loop started for {}",
            self.spawner.room, self.spawner.local_id
        );
        self.broadcast_offers();
        self.update_status();

        let exit = loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(RoomCommand::Leave { done }) => break Exit::Leave(done),
                        Some(c) => self.handle_command(c),
                        None => {
                            info!("Room handle dropped. Leaving room.");
                            break Exit::HandleDropped;
                        }
                    }
                }

                frame = self.inbound.recv() => {
                    match frame {
                        Some(InboundFrame::Text(text)) => self.on_inbound_text(&text),
                        Some(InboundFrame::Closed(reason)) => break Exit::ChannelLost(reason),
                        None => break Exit::ChannelLost("signaling channel dropped".to_owned()),
                    }
                }

                Some(evt) = self.peer_rx.recv() => self.on_peer_event(evt),
            }
        };

        self.teardown(exit).await;
        info!("Room {} event loop finished", self.spawner.room);
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        let media = &self.registry.self_entry().media;
        match cmd {
            RoomCommand::SetMuted { muted } => {
                info!("Local audio {}", if muted { "muted" } else { "unmuted" });
                self.local_media.set_muted(media, TrackKind::Audio, muted);
            }
            RoomCommand::SetVideoEnabled { enabled } => {
                info!("Local video {}", if enabled { "enabled" } else { "disabled" });
                self.local_media.set_muted(media, TrackKind::Video, !enabled);
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            RoomCommand::Leave { .. } => {}
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        let mut peers: Vec<PeerSnapshot> = self
            .registry
            .all()
            .map(|p| PeerSnapshot {
                identity: p.identity.clone(),
                display_name: p.display_name.clone(),
                state: p.negotiation,
            })
            .collect();
        peers.sort_by(|a, b| a.identity.cmp(&b.identity));

        RoomSnapshot {
            identity: self.spawner.local_id.clone(),
            room: self.spawner.room.clone(),
            status: self.status.clone(),
            peers,
        }
    }

    fn on_inbound_text(&mut self, text: &str) {
        match SignalMessage::decode(text) {
            Ok(msg) => self.on_inbound_message(msg),
            Err(e) => {
                warn!("Dropping malformed signal: {}", e);
                self.emit(RoomEvent::Error {
                    kind: ErrorKind::MalformedMessage,
                    message: e.to_string(),
                });
            }
        }
    }

    fn on_inbound_message(&mut self, msg: SignalMessage) {
        let local_id = &self.spawner.local_id;
        if msg.from == *local_id {
            return;
        }
        if msg.room != self.spawner.room {
            warn!("Dropping {:?} from {} for room {}", msg.kind(), msg.from, msg.room);
            return;
        }
        if !msg.is_addressed_to(local_id) {
            debug!("Ignoring {:?} from {} addressed to someone else", msg.kind(), msg.from);
            return;
        }

        let SignalMessage { from, body, .. } = msg;
        debug!("Received {:?} from {}", body.kind(), from);

        match body {
            SignalBody::Join { display_name } => {
                info!("Peer {} joined", from);
                let spawner = &self.spawner;
                self.registry
                    .upsert(&from, display_name.as_deref(), |id| spawner.spawn(id));
                self.broadcast_offers();
            }
            SignalBody::Offer { .. } => self.on_offer(from, body),
            SignalBody::Answer { .. } | SignalBody::Candidate { .. } => {
                let Some(state) = self.registry.get(&from) else {
                    warn!("Dropping {:?} from unknown peer {}", body.kind(), from);
                    return;
                };
                if state.link.send(PeerCommand::Signal(body)).is_err() {
                    warn!("Peer task for {} is gone, dropping signal", from);
                }
            }
        }
    }

    /// Routes an offer, creating the peer if it is unknown. If the peer's
    /// task has already ended but its close is not processed yet, the peer is
    /// removed and started again from this offer.
    fn on_offer(&mut self, from: PeerId, body: SignalBody) {
        let body = match self.route_offer(&from, body) {
            Ok(()) => return,
            Err(body) => body,
        };

        info!("Peer task for {} has ended, restarting it for a new offer", from);
        self.remove_peer(&from);
        if self.route_offer(&from, body).is_err() {
            warn!("Peer task for {} is gone, dropping offer", from);
        }
        self.update_status();
    }

    fn route_offer(&mut self, from: &PeerId, body: SignalBody) -> Result<(), SignalBody> {
        let display_name = match &body {
            SignalBody::Offer { display_name, .. } => display_name.clone(),
            _ => None,
        };
        let spawner = &self.spawner;
        let Some((state, created)) =
            self.registry
                .upsert(from, display_name.as_deref(), |id| spawner.spawn(id))
        else {
            return Ok(());
        };
        if created {
            info!("Peer {} announced itself with an offer", from);
        }
        if state.initiative == Initiative::Pending {
            state.initiative = Initiative::Remote;
        }

        match state.link.send(PeerCommand::Signal(body)) {
            Ok(()) => Ok(()),
            Err(PeerCommand::Signal(body)) => Err(body),
            Err(_) => Ok(()),
        }
    }

    /// Starts an offer towards every peer nobody has offered to yet.
    fn broadcast_offers(&mut self) {
        for state in self.registry.all_mut() {
            if state.initiative != Initiative::Pending
                || state.negotiation != NegotiationState::Idle
            {
                continue;
            }
            state.initiative = Initiative::Local;
            info!("Offering to {}", state.identity);
            if state.link.send(PeerCommand::InitiateOffer).is_err() {
                warn!("Peer task for {} is gone, offer not started", state.identity);
            }
        }
    }

    /// Whether `task` is the task currently serving `peer_id`.
    fn is_current(&self, peer_id: &PeerId, task: u64) -> bool {
        let current = self
            .registry
            .get(peer_id)
            .is_some_and(|p| p.link.id() == task);
        if !current {
            debug!("Ignoring report from retired task {} of {}", task, peer_id);
        }
        current
    }

    fn on_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::StateChanged {
                peer_id,
                task,
                state,
            } => {
                if !self.is_current(&peer_id, task) {
                    return;
                }
                let Some(peer) = self.registry.get_mut(&peer_id) else {
                    return;
                };
                peer.negotiation = state;
                if state == NegotiationState::Connected {
                    info!("Connected to {}", peer_id);
                }
                if state == NegotiationState::Closed {
                    self.remove_peer(&peer_id);
                }
                self.update_status();
            }

            PeerEvent::RemoteMedia {
                peer_id,
                task,
                media,
            } => {
                if !self.is_current(&peer_id, task) {
                    return;
                }
                let Some(peer) = self.registry.get_mut(&peer_id) else {
                    return;
                };
                if peer.media_announced {
                    return;
                }
                peer.media_announced = true;
                let display_name = peer.label();
                self.emit(RoomEvent::PeerVideoAvailable {
                    peer_id,
                    media,
                    display_name,
                });
            }

            PeerEvent::Failed {
                peer_id,
                task,
                error,
            } => {
                if !self.is_current(&peer_id, task) {
                    return;
                }
                error!("Removing peer {} after failure: {}", peer_id, error);
                self.emit(RoomEvent::Error {
                    kind: ErrorKind::Negotiation,
                    message: format!("{}: {}", peer_id, error),
                });
                self.remove_peer(&peer_id);
                self.update_status();
            }

            PeerEvent::UndeliveredOffer { peer_id, body } => {
                debug!("Replaying offer from {} left behind by a closed task", peer_id);
                self.on_offer(peer_id, body);
            }
        }
    }

    fn remove_peer(&mut self, peer_id: &PeerId) {
        if self.registry.remove(peer_id).is_none() {
            return;
        }
        info!("Peer {} removed", peer_id);
        self.emit(RoomEvent::PeerRemoved(peer_id.clone()));
        self.broadcast_offers();
    }

    fn update_status(&mut self) {
        let status = connected_status(self.registry.connected_count());
        self.set_status(status);
    }

    fn set_status(&mut self, status: String) {
        if status == self.status {
            return;
        }
        info!("Status: {}", status);
        self.status = status.clone();
        self.emit(RoomEvent::StatusChanged(status));
    }

    async fn teardown(&mut self, exit: Exit) {
        if let Exit::ChannelLost(reason) = &exit {
            error!("Signaling channel lost: {}", reason);
            self.emit(RoomEvent::Error {
                kind: ErrorKind::Channel,
                message: reason.clone(),
            });
        }

        let mut peers = self.registry.drain();
        for peer in &peers {
            self.emit(RoomEvent::PeerRemoved(peer.identity.clone()));
        }
        for peer in &mut peers {
            peer.link.join().await;
        }

        let media = Arc::clone(&self.registry.self_entry().media);
        self.local_media.release(&media).await;
        self.spawner.output.close().await;

        match exit {
            Exit::Leave(done) => {
                self.set_status(STATUS_NOT_CONNECTED.to_owned());
                let _ = done.send(());
            }
            Exit::HandleDropped => self.set_status(STATUS_NOT_CONNECTED.to_owned()),
            Exit::ChannelLost(reason) => self.set_status(format!("Disconnected: {}", reason)),
        }
    }

    fn emit(&self, event: RoomEvent) {
        if self.events.send(event).is_err() {
            debug!("No one is listening for room events");
        }
    }
}
