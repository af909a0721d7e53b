use crate::room::{NegotiationState, PeerCommand};
use crate::transport::LocalMediaHandle;
use meshcall_core::PeerId;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// The local participant. Holds the media handle every engine shares.
#[derive(Debug, Clone)]
pub struct SelfEntry {
    pub identity: PeerId,
    pub display_name: String,
    pub media: LocalMediaHandle,
}

/// Which side has started negotiating with a peer, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiative {
    Pending,
    Local,
    Remote,
}

/// Handle to a running peer task.
pub struct PeerLink {
    id: u64,
    mailbox: mpsc::UnboundedSender<PeerCommand>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PeerLink {
    pub fn new(
        id: u64,
        mailbox: mpsc::UnboundedSender<PeerCommand>,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            mailbox,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Hands the command back if the task has already stopped.
    pub fn send(&self, cmd: PeerCommand) -> Result<(), PeerCommand> {
        self.mailbox.send(cmd).map_err(|e| e.0)
    }

    /// Ask the task to stop. Further calls do nothing.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_none()
    }

    /// Wait for the task to finish closing its engine.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

pub struct PeerState {
    pub identity: PeerId,
    pub display_name: Option<String>,
    /// Last state reported by the peer task.
    pub negotiation: NegotiationState,
    pub initiative: Initiative,
    pub media_announced: bool,
    pub link: PeerLink,
}

impl PeerState {
    /// Display name for events, falling back to the identity.
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.identity.to_string())
    }

    pub fn is_connected(&self) -> bool {
        self.negotiation == NegotiationState::Connected
    }
}

/// Known participants of one room. Owned by the room actor, which is its
/// only writer.
pub struct PeerRegistry {
    me: SelfEntry,
    peers: HashMap<PeerId, PeerState>,
}

impl PeerRegistry {
    pub fn new(me: SelfEntry) -> Self {
        Self {
            me,
            peers: HashMap::new(),
        }
    }

    pub fn self_entry(&self) -> &SelfEntry {
        &self.me
    }

    /// Returns the entry for `identity`, creating it with a task from `spawn`
    /// if it is new. The flag is `true` when the entry was created. A
    /// non-empty `display_name` replaces the stored one. Returns `None` for
    /// the local identity.
    pub fn upsert<F>(
        &mut self,
        identity: &PeerId,
        display_name: Option<&str>,
        spawn: F,
    ) -> Option<(&mut PeerState, bool)>
    where
        F: FnOnce(&PeerId) -> PeerLink,
    {
        if *identity == self.me.identity {
            return None;
        }

        let display_name = display_name.filter(|n| !n.is_empty());
        let created = !self.peers.contains_key(identity);
        let state = self.peers.entry(identity.clone()).or_insert_with(|| {
            debug!("Registering peer {}", identity);
            PeerState {
                identity: identity.clone(),
                display_name: None,
                negotiation: NegotiationState::Idle,
                initiative: Initiative::Pending,
                media_announced: false,
                link: spawn(identity),
            }
        });

        if let Some(name) = display_name {
            state.display_name = Some(name.to_owned());
        }

        Some((state, created))
    }

    pub fn get(&self, identity: &PeerId) -> Option<&PeerState> {
        self.peers.get(identity)
    }

    pub fn get_mut(&mut self, identity: &PeerId) -> Option<&mut PeerState> {
        self.peers.get_mut(identity)
    }

    pub fn contains(&self, identity: &PeerId) -> bool {
        self.peers.contains_key(identity)
    }

    /// Removes the peer and signals its task to close the engine.
    pub fn remove(&mut self, identity: &PeerId) -> Option<PeerState> {
        let mut state = self.peers.remove(identity)?;
        state.link.shutdown();
        debug!("Unregistered peer {}", identity);
        Some(state)
    }

    pub fn all(&self) -> impl Iterator<Item = &PeerState> {
        self.peers.values()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut PeerState> {
        self.peers.values_mut()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.peers.values().filter(|p| p.is_connected()).count()
    }

    /// Removes every peer, signalling each task to shut down.
    pub fn drain(&mut self) -> Vec<PeerState> {
        let mut drained: Vec<PeerState> = self.peers.drain().map(|(_, state)| state).collect();
        for state in &mut drained {
            state.link.shutdown();
        }
        drained
    }
}
