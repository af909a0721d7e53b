use crate::error::NegotiationError;
use crate::room::PeerCommand;
use crate::transport::{
    ConnectionState, LocalMediaHandle, MediaEventSink, MediaSession, MediaSessionFactory, SdpKind,
};
use meshcall_core::{PeerId, RoomId, SignalMessage};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Negotiation progress with one remote peer.
///
/// ```text
/// Idle -> OfferSent -> Answered -> Connected
/// Idle -> OfferReceived -> AnswerSent -> Connected
/// any  -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    OfferSent,
    Answered,
    OfferReceived,
    AnswerSent,
    Connected,
    Closed,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NegotiationState::Idle => "idle",
            NegotiationState::OfferSent => "offer-sent",
            NegotiationState::Answered => "answered",
            NegotiationState::OfferReceived => "offer-received",
            NegotiationState::AnswerSent => "answer-sent",
            NegotiationState::Connected => "connected",
            NegotiationState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Everything an engine needs to build media sessions and address messages.
#[derive(Clone)]
pub struct NegotiationContext {
    pub room: RoomId,
    pub local_id: PeerId,
    pub local_display_name: Option<String>,
    pub remote_id: PeerId,
    pub local_media: LocalMediaHandle,
    pub factory: Arc<dyn MediaSessionFactory>,
    /// The owning peer's mailbox; media events are delivered here.
    pub mailbox: mpsc::UnboundedSender<PeerCommand>,
}

/// Offer/answer/candidate state machine for one remote peer.
///
/// Owns exactly one media session at a time. The only case where the session
/// is swapped is glare on the polite side, where the pending local offer is
/// thrown away together with the session that produced it; the generation
/// counter lets the peer task ignore late events from the discarded session.
pub struct NegotiationEngine {
    ctx: NegotiationContext,
    state: NegotiationState,
    session: Option<Box<dyn MediaSession>>,
    generation: u64,
    remote_description_applied: bool,
    pending_candidates: Vec<String>,
}

impl NegotiationEngine {
    pub async fn open(ctx: NegotiationContext) -> Result<Self, NegotiationError> {
        let sink = MediaEventSink::new(0, ctx.mailbox.clone());
        let session = ctx
            .factory
            .create(&ctx.remote_id, &ctx.local_media, sink)
            .await?;

        Ok(Self {
            ctx,
            state: NegotiationState::Idle,
            session: Some(session),
            generation: 0,
            remote_description_applied: false,
            pending_candidates: Vec::new(),
        })
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn remote_id(&self) -> &PeerId {
        &self.ctx.remote_id
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Under glare the side with the lexicographically lower identity yields.
    pub fn is_polite(&self) -> bool {
        self.ctx.local_id < self.ctx.remote_id
    }

    pub async fn initiate_offer(&mut self) -> Result<SignalMessage, NegotiationError> {
        self.require("initiate an offer", NegotiationState::Idle)?;

        let sdp = self.session()?.create_offer().await?;
        self.transition(NegotiationState::OfferSent);

        Ok(SignalMessage::offer(
            self.ctx.room.clone(),
            self.ctx.local_id.clone(),
            self.ctx.remote_id.clone(),
            sdp,
            self.ctx.local_display_name.clone(),
        ))
    }

    /// Returns the answer to send, or `None` when the offer lost a glare
    /// tie-break and is being ignored.
    pub async fn on_offer_received(
        &mut self,
        sdp: String,
    ) -> Result<Option<SignalMessage>, NegotiationError> {
        match self.state {
            NegotiationState::Idle => {}
            NegotiationState::OfferSent if self.is_polite() => {
                info!(
                    "Glare with {}: discarding own offer and accepting theirs",
                    self.ctx.remote_id
                );
                self.replace_session().await?;
            }
            NegotiationState::OfferSent => {
                info!(
                    "Glare with {}: keeping own offer, ignoring theirs",
                    self.ctx.remote_id
                );
                return Ok(None);
            }
            state => {
                return Err(NegotiationError::InvalidState {
                    operation: "accept an offer",
                    state,
                });
            }
        }

        self.session()?
            .set_remote_description(SdpKind::Offer, sdp)
            .await?;
        self.remote_description_applied = true;
        self.transition(NegotiationState::OfferReceived);
        self.flush_candidates().await;

        let answer = self.session()?.create_answer().await?;
        self.transition(NegotiationState::AnswerSent);

        Ok(Some(SignalMessage::answer(
            self.ctx.room.clone(),
            self.ctx.local_id.clone(),
            self.ctx.remote_id.clone(),
            answer,
        )))
    }

    pub async fn on_answer_received(&mut self, sdp: String) -> Result<(), NegotiationError> {
        self.require("apply an answer", NegotiationState::OfferSent)?;

        self.session()?
            .set_remote_description(SdpKind::Answer, sdp)
            .await?;
        self.remote_description_applied = true;
        self.transition(NegotiationState::Answered);
        self.flush_candidates().await;
        Ok(())
    }

    /// Candidates that arrive before a remote description are held back and
    /// applied, in arrival order, once one is in place.
    pub async fn on_candidate_received(&mut self, candidate: String) {
        if self.state == NegotiationState::Closed {
            return;
        }

        if !self.remote_description_applied {
            debug!(
                "Buffering candidate from {} ({} pending)",
                self.ctx.remote_id,
                self.pending_candidates.len() + 1
            );
            self.pending_candidates.push(candidate);
            return;
        }

        self.apply_candidate(candidate).await;
    }

    /// Wraps a locally gathered candidate for the remote peer.
    pub fn on_local_candidate(&self, candidate: String) -> Option<SignalMessage> {
        if self.state == NegotiationState::Closed {
            return None;
        }

        Some(SignalMessage::candidate(
            self.ctx.room.clone(),
            self.ctx.local_id.clone(),
            self.ctx.remote_id.clone(),
            candidate,
        ))
    }

    pub async fn on_connection_state(&mut self, state: ConnectionState) {
        if state.is_terminal() {
            info!("Media to {} ended: {:?}", self.ctx.remote_id, state);
            self.close().await;
            return;
        }

        match (state, self.state) {
            (
                ConnectionState::Connected,
                NegotiationState::Answered | NegotiationState::AnswerSent,
            ) => self.transition(NegotiationState::Connected),
            (ConnectionState::Connected, current) => debug!(
                "Media to {} reports connected while {}",
                self.ctx.remote_id, current
            ),
            _ => debug!("Media to {} is {:?}", self.ctx.remote_id, state),
        }
    }

    /// Idempotent; the media session is closed at most once.
    pub async fn close(&mut self) {
        if self.state != NegotiationState::Closed {
            self.transition(NegotiationState::Closed);
        }
        self.pending_candidates.clear();

        let Some(session) = self.session.take() else {
            return;
        };
        if let Err(e) = session.close().await {
            warn!("Failed to close media session for {}: {}", self.ctx.remote_id, e);
        }
    }

    fn session(&self) -> Result<&dyn MediaSession, NegotiationError> {
        self.session
            .as_deref()
            .ok_or(NegotiationError::InvalidState {
                operation: "use the media session",
                state: self.state,
            })
    }

    fn require(
        &self,
        operation: &'static str,
        expected: NegotiationState,
    ) -> Result<(), NegotiationError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(NegotiationError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: NegotiationState) {
        debug!(
            "Negotiation with {}: {} -> {}",
            self.ctx.remote_id, self.state, next
        );
        self.state = next;
    }

    async fn replace_session(&mut self) -> Result<(), NegotiationError> {
        if let Some(old) = self.session.take() {
            if let Err(e) = old.close().await {
                warn!("Failed to close discarded session for {}: {}", self.ctx.remote_id, e);
            }
        }

        self.generation += 1;
        let sink = MediaEventSink::new(self.generation, self.ctx.mailbox.clone());
        let session = self
            .ctx
            .factory
            .create(&self.ctx.remote_id, &self.ctx.local_media, sink)
            .await?;
        self.session = Some(session);
        self.transition(NegotiationState::Idle);
        Ok(())
    }

    async fn flush_candidates(&mut self) {
        if self.pending_candidates.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_candidates);
        debug!(
            "Applying {} buffered candidate(s) from {}",
            pending.len(),
            self.ctx.remote_id
        );
        for candidate in pending {
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&self, candidate: String) {
        let Ok(session) = self.session() else {
            return;
        };
        // Candidates of a discarded glare offer land here and are expected to fail.
        if let Err(e) = session.add_remote_candidate(candidate).await {
            warn!("Failed to add ICE candidate for {}: {}", self.ctx.remote_id, e);
        }
    }
}
