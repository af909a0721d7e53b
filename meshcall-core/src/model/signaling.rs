use crate::error::MalformedMessage;
use crate::model::peer::PeerId;
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Join,
    Offer,
    Answer,
    Candidate,
}

/// A signaling frame exactly as it travels over the relay.
///
/// Nothing here is validated; [`SignalMessage`] is the checked form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSignal {
    pub kind: SignalKind,
    pub room: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalBody {
    Join {
        display_name: Option<String>,
    },
    Offer {
        sdp: String,
        display_name: Option<String>,
    },
    Answer {
        sdp: String,
    },
    Candidate {
        candidate: String,
    },
}

impl SignalBody {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalBody::Join { .. } => SignalKind::Join,
            SignalBody::Offer { .. } => SignalKind::Offer,
            SignalBody::Answer { .. } => SignalKind::Answer,
            SignalBody::Candidate { .. } => SignalKind::Candidate,
        }
    }
}

/// Validated signaling message. `to == None` means room-wide broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireSignal", into = "WireSignal")]
pub struct SignalMessage {
    pub room: RoomId,
    pub from: PeerId,
    pub to: Option<PeerId>,
    pub body: SignalBody,
}

impl SignalMessage {
    pub fn join(room: RoomId, from: PeerId, display_name: Option<String>) -> Self {
        Self {
            room,
            from,
            to: None,
            body: SignalBody::Join { display_name },
        }
    }

    pub fn offer(
        room: RoomId,
        from: PeerId,
        to: PeerId,
        sdp: String,
        display_name: Option<String>,
    ) -> Self {
        Self {
            room,
            from,
            to: Some(to),
            body: SignalBody::Offer { sdp, display_name },
        }
    }

    pub fn answer(room: RoomId, from: PeerId, to: PeerId, sdp: String) -> Self {
        Self {
            room,
            from,
            to: Some(to),
            body: SignalBody::Answer { sdp },
        }
    }

    pub fn candidate(room: RoomId, from: PeerId, to: PeerId, candidate: String) -> Self {
        Self {
            room,
            from,
            to: Some(to),
            body: SignalBody::Candidate { candidate },
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.body.kind()
    }

    /// Whether a participant with identity `id` should process this message.
    pub fn is_addressed_to(&self, id: &PeerId) -> bool {
        self.to.as_ref().is_none_or(|to| to == id)
    }

    pub fn decode(text: &str) -> Result<Self, MalformedMessage> {
        let wire: WireSignal =
            serde_json::from_str(text).map_err(|e| MalformedMessage::Decode(e.to_string()))?;
        Self::try_from(wire)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TryFrom<WireSignal> for SignalMessage {
    type Error = MalformedMessage;

    fn try_from(wire: WireSignal) -> Result<Self, Self::Error> {
        if wire.room.is_empty() {
            return Err(MalformedMessage::MissingField("room"));
        }
        if wire.from.is_empty() {
            return Err(MalformedMessage::MissingField("from"));
        }

        let display_name = non_empty(wire.display_name);
        let payload = non_empty(wire.payload);

        let body = match wire.kind {
            SignalKind::Join => SignalBody::Join { display_name },
            SignalKind::Offer => SignalBody::Offer {
                sdp: payload.ok_or(MalformedMessage::MissingField("payload"))?,
                display_name,
            },
            SignalKind::Answer => SignalBody::Answer {
                sdp: payload.ok_or(MalformedMessage::MissingField("payload"))?,
            },
            SignalKind::Candidate => SignalBody::Candidate {
                candidate: payload.ok_or(MalformedMessage::MissingField("payload"))?,
            },
        };

        Ok(Self {
            room: RoomId::from(wire.room),
            from: PeerId::from(wire.from),
            to: (!wire.to.is_empty()).then(|| PeerId::from(wire.to)),
            body,
        })
    }
}

impl From<SignalMessage> for WireSignal {
    fn from(msg: SignalMessage) -> Self {
        let kind = msg.kind();
        let (display_name, payload) = match msg.body {
            SignalBody::Join { display_name } => (display_name, None),
            SignalBody::Offer { sdp, display_name } => (display_name, Some(sdp)),
            SignalBody::Answer { sdp } => (None, Some(sdp)),
            SignalBody::Candidate { candidate } => (None, Some(candidate)),
        };

        Self {
            kind,
            room: msg.room.to_string(),
            from: msg.from.to_string(),
            to: msg.to.map(|to| to.to_string()).unwrap_or_default(),
            display_name,
            payload,
        }
    }
}
