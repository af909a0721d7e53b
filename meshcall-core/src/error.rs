use thiserror::Error;

/// Inbound signaling text that cannot become a [`crate::SignalMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    #[error("undecodable signal: {0}")]
    Decode(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}
