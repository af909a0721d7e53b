mod error;
mod room;
mod signaling;
mod transport;

pub use error::*;
pub use room::*;
pub use signaling::*;
pub use transport::*;

pub use meshcall_core::{PeerId, RoomId, SignalBody, SignalKind, SignalMessage};
