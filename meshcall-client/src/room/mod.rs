mod negotiation;
mod peer_registry;
mod peer_task;
mod room;
mod room_command;
mod room_event;
mod room_session;

pub use negotiation::*;
pub use peer_registry::*;
pub use peer_task::PeerCommand;
pub use room_command::*;
pub use room_event::*;
pub use room_session::*;
