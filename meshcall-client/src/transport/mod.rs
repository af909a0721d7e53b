mod connection_wrapper;
mod local_media;
mod media_session;
mod transport_config;
mod transport_event;

pub use connection_wrapper::*;
pub use local_media::*;
pub use media_session::*;
pub use transport_config::*;
pub use transport_event::*;
