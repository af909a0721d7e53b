pub mod error;
pub mod model;
pub mod utils;

pub use error::MalformedMessage;
pub use model::*;
