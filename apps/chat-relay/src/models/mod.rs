pub mod frames;
pub mod message;

pub use frames::ServerEvent;
pub use message::{ChatMessage, Role};
