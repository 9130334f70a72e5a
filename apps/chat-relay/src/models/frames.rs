//! Wire frames exchanged with the browser client.
//!
//! Every turn ends with two outbound text frames: one JSON [`ServerEvent`],
//! then the literal [`END_MARKER`].

use serde::{Deserialize, Serialize};

use crate::models::Role;

/// Literal frame closing one assistant turn.
pub const END_MARKER: &str = "[END]";

/// Inbound JSON shape: `{"message": "..."}`.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub message: String,
}

/// Structured outbound event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ChatResponse { message: String, role: Role },
    Error { message: String },
}

impl ServerEvent {
    pub fn assistant(message: impl Into<String>) -> Self {
        ServerEvent::ChatResponse {
            message: message.into(),
            role: Role::Assistant,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ServerEvent::ChatResponse { message, .. } | ServerEvent::Error { message } => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerEvent::Error { .. })
    }

    /// The two text frames that make up one turn on the wire.
    pub fn into_frames(self) -> Result<[String; 2], serde_json::Error> {
        Ok([serde_json::to_string(&self)?, END_MARKER.to_string()])
    }
}
