use thiserror::Error;

use crate::models::ServerEvent;

/// Errors raised while handling one inbound frame.
/// None of them close the connection: each becomes an `error` event for the client.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Empty message received")]
    EmptyMessage,

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Binary frame is not valid UTF-8")]
    InvalidEncoding,

    #[error("Failed to encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Stable code for log filtering.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::EmptyMessage => "EMPTY_MESSAGE",
            ChatError::InvalidFormat(_) => "INVALID_FORMAT",
            ChatError::InvalidEncoding => "INVALID_ENCODING",
            ChatError::Encode(_) => "ENCODE_ERROR",
            ChatError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Maps the error to the event sent to the client. Internal detail stays in the logs.
    pub fn into_event(self) -> ServerEvent {
        let message = match &self {
            ChatError::EmptyMessage => "Empty message received",
            ChatError::InvalidFormat(detail) => {
                tracing::debug!(code = self.code(), "Rejected frame: {detail}");
                "Invalid message format. Send {\"message\": \"...\"} or plain text."
            }
            ChatError::InvalidEncoding => "Binary messages must be UTF-8 text",
            ChatError::Encode(e) => {
                tracing::error!(code = self.code(), "Encode error: {e}");
                "An error occurred while processing your message"
            }
            ChatError::Internal(detail) => {
                tracing::error!(code = self.code(), "Internal error: {detail}");
                "An error occurred while processing your message"
            }
        };

        ServerEvent::error(message)
    }
}
