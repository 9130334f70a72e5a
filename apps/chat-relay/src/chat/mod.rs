//! Chat turn handling: parse one inbound frame, run it through the completer,
//! and record the exchange in the connection's session.
//!
//! The websocket layer (`routes::ws`) owns the socket. This module decides
//! what to say back and never touches the transport.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::errors::ChatError;
use crate::llm_client::ChatCompleter;
use crate::models::frames::InboundFrame;
use crate::models::{ChatMessage, ServerEvent};
use crate::sessions::{ConnectionId, SessionStore};

pub struct ChatService {
    sessions: SessionStore,
    completer: Arc<dyn ChatCompleter>,
    system_prompt: Arc<str>,
    welcome: Option<String>,
    record_failed_turns: bool,
    history_window: usize,
}

impl ChatService {
    pub fn new(
        sessions: SessionStore,
        completer: Arc<dyn ChatCompleter>,
        system_prompt: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            sessions,
            completer,
            system_prompt: system_prompt.into(),
            welcome: None,
            record_failed_turns: false,
            history_window: usize::MAX,
        }
    }

    /// Greeting sent as the first turn of every connection.
    pub fn with_welcome(mut self, welcome: Option<String>) -> Self {
        self.welcome = welcome;
        self
    }

    /// Whether fallback apologies are kept in the conversation history.
    pub fn with_record_failed_turns(mut self, record: bool) -> Self {
        self.record_failed_turns = record;
        self
    }

    /// Stored messages copied out of the session per turn. Should match the
    /// completer's own trailing window.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn welcome_event(&self) -> Option<ServerEvent> {
        self.welcome.as_deref().map(ServerEvent::assistant)
    }

    /// Handles one text frame. Always yields exactly one event; failures
    /// (including a panic inside the turn) become an `error` event.
    pub async fn handle_text(&self, conn_id: ConnectionId, raw: &str) -> ServerEvent {
        match AssertUnwindSafe(self.run_turn(conn_id, raw))
            .catch_unwind()
            .await
        {
            Ok(Ok(event)) => event,
            Ok(Err(err)) => {
                warn!(%conn_id, code = err.code(), "Rejected message: {err}");
                err.into_event()
            }
            Err(_) => {
                error!(%conn_id, "Chat turn panicked");
                ChatError::Internal("chat turn panicked".to_string()).into_event()
            }
        }
    }

    /// Binary frames are accepted when they carry UTF-8 text.
    pub async fn handle_binary(&self, conn_id: ConnectionId, bytes: Vec<u8>) -> ServerEvent {
        match String::from_utf8(bytes) {
            Ok(text) => self.handle_text(conn_id, &text).await,
            Err(_) => {
                warn!(%conn_id, "Rejected non UTF-8 binary frame");
                ChatError::InvalidEncoding.into_event()
            }
        }
    }

    async fn run_turn(&self, conn_id: ConnectionId, raw: &str) -> Result<ServerEvent, ChatError> {
        let user_message = parse_user_message(raw)?;
        let history = self
            .sessions
            .recent_or_create(conn_id, self.history_window);

        debug!(%conn_id, history = history.len(), "Forwarding message upstream");
        let completion = self
            .completer
            .complete(&self.system_prompt, &history, &user_message)
            .await;

        if completion.is_reply() || self.record_failed_turns {
            let recorded = self.sessions.append_turn(
                conn_id,
                ChatMessage::user(user_message),
                ChatMessage::assistant(completion.text()),
            );
            if !recorded {
                info!(%conn_id, "Session closed before the reply arrived, discarding");
            }
        }

        Ok(ServerEvent::assistant(completion.text()))
    }
}

/// Extracts the user's text from a frame.
///
/// - JSON object: must carry a string `message` field.
/// - JSON string: its decoded value.
/// - Anything else (plain text, numbers, arrays): the raw frame.
///
/// The result is trimmed and must be non-empty.
pub fn parse_user_message(raw: &str) -> Result<String, ChatError> {
    let text = match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => {
            serde_json::from_value::<InboundFrame>(value)
                .map_err(|e| ChatError::InvalidFormat(e.to_string()))?
                .message
        }
        Ok(Value::String(text)) => text,
        Ok(_) | Err(_) => raw.to_string(),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    Ok(trimmed.to_string())
}
