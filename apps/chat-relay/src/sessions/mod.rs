//! Session store: per-connection conversation history.
//!
//! The store is owned by `AppState` and shared by every connection task.
//! Each key is only ever touched by its own connection, but create/remove run
//! concurrently across connections, so the map is sharded (`DashMap`).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::ChatMessage;

/// Identifies one websocket connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ordered user/assistant history of one connection. The system prompt is never stored.
#[derive(Debug, Clone)]
pub struct Session {
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<ConnectionId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the session, creating an empty one if absent.
    #[allow(dead_code)]
    pub fn get_or_create(&self, key: ConnectionId) -> Session {
        self.sessions.entry(key).or_insert_with(Session::new).clone()
    }

    /// Creates the session if absent and copies out at most the last `window`
    /// messages. Older history is never cloned.
    pub fn recent_or_create(&self, key: ConnectionId, window: usize) -> Vec<ChatMessage> {
        let session = self.sessions.entry(key).or_insert_with(Session::new);
        let messages = &session.messages;
        messages[messages.len().saturating_sub(window)..].to_vec()
    }

    /// Appends to an existing session. Returns `false` if the session was
    /// already removed, so a late reply cannot resurrect it.
    #[allow(dead_code)]
    pub fn append(&self, key: ConnectionId, message: ChatMessage) -> bool {
        match self.sessions.get_mut(&key) {
            Some(mut session) => {
                session.messages.push(message);
                true
            }
            None => false,
        }
    }

    /// Records one user/assistant exchange under a single shard lock.
    pub fn append_turn(&self, key: ConnectionId, user: ChatMessage, assistant: ChatMessage) -> bool {
        match self.sessions.get_mut(&key) {
            Some(mut session) => {
                session.messages.push(user);
                session.messages.push(assistant);
                true
            }
            None => false,
        }
    }

    #[allow(dead_code)]
    pub fn history(&self, key: ConnectionId) -> Vec<ChatMessage> {
        self.sessions
            .get(&key)
            .map(|session| session.messages.clone())
            .unwrap_or_default()
    }

    /// Removes the session. Removing an absent key is a no-op.
    pub fn remove(&self, key: ConnectionId) -> Option<Session> {
        self.sessions.remove(&key).map(|(_, session)| session)
    }

    #[allow(dead_code)]
    pub fn contains(&self, key: ConnectionId) -> bool {
        self.sessions.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ties the session's lifetime to the returned guard.
    pub fn guard(&self, key: ConnectionId) -> SessionGuard {
        SessionGuard {
            store: self.clone(),
            key,
        }
    }
}

/// Removes its session when dropped, including when the connection task unwinds.
pub struct SessionGuard {
    store: SessionStore,
    key: ConnectionId,
}

impl SessionGuard {
    #[allow(dead_code)]
    pub fn key(&self) -> ConnectionId {
        self.key
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        match self.store.remove(self.key) {
            Some(session) => {
                let age = Utc::now().signed_duration_since(session.created_at);
                tracing::info!(
                    conn_id = %self.key,
                    messages = session.messages.len(),
                    age_secs = age.num_seconds(),
                    "Session cleaned up"
                );
            }
            None => tracing::debug!(conn_id = %self.key, "No session to clean up"),
        }
    }
}
