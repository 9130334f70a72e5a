use std::sync::Arc;

use crate::chat::ChatService;
use crate::sessions::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    /// Whether a non-empty profile document was found at startup.
    pub profile_loaded: bool,
}

impl AppState {
    pub fn new(chat: ChatService, profile_loaded: bool) -> Self {
        Self {
            chat: Arc::new(chat),
            profile_loaded,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        self.chat.sessions()
    }
}
