pub mod health;
pub mod ws;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Browser clients connect to the bare origin; `/ws` is the explicit alias.
        .route("/", get(ws::ws_handler))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}
