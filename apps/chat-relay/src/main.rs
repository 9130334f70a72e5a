mod chat;
mod config;
mod errors;
mod llm_client;
mod models;
mod profile;
mod routes;
mod sessions;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::chat::ChatService;
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::profile::prompts::{build_system_prompt, build_welcome, persona_name};
use crate::routes::build_router;
use crate::sessions::SessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on a missing API key)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting chat relay v{}", env!("CARGO_PKG_VERSION"));

    // Load the profile once; a present but broken document is fatal
    let profile = profile::load(&config.resume_path).context("Failed to load profile document")?;
    let persona = persona_name(config.persona_name.as_deref(), &profile);
    let system_prompt = build_system_prompt(persona, &profile);
    info!(
        "Profile loaded: {} (persona: {persona}, system prompt: {} chars)",
        if profile.is_empty() { "no" } else { "yes" },
        system_prompt.len()
    );

    // Initialize LLM client
    let llm = LlmClient::new(
        config.openrouter_api_key.clone(),
        config.llm.clone(),
        config.history_window,
    )
    .context("Failed to build HTTP client")?;
    info!(
        "LLM client initialized (model: {}, timeout: {}s, history window: {})",
        llm.model(),
        config.llm.timeout.as_secs(),
        config.history_window
    );

    let welcome = config.send_welcome.then(|| build_welcome(persona));
    let chat = ChatService::new(SessionStore::new(), Arc::new(llm), system_prompt)
        .with_welcome(welcome)
        .with_record_failed_turns(config.record_failed_turns)
        .with_history_window(config.history_window);

    // Build app state
    let state = AppState::new(chat, !profile.is_empty());

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("WebSocket server running on ws://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Chat relay shut down");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
