//! WebSocket endpoint: one task per connection, one turn at a time.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use tracing::{debug, error, info, warn};

use crate::models::ServerEvent;
use crate::sessions::ConnectionId;
use crate::state::AppState;

/// GET / and GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = ConnectionId::new();
    // Removes the session however this function exits.
    let _session = state.sessions().guard(conn_id);
    info!(%conn_id, "Client connected");

    let (mut sender, mut receiver) = socket.split();

    if let Some(welcome) = state.chat.welcome_event() {
        if send_turn(&mut sender, welcome).await.is_err() {
            info!(%conn_id, "Client left before the welcome was sent");
            return;
        }
    }

    while let Some(result) = receiver.next().await {
        let event = match result {
            Ok(Message::Text(text)) => {
                debug!(%conn_id, "Received message: {text}");
                state.chat.handle_text(conn_id, &text).await
            }
            Ok(Message::Binary(bytes)) => state.chat.handle_binary(conn_id, bytes).await,
            Ok(Message::Close(_)) => {
                info!(%conn_id, "Client disconnected normally");
                break;
            }
            // Pings are answered by the transport.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Err(e) => {
                warn!(%conn_id, "Client connection dropped: {e}");
                break;
            }
        };

        if event.is_error() {
            debug!(%conn_id, "Sending error event: {}", event.message());
        }
        if let Err(e) = send_turn(&mut sender, event).await {
            info!(%conn_id, "Reply discarded, client went away: {e}");
            break;
        }
    }

    info!(%conn_id, "Connection closed");
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("socket closed: {0}")]
    Socket(#[from] axum::Error),
}

/// Sends one event followed by the end-of-turn marker.
async fn send_turn(
    sender: &mut SplitSink<WebSocket, Message>,
    event: ServerEvent,
) -> Result<(), SendError> {
    let frames = match event.into_frames() {
        Ok(frames) => frames,
        Err(e) => {
            error!("Failed to encode outbound event: {e}");
            crate::errors::ChatError::from(e).into_event().into_frames()?
        }
    };

    for frame in frames {
        sender.send(Message::Text(frame)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio_tungstenite::{connect_async, tungstenite::Message as ClientMessage};

    use crate::chat::ChatService;
    use crate::llm_client::{ChatCompleter, Completion, FallbackReason};
    use crate::models::ChatMessage;
    use crate::routes::build_router;
    use crate::sessions::SessionStore;
    use crate::state::AppState;

    struct Echo;

    #[async_trait]
    impl ChatCompleter for Echo {
        async fn complete(&self, _: &str, history: &[ChatMessage], user: &str) -> Completion {
            if user == "fail" {
                return Completion::Fallback(FallbackReason::Upstream);
            }
            Completion::Reply(format!("{} prior, you said: {user}", history.len()))
        }
    }

    async fn spawn_relay(welcome: Option<&str>) -> (SocketAddr, SessionStore) {
        let sessions = SessionStore::new();
        let chat = ChatService::new(sessions.clone(), Arc::new(Echo), "prompt")
            .with_welcome(welcome.map(str::to_string));
        let app = build_router(AppState::new(chat, true));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, sessions)
    }

    async fn next_text<S>(stream: &mut S) -> String
    where
        S: futures_util::Stream<Item = Result<ClientMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            ClientMessage::Text(text) => text,
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    async fn wait_until_empty(sessions: &SessionStore) {
        for _ in 0..100 {
            if sessions.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("session was not cleaned up");
    }

    #[tokio::test]
    async fn test_full_conversation_over_websocket() {
        let (addr, sessions) = spawn_relay(Some("Hello! Ask me anything.")).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();

        let welcome: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(welcome["type"], "chat_response");
        assert_eq!(welcome["message"], "Hello! Ask me anything.");
        assert_eq!(next_text(&mut ws).await, "[END]");

        ws.send(ClientMessage::Text(
            json!({"message": "What are your technical skills?"}).to_string(),
        ))
        .await
        .unwrap();
        let reply: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(
            reply,
            json!({
                "type": "chat_response",
                "message": "0 prior, you said: What are your technical skills?",
                "role": "assistant"
            })
        );
        assert_eq!(next_text(&mut ws).await, "[END]");
        assert_eq!(sessions.len(), 1);

        // Legacy plain-text frame, continuing the same session.
        ws.send(ClientMessage::Text("and projects?".to_string()))
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(reply["message"], "2 prior, you said: and projects?");
        assert_eq!(next_text(&mut ws).await, "[END]");

        ws.close(None).await.unwrap();
        wait_until_empty(&sessions).await;
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open() {
        let (addr, sessions) = spawn_relay(None).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        ws.send(ClientMessage::Text(json!({"message": "   "}).to_string()))
            .await
            .unwrap();
        let error: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(error["type"], "error");
        assert_eq!(next_text(&mut ws).await, "[END]");
        assert!(sessions.is_empty());

        ws.send(ClientMessage::Text(json!({"message": "fail"}).to_string()))
            .await
            .unwrap();
        let fallback: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(fallback["type"], "chat_response");
        assert_eq!(fallback["message"], FallbackReason::Upstream.message());
        assert_eq!(next_text(&mut ws).await, "[END]");

        ws.send(ClientMessage::Text(json!({"message": "still here?"}).to_string()))
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(reply["message"], "0 prior, you said: still here?");
        assert_eq!(next_text(&mut ws).await, "[END]");
    }

    #[tokio::test]
    async fn test_abrupt_disconnect_cleans_up_session() {
        let (addr, sessions) = spawn_relay(None).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        ws.send(ClientMessage::Text("hi".to_string())).await.unwrap();
        next_text(&mut ws).await;
        next_text(&mut ws).await;
        assert_eq!(sessions.len(), 1);

        drop(ws);
        wait_until_empty(&sessions).await;
    }
}
