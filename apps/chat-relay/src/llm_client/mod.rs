/// LLM Client: the single point of entry for upstream chat-completion calls.
///
/// Speaks the OpenAI-compatible `/chat/completions` contract (OpenRouter by default).
/// Callers never see transport errors: every failure becomes a user-safe
/// [`Completion::Fallback`] and the detail is logged here.
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::LlmSettings;
use crate::models::ChatMessage;

pub mod prompts;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.1-8b-instruct:free";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned no choices")]
    NoChoices,

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Why a turn fell back to an apology instead of a model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Non-200 status or a 200 body without usable content.
    Upstream,
    Timeout,
    /// Connection, DNS or TLS failure.
    Transport,
}

impl FallbackReason {
    pub fn message(self) -> &'static str {
        match self {
            FallbackReason::Upstream => prompts::UPSTREAM_APOLOGY,
            FallbackReason::Timeout => prompts::TIMEOUT_APOLOGY,
            FallbackReason::Transport => prompts::TRANSPORT_APOLOGY,
        }
    }
}

impl From<&LlmError> for FallbackReason {
    fn from(err: &LlmError) -> Self {
        match err {
            LlmError::Http(e) if e.is_timeout() => FallbackReason::Timeout,
            LlmError::Http(e) if e.is_decode() => FallbackReason::Upstream,
            LlmError::Http(_) => FallbackReason::Transport,
            LlmError::Api { .. }
            | LlmError::Parse(_)
            | LlmError::NoChoices
            | LlmError::EmptyContent => FallbackReason::Upstream,
        }
    }
}

/// Outcome of one completion call. Always carries non-empty text for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Reply(String),
    Fallback(FallbackReason),
}

impl Completion {
    pub fn text(&self) -> &str {
        match self {
            Completion::Reply(text) => text,
            Completion::Fallback(reason) => reason.message(),
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Completion::Reply(_))
    }
}

/// Seam between the connection handler and the upstream API.
///
/// Carried in `AppState` as `Arc<dyn ChatCompleter>`.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Completion;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatCompletionResponse {
    /// Content of the first choice.
    pub fn into_text(self) -> Result<String, LlmError> {
        let choice = self.choices.into_iter().next().ok_or(LlmError::NoChoices)?;
        choice
            .message
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyContent)
    }
}

/// Builds the upstream message list: system prompt, the trailing `window`
/// of history, then the new user message.
pub fn build_messages(
    system_prompt: &str,
    history: &[ChatMessage],
    user_message: &str,
    window: usize,
) -> Vec<ChatMessage> {
    let recent = &history[history.len().saturating_sub(window)..];

    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend_from_slice(recent);
    messages.push(ChatMessage::user(user_message));
    messages
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    settings: LlmSettings,
    history_window: usize,
}

impl LlmClient {
    pub fn new(
        api_key: String,
        settings: LlmSettings,
        history_window: usize,
    ) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            api_key,
            settings,
            history_window,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Makes one call upstream and returns the assistant text. Never retries.
    pub async fn call(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request_body = ChatCompletionRequest {
            model: &self.settings.model,
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let response = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        parsed.into_text()
    }
}

#[async_trait]
impl ChatCompleter for LlmClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Completion {
        let messages = build_messages(system_prompt, history, user_message, self.history_window);

        match self.call(&messages).await {
            Ok(text) => Completion::Reply(text),
            Err(err) => {
                let reason = FallbackReason::from(&err);
                match (&err, reason) {
                    (LlmError::Api { status, message }, _) => {
                        error!(status = *status, "LLM API error: {message}")
                    }
                    (_, FallbackReason::Timeout) => warn!(
                        "LLM call timed out after {}s",
                        self.settings.timeout.as_secs()
                    ),
                    _ => error!("LLM call failed: {err}"),
                }
                Completion::Fallback(reason)
            }
        }
    }
}
