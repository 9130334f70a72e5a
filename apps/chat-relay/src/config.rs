use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::{DEFAULT_API_URL, DEFAULT_MODEL};

/// Relay configuration loaded from environment variables.
/// Startup fails if the upstream credential is missing or a value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub openrouter_api_key: String,
    pub port: u16,
    pub resume_path: PathBuf,
    /// Overrides the name taken from the profile document.
    pub persona_name: Option<String>,
    pub llm: LlmSettings,
    /// Trailing window of stored messages sent upstream with each turn.
    pub history_window: usize,
    /// Keep fallback apologies in the conversation history.
    pub record_failed_turns: bool,
    pub send_welcome: bool,
    pub rust_log: String,
}

/// Upstream chat-completion settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable source. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = LlmSettings::default();
        let api_key = require_env(&lookup, "OPENROUTER_API_KEY")?;
        if api_key.trim().is_empty() {
            anyhow::bail!("Required environment variable 'OPENROUTER_API_KEY' is empty");
        }

        Ok(Config {
            openrouter_api_key: api_key,
            port: parse_env(&lookup, "PORT", 8765)?,
            resume_path: lookup("RESUME_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("resume.json")),
            persona_name: lookup("PERSONA_NAME")
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            llm: LlmSettings {
                api_url: lookup("LLM_API_URL").unwrap_or(defaults.api_url),
                model: lookup("LLM_MODEL").unwrap_or(defaults.model),
                max_tokens: parse_env(&lookup, "LLM_MAX_TOKENS", defaults.max_tokens)?,
                temperature: parse_env(&lookup, "LLM_TEMPERATURE", defaults.temperature)?,
                timeout: Duration::from_secs(parse_env(
                    &lookup,
                    "LLM_TIMEOUT_SECS",
                    defaults.timeout.as_secs(),
                )?),
            },
            history_window: parse_env(&lookup, "HISTORY_WINDOW", 10)?,
            record_failed_turns: parse_env(&lookup, "RECORD_FAILED_TURNS", false)?,
            send_welcome: parse_env(&lookup, "SEND_WELCOME", true)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn require_env(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Reads an optional variable, falling back to `default` when unset.
/// A value that is present but unparseable is a startup error.
fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value: '{raw}'"))
}
