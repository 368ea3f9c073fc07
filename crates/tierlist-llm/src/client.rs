// Claude API streaming client using reqwest-eventsource.
//
// Sends the support conversation to the Anthropic Messages API with
// `stream: true` and forwards the Server-Sent Events as `ChatEvent`s over an
// mpsc channel.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tierlist_core::config::Config;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Events and request messages
// ---------------------------------------------------------------------------

/// Streaming output for one assistant reply. `generation` identifies the
/// request so stale events can be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Token {
        text: String,
        generation: u64,
    },
    Complete {
        full_text: String,
        input_tokens: u32,
        output_tokens: u32,
        generation: u64,
    },
    Error {
        message: String,
        generation: u64,
    },
}

impl ChatEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ChatEvent::Token { generation, .. }
            | ChatEvent::Complete { generation, .. }
            | ChatEvent::Error { generation, .. } => *generation,
        }
    }
}

/// One turn in the Messages API `messages` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiMessage {
    pub role: &'static str,
    pub content: String,
}

// ---------------------------------------------------------------------------
// ClaudeClient
// ---------------------------------------------------------------------------

/// Low-level Claude API streaming client.
pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_endpoint(api_key, model, ANTHROPIC_API_URL.to_string())
    }

    /// Client that posts to `endpoint` instead of the public API.
    pub fn with_endpoint(api_key: String, model: String, endpoint: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            endpoint,
        }
    }

    /// Send the conversation and stream the reply as `ChatEvent`s over `tx`.
    ///
    /// Returns when the stream completes, fails, or the receiver is dropped.
    /// Failures are reported as `ChatEvent::Error`, not as `Err`.
    pub async fn stream_message(
        &self,
        system: &str,
        messages: &[ApiMessage],
        max_tokens: u32,
        tx: mpsc::Sender<ChatEvent>,
        generation: u64,
    ) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            let _ = tx
                .send(ChatEvent::Error {
                    message: "API key not configured".to_string(),
                    generation,
                })
                .await;
            return Ok(());
        }

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "stream": true,
            "system": system,
            "messages": messages,
        });

        let request = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = match request.eventsource() {
            Ok(es) => es,
            Err(e) => {
                let _ = tx
                    .send(ChatEvent::Error {
                        message: format!("Failed to create event source: {e}"),
                        generation,
                    })
                    .await;
                return Ok(());
            }
        };

        let mut full_text = String::new();
        let mut input_tokens: u32 = 0;
        let mut output_tokens: u32 = 0;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("SSE connection opened");
                }
                Ok(Event::Message(msg)) => match msg.event.as_str() {
                    "message_start" => {
                        match parse_input_tokens(&msg.data) {
                            Some(n) => input_tokens = n,
                            None => warn!("failed to parse input_tokens from message_start"),
                        }
                    }
                    "content_block_delta" => {
                        if let Some(text) = parse_delta_text(&msg.data) {
                            full_text.push_str(&text);
                            if tx
                                .send(ChatEvent::Token { text, generation })
                                .await
                                .is_err()
                            {
                                // Receiver gone.
                                es.close();
                                return Ok(());
                            }
                        }
                    }
                    "message_delta" => {
                        if let Some(n) = parse_output_tokens(&msg.data) {
                            output_tokens = n;
                        }
                    }
                    "message_stop" => {
                        debug!(input_tokens, output_tokens, "support reply complete");
                        let _ = tx
                            .send(ChatEvent::Complete {
                                full_text,
                                input_tokens,
                                output_tokens,
                                generation,
                            })
                            .await;
                        es.close();
                        return Ok(());
                    }
                    other => {
                        debug!(event_type = other, "ignoring SSE event");
                    }
                },
                Err(err) => {
                    warn!(?err, "SSE stream error");
                    let _ = tx
                        .send(ChatEvent::Error {
                            message: extract_error_message(&err),
                            generation,
                        })
                        .await;
                    es.close();
                    return Ok(());
                }
            }
        }

        // Stream ended without message_stop.
        let event = if full_text.is_empty() {
            ChatEvent::Error {
                message: "Stream ended unexpectedly without any content".to_string(),
                generation,
            }
        } else {
            ChatEvent::Complete {
                full_text,
                input_tokens,
                output_tokens,
                generation,
            }
        };
        let _ = tx.send(event).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// Either a configured Claude client or disabled (no API key).
pub enum LlmClient {
    Active(ClaudeClient),
    Disabled,
}

impl LlmClient {
    /// `Active` when credentials carry a non-empty API key.
    pub fn from_config(config: &Config) -> Self {
        match &config.credentials.anthropic_api_key {
            Some(key) if !key.trim().is_empty() => {
                LlmClient::Active(ClaudeClient::new(key.trim().to_string(), config.chat.model.clone()))
            }
            _ => LlmClient::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, LlmClient::Active(_))
    }

    /// Stream a reply, or send a single `Error` event when disabled.
    pub async fn stream_message(
        &self,
        system: &str,
        messages: &[ApiMessage],
        max_tokens: u32,
        tx: mpsc::Sender<ChatEvent>,
        generation: u64,
    ) -> anyhow::Result<()> {
        match self {
            LlmClient::Active(client) => {
                client
                    .stream_message(system, messages, max_tokens, tx, generation)
                    .await
            }
            LlmClient::Disabled => {
                let _ = tx
                    .send(ChatEvent::Error {
                        message: "Support chat is not configured".to_string(),
                        generation,
                    })
                    .await;
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SSE JSON parsing helpers
// ---------------------------------------------------------------------------

/// `message.usage.input_tokens` from a `message_start` event.
pub(crate) fn parse_input_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("message")?
        .get("usage")?
        .get("input_tokens")?
        .as_u64()
        .map(|n| n as u32)
}

/// `delta.text` from a `content_block_delta` event.
pub(crate) fn parse_delta_text(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("delta")?.get("text")?.as_str().map(str::to_string)
}

/// `usage.output_tokens` from a `message_delta` event.
pub(crate) fn parse_output_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("usage")?
        .get("output_tokens")?
        .as_u64()
        .map(|n| n as u32)
}

fn extract_error_message(err: &reqwest_eventsource::Error) -> String {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _response) => {
            format!("API returned status {status}")
        }
        reqwest_eventsource::Error::Transport(e) => format!("Network error: {e}"),
        other => format!("Stream error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
