//! Composable system prompts built from small, independently editable blocks.
//!
//! `cinch-compose` assembles the instruction text handed to an LLM from a
//! catalog of reusable fragments instead of one monolithic string per call
//! site. The same role, quality rules, and output-format guidance is shared
//! across contexts (questions, chat, contract analysis, ...) while each
//! context may carry its own wording, and callers can overlay runtime
//! mode/domain modifiers.
//!
//! # Getting started
//!
//! ```ignore
//! use cinch_compose::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let engine = PromptEngine::builtin(store, &EngineConfig::default());
//!
//!     let prompt = engine
//!         .build("questions", &Selectors::none().with_mode("bulk"), "You are helpful.")
//!         .await;
//!     println!("{prompt}");
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Built-in blocks, modifiers, and compositions:** [`registry`]. The
//!   defaults live in [`registry::defaults`] and are loaded once per process
//!   via [`Registry::builtin()`](registry::Registry::builtin).
//!
//! - **Persisted customizations:** [`overrides`]. Field-level patches
//!   ([`BlockPatch`](overrides::BlockPatch), [`ModifierPatch`](overrides::ModifierPatch))
//!   are read through a TTL snapshot cache by
//!   [`OverrideLayer`](overrides::OverrideLayer). Storage backends implement
//!   [`OverrideStore`](overrides::store::OverrideStore).
//!
//! - **Turning all of that into a prompt:** [`resolve::build()`] is the pure
//!   resolution function; [`PromptEngine`](engine::PromptEngine) wires it to
//!   the override layer.
//!
//! - **Trimming prompts with LLM help:** [`optimize`] sends resolved sections
//!   to a [`Completion`](optimize::Completion) provider, collects reduction
//!   suggestions, previews the diff, and writes the selected subset back.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`registry`] | Blocks, modifiers, compositions, tiers, selector maps |
//! | [`overrides`] | Patches, snapshot cache, store backends |
//! | [`resolve`] | Selectors, sections, the deterministic build |
//! | [`builder`] | Section joining and tagged rendering |
//! | [`engine`] | [`PromptEngine`](engine::PromptEngine) facade |
//! | [`optimize`] | Suggestion analysis, preview, and apply |
//! | [`config`] | [`EngineConfig`](config::EngineConfig) and optimizer settings |

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod optimize;
pub mod overrides;
pub mod prelude;
pub mod registry;
pub mod resolve;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub use error::{ComposeError, Result};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for optimization calls.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`.
///
/// The optimizer embeds this schema in its instruction text and validates
/// the provider's reply against it before deserializing.
///
/// # Example
///
/// ```
/// use cinch_compose::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct Reply {
///     summary: String,
///     #[serde(default)]
///     notes: Option<String>,
/// }
///
/// let schema = json_schema_for::<Reply>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"summary".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// JSON output format type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "json_object")]
    JsonObject,
}

/// JSON output mode.
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from `OpenRouterClient::chat()`.
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> std::result::Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/cinch-rs", "cinch-compose")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> std::result::Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("cinch-compose/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> std::result::Result<ChatCompletion, String> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model.as_deref().unwrap_or("(none)"),
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("OpenRouter API error: {}", err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        match parsed.choices.and_then(|c| c.into_iter().next()) {
            Some(c) => Ok(ChatCompletion {
                content: c.message.content,
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            }),
            None => {
                debug!("LLM output: empty (no choices)");
                Ok(ChatCompletion {
                    content: None,
                    usage: parsed.usage,
                    finish_reason: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content.as_deref(), Some("hello"));

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(serde_json::to_value(&user).unwrap()["role"], "user");
    }

    #[test]
    fn chat_request_default_skips_none_fields() {
        let req = ChatRequest {
            model: Some("test-model".into()),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            temperature: 0.5,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("model").is_some());
        assert!(json.get("response_format").is_none());
        assert_eq!(json["max_tokens"], 100);
    }

    #[test]
    fn chat_request_serializes_json_mode() {
        let req = ChatRequest {
            messages: vec![Message::user("hi")],
            response_format: Some(ResponseFormat {
                fmt_type: ResponseFormatType::JsonObject,
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!(json.get("max_tokens").is_none());
    }
}
