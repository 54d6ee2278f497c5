pub mod error_shapes;
pub mod response;
pub mod think;
pub mod upstream;

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// Conversation role accepted on the inbound surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One conversation turn. `content` is kept as raw JSON (plain text or a
/// content-part array) and forwarded verbatim together with any extra
/// per-message fields such as `name` or `tool_call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatMessage {
    #[must_use]
    pub fn text(role: Role, content: &str) -> Self {
        Self {
            role,
            content: serde_json::Value::String(content.to_owned()),
            extra: serde_json::Map::new(),
        }
    }
}

/// Validated inbound chat completion request.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Caller model id; empty when the caller omitted it.
    pub model: String,
    /// Never empty.
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ProxyRequestWire {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    max_tokens: Option<u64>,
    #[serde(default)]
    max_completion_tokens: Option<u64>,
    #[serde(default)]
    stream: Option<bool>,
}

/// Parse and validate an inbound `/v1/chat/completions` body.
///
/// # Errors
///
/// Returns [`ProxyError::InvalidRequest`] when the body is not a JSON object
/// of the expected shape or `messages` is missing or empty.
pub fn parse_proxy_request(body: &[u8]) -> Result<ProxyRequest, ProxyError> {
    let wire: ProxyRequestWire = serde_json::from_slice(body)
        .map_err(|err| ProxyError::InvalidRequest(format!("Invalid request body: {err}")))?;

    let messages = match wire.messages {
        Some(messages) if !messages.is_empty() => messages,
        _ => {
            return Err(ProxyError::InvalidRequest(
                "messages is required and must be a non-empty array".into(),
            ))
        }
    };

    Ok(ProxyRequest {
        model: wire.model.unwrap_or_default().trim().to_owned(),
        messages,
        temperature: wire.temperature,
        max_tokens: wire.max_tokens.or(wire.max_completion_tokens),
        stream: wire.stream,
    })
}
