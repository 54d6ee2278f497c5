use bytes::Bytes;
use serde::Serialize;

use super::{ChatMessage, ProxyRequest};
use crate::config::AppConfig;

/// Fields the upstream owns and a reasoning directive must never overwrite.
pub const RESERVED_UPSTREAM_FIELDS: &[&str] =
    &["model", "messages", "temperature", "max_tokens", "stream"];

const PROBE_MESSAGE: &str = "Hi";

/// Request defaults derived once from configuration.
#[derive(Debug, Clone)]
pub struct UpstreamOptions {
    pub default_temperature: f64,
    pub default_max_tokens: u64,
    /// Present only while extended reasoning is enabled.
    pub reasoning_directive: Option<serde_json::Map<String, serde_json::Value>>,
}

impl UpstreamOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_temperature: config.upstream.default_temperature,
            default_max_tokens: config.upstream.default_max_tokens,
            reasoning_directive: config
                .features
                .enable_thinking
                .then(|| config.upstream.reasoning_directive.clone())
                .filter(|directive| !directive.is_empty()),
        }
    }
}

/// Body sent to the upstream chat completion endpoint.
#[derive(Debug, Serialize)]
pub struct UpstreamRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f64,
    pub max_tokens: u64,
    pub stream: bool,
    #[serde(flatten)]
    pub reasoning_directive: Option<&'a serde_json::Map<String, serde_json::Value>>,
}

/// Map a validated caller request onto the upstream request shape.
#[must_use]
pub fn build_upstream_request<'a>(
    request: &'a ProxyRequest,
    resolved_model: &'a str,
    options: &'a UpstreamOptions,
    stream: bool,
) -> UpstreamRequest<'a> {
    UpstreamRequest {
        model: resolved_model,
        messages: &request.messages,
        temperature: request.temperature.unwrap_or(options.default_temperature),
        max_tokens: request.max_tokens.unwrap_or(options.default_max_tokens),
        stream,
        reasoning_directive: options.reasoning_directive.as_ref(),
    }
}

/// Smallest possible request used to check whether `model` is served
/// upstream as-is.
#[must_use]
pub fn probe_body(model: &str) -> Bytes {
    let body = serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": PROBE_MESSAGE}],
        "max_tokens": 1,
        "stream": false,
    });
    Bytes::from(body.to_string())
}
