use serde::{Deserialize, Serialize};

use super::think::wrap_reasoning;
use crate::error::ProxyError;
use crate::util::unix_now_secs;

#[derive(Debug, Default, Deserialize)]
struct UpstreamResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    created: Option<serde_json::Number>,
    #[serde(default)]
    choices: Option<Vec<UpstreamChoice>>,
    #[serde(default)]
    usage: Option<UpstreamUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamChoice {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    message: Option<UpstreamMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

/// Caller-facing chat completion body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl From<Option<UpstreamUsage>> for Usage {
    fn from(usage: Option<UpstreamUsage>) -> Self {
        let usage = usage.unwrap_or_default();
        let prompt_tokens = usage.prompt_tokens.unwrap_or(0);
        let completion_tokens = usage.completion_tokens.unwrap_or(0);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: usage
                .total_tokens
                .unwrap_or_else(|| prompt_tokens.saturating_add(completion_tokens)),
        }
    }
}

/// Some upstreams send `created` as a float.
fn timestamp_secs(created: &serde_json::Number) -> Option<u64> {
    created.as_u64().or_else(|| {
        created
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs >= 0.0 && *secs < u64::MAX as f64)
            .map(|secs| secs as u64)
    })
}

/// Translate a complete upstream body into the caller's response shape.
///
/// Reasoning is folded into the content inside think delimiters when
/// `show_reasoning` is set and dropped otherwise. `model` is echoed back as
/// the caller requested it; `fallback_id` is used when the upstream body
/// carries no id.
///
/// # Errors
///
/// Returns [`ProxyError::Internal`] when the upstream body is not a chat
/// completion JSON object.
pub fn translate(
    body: &[u8],
    model: &str,
    fallback_id: &str,
    show_reasoning: bool,
) -> Result<ChatCompletion, ProxyError> {
    let upstream: UpstreamResponse = serde_json::from_slice(body).map_err(|err| {
        ProxyError::Internal(format!("Upstream returned an unreadable body: {err}"))
    })?;

    let choices = upstream
        .choices
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, choice)| {
            let message = choice.message.unwrap_or_default();
            let answer = message.content.unwrap_or_default();
            let content = match message.reasoning_content.as_deref() {
                Some(reasoning) if show_reasoning && !reasoning.is_empty() => {
                    wrap_reasoning(reasoning, &answer)
                }
                _ => answer,
            };
            ChatChoice {
                index: choice
                    .index
                    .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX)),
                message: AssistantMessage {
                    role: message
                        .role
                        .unwrap_or_else(|| "assistant".to_string()),
                    content,
                },
                finish_reason: choice.finish_reason,
            }
        })
        .collect();

    Ok(ChatCompletion {
        id: upstream.id.unwrap_or_else(|| fallback_id.to_owned()),
        object: "chat.completion".to_string(),
        created: upstream
            .created
            .as_ref()
            .and_then(timestamp_secs)
            .unwrap_or_else(unix_now_secs),
        model: model.to_owned(),
        choices,
        usage: upstream.usage.into(),
    })
}
