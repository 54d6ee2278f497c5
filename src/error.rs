use crate::protocol::error_shapes::{error_payload, upstream_rejected_payload};

/// Error type shared by every request path.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream API error (status {status}): {}", upstream_error_message(.body))]
    UpstreamRejected {
        status: u16,
        body: String,
        requested_model: String,
        resolved_model: String,
    },
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("Upstream stream failed: {0}")]
    StreamTransport(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code and envelope selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    NotFound,
    Upstream,
    Stream,
    ServerError,
}

impl ProxyError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProxyError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            ProxyError::NotFound(_) => ErrorCategory::NotFound,
            ProxyError::UpstreamRejected { .. } | ProxyError::UpstreamUnreachable(_) => {
                ErrorCategory::Upstream
            }
            ProxyError::StreamTransport(_) => ErrorCategory::Stream,
            ProxyError::Config(_) | ProxyError::Internal(_) => ErrorCategory::ServerError,
        }
    }

    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            ProxyError::NotFound(_) => http::StatusCode::NOT_FOUND,
            ProxyError::UpstreamRejected { status, .. } => http::StatusCode::from_u16(*status)
                .ok()
                .filter(|status| status.is_client_error() || status.is_server_error())
                .unwrap_or(http::StatusCode::BAD_GATEWAY),
            ProxyError::UpstreamUnreachable(_)
            | ProxyError::StreamTransport(_)
            | ProxyError::Config(_)
            | ProxyError::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Pull a human-readable message out of an upstream error body.
///
/// Prefers `error.message` from a JSON body, falls back to the raw text.
#[must_use]
pub fn upstream_error_message(body: &str) -> String {
    const MAX_LEN: usize = 500;

    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(serde_json::Value::as_str)
                .or_else(|| json.get("message").and_then(serde_json::Value::as_str))
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.trim().to_owned());

    if message.is_empty() {
        return "empty error body".to_string();
    }
    truncate_on_char_boundary(&message, MAX_LEN)
}

pub(crate) fn truncate_on_char_boundary(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_owned();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Format an error as `(status_code, JSON envelope)`.
#[must_use]
pub fn format_error(err: &ProxyError) -> (http::StatusCode, serde_json::Value) {
    let status = err.status();
    let body = match err {
        ProxyError::UpstreamRejected {
            status: upstream_status,
            body,
            requested_model,
            resolved_model,
        } => upstream_rejected_payload(
            &err.to_string(),
            *upstream_status,
            body,
            requested_model,
            resolved_model,
        ),
        _ => error_payload(err.category(), &err.to_string()),
    };
    (status, body)
}

/// Convert a `ProxyError` into an axum response carrying the JSON envelope.
#[must_use]
pub fn into_axum_response(err: &ProxyError) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err);
    (status, axum::Json(body)).into_response()
}

impl axum::response::IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self)
    }
}
