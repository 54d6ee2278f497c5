use crate::error::{truncate_on_char_boundary, ErrorCategory};

const UPSTREAM_BODY_MAX_LEN: usize = 2000;

fn error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::NotFound => "not_found_error",
        ErrorCategory::Upstream => "upstream_error",
        ErrorCategory::Stream => "stream_error",
        ErrorCategory::ServerError => "server_error",
    }
}

fn error_code(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request",
        ErrorCategory::NotFound => "not_found",
        ErrorCategory::Upstream => "upstream_unreachable",
        ErrorCategory::Stream => "upstream_stream_error",
        ErrorCategory::ServerError => "server_error",
    }
}

#[must_use]
pub(crate) fn error_payload(cat: ErrorCategory, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": message,
            "type": error_type(cat),
            "code": error_code(cat),
        }
    })
}

/// Envelope for a non-2xx upstream answer: the upstream body (parsed when it
/// is JSON) and the requested/resolved model pair ride along for debugging.
#[must_use]
pub(crate) fn upstream_rejected_payload(
    message: &str,
    status: u16,
    upstream_body: &str,
    requested_model: &str,
    resolved_model: &str,
) -> serde_json::Value {
    let upstream_error = serde_json::from_str::<serde_json::Value>(upstream_body)
        .unwrap_or_else(|_| {
            serde_json::Value::String(truncate_on_char_boundary(
                upstream_body,
                UPSTREAM_BODY_MAX_LEN,
            ))
        });
    serde_json::json!({
        "error": {
            "message": message,
            "type": error_type(ErrorCategory::Upstream),
            "code": status,
            "upstream_error": upstream_error,
            "debug": {
                "requested_model": requested_model,
                "resolved_model": resolved_model,
            },
        }
    })
}
