mod non_streaming;
mod streaming;

use std::sync::Arc;
use std::time::Instant;

use axum::response::Response;
use bytes::Bytes;

use crate::error::{into_axum_response, ProxyError};
use crate::protocol::parse_proxy_request;
use crate::protocol::upstream::build_upstream_request;
use crate::state::AppState;

/// Everything a response path needs to know about the request in flight.
pub(crate) struct ChatContext<'a> {
    pub(crate) state: &'a AppState,
    pub(crate) request_id: uuid::Uuid,
    /// Model id echoed back to the caller.
    pub(crate) client_model: &'a str,
    pub(crate) requested_model: &'a str,
    pub(crate) resolved_model: &'a str,
    pub(crate) started: Instant,
}

impl ChatContext<'_> {
    /// Wrap a non-2xx upstream answer, keeping both model ids for debugging.
    pub(crate) fn rejected(&self, status: http::StatusCode, body: &[u8]) -> ProxyError {
        ProxyError::UpstreamRejected {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
            requested_model: self.requested_model.to_owned(),
            resolved_model: self.resolved_model.to_owned(),
        }
    }
}

/// `POST /v1/chat/completions`.
///
/// Always produces exactly one response. Failures before the upstream
/// answers become a JSON error envelope; once a stream has started they are
/// reported in-band.
pub async fn handler(state: Arc<AppState>, body: Bytes) -> Response {
    let request_seq = state.next_request_seq();
    let request_id = state.request_uuid(request_seq);
    match handle(&state, request_id, &body).await {
        Ok(response) => response,
        Err(err) => {
            match err.status().as_u16() {
                400..=499 => tracing::info!(request_id = %request_id, error = %err, "request rejected"),
                _ => tracing::error!(request_id = %request_id, error = %err, "request failed"),
            }
            into_axum_response(&err)
        }
    }
}

async fn handle(
    state: &AppState,
    request_id: uuid::Uuid,
    body: &[u8],
) -> Result<Response, ProxyError> {
    let started = Instant::now();
    let request = parse_proxy_request(body)?;
    let stream = request
        .stream
        .unwrap_or(state.config.features.default_stream);

    let resolution = state
        .resolver
        .resolve(&request.model, &state.transport)
        .await;
    tracing::info!(
        request_id = %request_id,
        requested_model = %request.model,
        resolved_model = %resolution.model,
        source = resolution.source.as_str(),
        stream,
        messages = request.messages.len(),
        "forwarding chat completion"
    );

    let upstream_request =
        build_upstream_request(&request, &resolution.model, &state.upstream_options, stream);
    let upstream_body = serde_json::to_vec(&upstream_request)
        .map(Bytes::from)
        .map_err(|err| ProxyError::Internal(format!("Failed to encode upstream request: {err}")))?;

    let ctx = ChatContext {
        state,
        request_id,
        client_model: if request.model.is_empty() {
            &*resolution.model
        } else {
            request.model.as_str()
        },
        requested_model: &request.model,
        resolved_model: &resolution.model,
        started,
    };

    if stream {
        streaming::handle_streaming(&ctx, upstream_body).await
    } else {
        non_streaming::handle_non_streaming(&ctx, upstream_body).await
    }
}
