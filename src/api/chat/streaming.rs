use std::time::Duration;

use axum::response::Response;
use bytes::Bytes;

use super::ChatContext;
use crate::error::ProxyError;
use crate::stream::{transcode_stream, TranscodeOptions};

#[inline]
fn sse_ok_response(body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

pub(super) async fn handle_streaming(
    ctx: &ChatContext<'_>,
    upstream_body: Bytes,
) -> Result<Response, ProxyError> {
    let response = ctx.state.transport.send_chat_stream(upstream_body).await?;
    let status = response.status();
    let server = &ctx.state.config.server;
    if !status.is_success() {
        // The stream client has no total timeout; bound the error body here.
        let limit = Duration::from_secs(server.timeout_secs);
        let body = tokio::time::timeout(limit, response.bytes())
            .await
            .map_err(|_| {
                ProxyError::UpstreamUnreachable(format!(
                    "upstream answered {status} but sent no complete error body within {}s",
                    limit.as_secs()
                ))
            })?
            .map_err(|err| ProxyError::UpstreamUnreachable(err.to_string()))?;
        return Err(ctx.rejected(status, &body));
    }

    let options = TranscodeOptions {
        show_reasoning: ctx.state.config.features.show_reasoning,
        idle_timeout: server.stream_idle_timeout_secs.map(Duration::from_secs),
        request_id: ctx.request_id,
    };
    tracing::debug!(
        request_id = %ctx.request_id,
        model = ctx.resolved_model,
        "upstream stream opened"
    );
    let output = transcode_stream(response.bytes_stream(), options);
    Ok(sse_ok_response(axum::body::Body::from_stream(output)))
}
