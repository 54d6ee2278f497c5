use axum::response::Response;
use bytes::Bytes;

use super::ChatContext;
use crate::error::ProxyError;
use crate::observability::log_request_complete;
use crate::protocol::response::translate;

#[inline]
fn ok_json_response(body_bytes: Bytes) -> Response {
    let mut response = Response::new(axum::body::Body::from(body_bytes));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

pub(super) async fn handle_non_streaming(
    ctx: &ChatContext<'_>,
    upstream_body: Bytes,
) -> Result<Response, ProxyError> {
    let response = ctx.state.transport.send_chat(upstream_body).await?;
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| ProxyError::UpstreamUnreachable(err.to_string()))?;

    if !status.is_success() {
        return Err(ctx.rejected(status, &body));
    }

    let fallback_id = format!("chatcmpl-{}", ctx.request_id.simple());
    let completion = translate(
        &body,
        ctx.client_model,
        &fallback_id,
        ctx.state.config.features.show_reasoning,
    )?;
    let encoded = serde_json::to_vec(&completion)
        .map_err(|err| ProxyError::Internal(format!("Failed to encode response: {err}")))?;

    log_request_complete(
        &ctx.request_id,
        ctx.resolved_model,
        &completion.usage,
        ctx.started,
    );
    Ok(ok_json_response(Bytes::from(encoded)))
}
