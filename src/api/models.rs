use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::state::AppState;

const MODEL_CREATED_UNIX_SECS: u64 = 1_677_610_602;

/// List every caller-facing alias in `OpenAI` format.
#[must_use]
pub fn handler(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/json"),
        )],
        Body::from(state.models_body()),
    )
        .into_response()
}

/// Pre-render the `/v1/models` body; the alias table never changes at runtime.
pub(crate) fn build_models_response_body(config: &AppConfig) -> Bytes {
    let owned_by = config.upstream.name.as_str();
    let data: Vec<Value> = config
        .models
        .aliases
        .keys()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": MODEL_CREATED_UNIX_SECS,
                "owned_by": owned_by,
            })
        })
        .collect();
    Bytes::from(json!({"object": "list", "data": data}).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_models_body_lists_aliases_in_order() {
        let mut config = AppConfig::with_upstream("https://api.example.com/v1", "k");
        config.upstream.name = "dashscope".into();
        for (alias, target) in [("o1", "qwen3-235b-a22b"), ("gpt-4o", "qwen3-235b-a22b")] {
            config.models.aliases.insert(alias.into(), target.into());
        }
        let body: Value = serde_json::from_slice(&build_models_response_body(&config)).unwrap();
        assert_eq!(body["object"], "list");
        let data = body["data"].as_array().unwrap();
        let ids: Vec<&str> = data.iter().map(|m| m["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["gpt-4o", "o1"]);
        for m in data {
            assert_eq!(m["object"], "model");
            assert_eq!(m["created"], 1_677_610_602);
            assert_eq!(m["owned_by"], "dashscope");
        }
    }

    #[test]
    fn test_models_body_empty_table() {
        let config = AppConfig::with_upstream("https://api.example.com/v1", "k");
        let body: Value = serde_json::from_slice(&build_models_response_body(&config)).unwrap();
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
    }
}
