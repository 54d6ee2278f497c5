use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and feature flags.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let features = &state.config.features;
    Json(json!({
        "status": "healthy",
        "service": "reasonify-rs",
        "show_reasoning": features.show_reasoning,
        "enable_thinking": features.enable_thinking,
        "default_stream": features.default_stream,
        "aliases": state.resolver.alias_count(),
        "memo_entries": state.resolver.memo().len(),
    }))
}
