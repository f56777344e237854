use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary. The session key is never
/// included.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "claude2api-rs is running",
        "config": {
            "upstream": config.upstream.base_url,
            "models_count": config.upstream.models.len(),
            "proxy_enabled": config.upstream.proxy.is_some(),
            "features": {
                "log_level": config.features.log_level,
                "delete_conversation": config.features.delete_conversation,
                "big_context_threshold_chars": config.features.big_context_threshold_chars,
                "role_prefix": config.features.role_prefix,
            }
        }
    }))
}
