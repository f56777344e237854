use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;

use crate::api::common::ok_json_response;
use crate::config::UpstreamConfig;
use crate::protocol::openai_chat::{OpenAiModel, OpenAiModelList};
use crate::session::THINK_SUFFIX;
use crate::state::AppState;

const MODEL_CREATED_AT: u64 = 1_677_610_602;
const MODEL_OWNER: &str = "anthropic";

/// Build the `/v1/models` body: every configured model followed by its
/// `-think` reasoning variant.
#[must_use]
pub fn build_models_response_body(upstream: &UpstreamConfig) -> bytes::Bytes {
    let entry = |id: String| OpenAiModel {
        id,
        object: "model".to_string(),
        created: MODEL_CREATED_AT,
        owned_by: MODEL_OWNER.to_string(),
    };
    let mut data = Vec::with_capacity(upstream.models.len() * 2);
    for model in &upstream.models {
        data.push(entry(model.clone()));
        data.push(entry(format!("{model}{THINK_SUFFIX}")));
    }
    let list = OpenAiModelList {
        object: "list".to_string(),
        data,
    };
    serde_json::to_vec(&list).map_or_else(
        |_| bytes::Bytes::from_static(br#"{"object":"list","data":[]}"#),
        bytes::Bytes::from,
    )
}

/// List the configured models in `OpenAI` format.
#[must_use]
pub fn handler(State(state): State<Arc<AppState>>) -> Response {
    ok_json_response(state.models_response_body())
}
