mod prompt;
mod sink;

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::api::common::{ok_json_response, sse_ok_response};
use crate::error::CanonicalError;
use crate::protocol::openai_chat::response_encoder::encode_openai_chat_response;
use crate::protocol::openai_chat::stream::OpenAiChunkEncoder;
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::session::ResolvedModel;
use crate::state::AppState;
use crate::stream::{translate, AlwaysListening, TranslateOutcome};
use crate::util::unix_now_secs;

pub use prompt::{render_prompt, RenderedPrompt, BIG_CONTEXT_PROMPT};
use prompt::build_outgoing_message;
use sink::{AggregateSink, ChannelSink};

const STREAM_CHANNEL_CAPACITY: usize = 32;

/// `POST /v1/chat/completions`.
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: OpenAiChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return CanonicalError::InvalidRequest(format!("invalid request body: {err}"))
                .into_response()
        }
    };
    if request.messages.is_empty() {
        return CanonicalError::InvalidRequest("messages must not be empty".to_string())
            .into_response();
    }
    match complete(state, request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "chat completion failed");
            err.into_response()
        }
    }
}

async fn complete(
    state: Arc<AppState>,
    request: OpenAiChatRequest,
) -> Result<Response, CanonicalError> {
    let streaming = request.is_streaming();
    let model = ResolvedModel::resolve(&request.model);
    let message =
        build_outgoing_message(&state.session, &state.config.features, &request.messages).await?;

    let conversation_id = state.session.create_conversation(&model).await?;
    let upstream = match state
        .session
        .send_message(&conversation_id, &model, &message)
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => {
            schedule_conversation_cleanup(&state, conversation_id);
            return Err(err);
        }
    };

    let completion_id = state.next_completion_id();
    let created = unix_now_secs();
    tracing::info!(
        id = %completion_id,
        model = %request.model,
        conversation = %conversation_id,
        streaming,
        "relaying completion"
    );

    if streaming {
        let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(STREAM_CHANNEL_CAPACITY);
        let encoder = OpenAiChunkEncoder::new(&completion_id, &request.model, created);
        let task_state = Arc::clone(&state);
        tokio::spawn(async move {
            let probe = tx.clone();
            let liveness = move || !probe.is_closed();
            let mut sink = ChannelSink::new(tx, encoder);
            let outcome = translate(upstream.bytes_stream(), true, &mut sink, &liveness).await;
            drop(sink);
            drop(liveness);
            log_outcome(&completion_id, &outcome);
            schedule_conversation_cleanup(&task_state, conversation_id);
        });
        return Ok(sse_ok_response(Body::from_stream(receiver_stream(rx))));
    }

    let mut sink = AggregateSink::default();
    let outcome = translate(upstream.bytes_stream(), false, &mut sink, &AlwaysListening).await;
    log_outcome(&completion_id, &outcome);
    schedule_conversation_cleanup(&state, conversation_id);
    outcome?;

    let response =
        encode_openai_chat_response(&completion_id, &request.model, created, sink.into_content());
    let body = serde_json::to_vec(&response)
        .map_err(|err| CanonicalError::Internal(format!("failed to encode response: {err}")))?;
    Ok(ok_json_response(Bytes::from(body)))
}

fn receiver_stream(
    rx: mpsc::Receiver<Result<Bytes, Infallible>>,
) -> impl futures_util::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    futures_util::stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((item, rx))
    })
}

fn log_outcome(completion_id: &str, outcome: &Result<TranslateOutcome, CanonicalError>) {
    match outcome {
        Ok(TranslateOutcome::Completed) => {
            tracing::debug!(id = completion_id, "completion relayed");
        }
        Ok(TranslateOutcome::UpstreamReported(message)) => {
            tracing::warn!(id = completion_id, %message, "completion ended by upstream error");
        }
        Ok(TranslateOutcome::Cancelled) => {
            tracing::info!(id = completion_id, "client disconnected mid-stream");
        }
        Err(err) => {
            tracing::warn!(id = completion_id, error = %err, "upstream stream broke");
        }
    }
}

/// Delete the conversation in the background when the feature is enabled.
fn schedule_conversation_cleanup(state: &Arc<AppState>, conversation_id: String) {
    if !state.config.features.delete_conversation {
        return;
    }
    let state = Arc::clone(state);
    tokio::spawn(async move {
        if let Err(err) = state.session.delete_conversation(&conversation_id).await {
            tracing::warn!(conversation = %conversation_id, error = %err, "failed to delete conversation");
        }
    });
}
