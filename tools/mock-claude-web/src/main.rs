use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_002;
const ORG_ID: &str = "mock-org";
const CONVERSATION_ID: &str = "mock-conversation";

#[derive(Copy, Clone)]
enum MockScenario {
    Text,
    Thinking,
    Artifact,
    StreamError,
    RateLimit,
    Unauthorized,
}

impl MockScenario {
    fn name(self) -> &'static str {
        match self {
            MockScenario::Text => "text",
            MockScenario::Thinking => "thinking",
            MockScenario::Artifact => "artifact",
            MockScenario::StreamError => "stream_error",
            MockScenario::RateLimit => "rate_limit",
            MockScenario::Unauthorized => "unauthorized",
        }
    }
}

#[derive(Default)]
struct CallStats {
    organizations: AtomicU64,
    settings: AtomicU64,
    created: AtomicU64,
    completions: AtomicU64,
    deleted: AtomicU64,
    uploads: AtomicU64,
}

impl CallStats {
    fn reset(&self) {
        for counter in [
            &self.organizations,
            &self.settings,
            &self.created,
            &self.completions,
            &self.deleted,
            &self.uploads,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

struct MockState {
    scenario: MockScenario,
    stats: CallStats,
}

enum Endpoint {
    Organizations,
    Account,
    Upload,
    CreateConversation,
    Completion,
    DeleteConversation,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        stats: CallStats::default(),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    eprintln!(
        "mock claude web upstream on 127.0.0.1:{port} (scenario={})",
        state.scenario.name()
    );

    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("thinking") => MockScenario::Thinking,
        Ok("artifact") => MockScenario::Artifact,
        Ok("stream_error") => MockScenario::StreamError,
        Ok("rate_limit") => MockScenario::RateLimit,
        Ok("unauthorized") => MockScenario::Unauthorized,
        Ok("text") | Err(_) => MockScenario::Text,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

fn endpoint_for(method: &Method, path: &str) -> Option<Endpoint> {
    if *method == Method::GET && path == "/api/organizations" {
        return Some(Endpoint::Organizations);
    }
    if *method == Method::PUT && path == "/api/account" {
        return Some(Endpoint::Account);
    }
    if *method == Method::POST && path.starts_with("/api/") && path.ends_with("/upload") {
        return Some(Endpoint::Upload);
    }
    let rest = path.strip_prefix("/api/organizations/")?;
    let (_org, rest) = rest.split_once('/')?;
    let rest = rest.strip_prefix("chat_conversations")?;
    if *method == Method::POST && rest.is_empty() {
        Some(Endpoint::CreateConversation)
    } else if *method == Method::POST && rest.ends_with("/completion") {
        Some(Endpoint::Completion)
    } else if *method == Method::DELETE && rest.starts_with('/') {
        Some(Endpoint::DeleteConversation)
    } else {
        None
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;
    let path = parts.uri.path();

    if parts.method == Method::GET && path == "/_mock/stats" {
        return stats_response(state);
    }
    if parts.method == Method::POST && path == "/_mock/reset" {
        state.stats.reset();
        return json_static(StatusCode::OK, br#"{"ok":true}"#);
    }
    if matches!(state.scenario, MockScenario::Unauthorized) {
        return json_static(
            StatusCode::UNAUTHORIZED,
            br#"{"type":"error","error":{"type":"authentication_error","message":"Invalid authorization"}}"#,
        );
    }

    let Some(endpoint) = endpoint_for(&parts.method, path) else {
        return json_static(StatusCode::NOT_FOUND, br#"{"error":"not_found"}"#);
    };

    match endpoint {
        Endpoint::Organizations => {
            state.stats.organizations.fetch_add(1, Ordering::Relaxed);
            json_owned(
                StatusCode::OK,
                format!(
                    r#"[{{"uuid":"{ORG_ID}","name":"Mock","rate_limit_tier":"default_claude_ai"}}]"#
                ),
            )
        }
        Endpoint::Account => {
            state.stats.settings.fetch_add(1, Ordering::Relaxed);
            json_static(StatusCode::ACCEPTED, br#"{"ok":true}"#)
        }
        Endpoint::Upload => {
            state.stats.uploads.fetch_add(1, Ordering::Relaxed);
            json_static(StatusCode::OK, br#"{"file_uuid":"mock-file"}"#)
        }
        Endpoint::CreateConversation => {
            state.stats.created.fetch_add(1, Ordering::Relaxed);
            json_owned(
                StatusCode::CREATED,
                format!(r#"{{"uuid":"{CONVERSATION_ID}","name":""}}"#),
            )
        }
        Endpoint::Completion => {
            state.stats.completions.fetch_add(1, Ordering::Relaxed);
            completion_response(state.scenario)
        }
        Endpoint::DeleteConversation => {
            state.stats.deleted.fetch_add(1, Ordering::Relaxed);
            simple_response(StatusCode::NO_CONTENT, "application/json", Bytes::new())
        }
    }
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn completion_response(scenario: MockScenario) -> Response<Full<Bytes>> {
    let body = match scenario {
        MockScenario::Text | MockScenario::Unauthorized => STREAM_TEXT,
        MockScenario::Thinking => STREAM_THINKING,
        MockScenario::Artifact => STREAM_ARTIFACT,
        MockScenario::StreamError => STREAM_ERROR,
        MockScenario::RateLimit => {
            return json_static(
                StatusCode::TOO_MANY_REQUESTS,
                br#"{"type":"error","error":{"type":"rate_limit_error","message":"rate limited"}}"#,
            );
        }
    };
    let mut response = simple_response(StatusCode::OK, "text/event-stream", Bytes::from_static(body));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn stats_response(state: &MockState) -> Response<Full<Bytes>> {
    let stats = &state.stats;
    let body = format!(
        "{{\"scenario\":\"{}\",\"organizations\":{},\"settings\":{},\"created\":{},\"completions\":{},\"deleted\":{},\"uploads\":{}}}",
        state.scenario.name(),
        stats.organizations.load(Ordering::Relaxed),
        stats.settings.load(Ordering::Relaxed),
        stats.created.load(Ordering::Relaxed),
        stats.completions.load(Ordering::Relaxed),
        stats.deleted.load(Ordering::Relaxed),
        stats.uploads.load(Ordering::Relaxed),
    );
    json_owned(StatusCode::OK, body)
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_static(status: StatusCode, body: &'static [u8]) -> Response<Full<Bytes>> {
    simple_response(status, "application/json", Bytes::from_static(body))
}

fn json_owned(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    simple_response(status, "application/json", Bytes::from(body.into_bytes()))
}

const STREAM_TEXT: &[u8] = b"event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_mock\",\"type\":\"message\",\"role\":\"assistant\",\"content\":[]}}\n\nevent: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"o\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"k\"}}\n\nevent: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";
const STREAM_THINKING: &[u8] = b"event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"analysis\"}}\n\nevent: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\nevent: ping\ndata: {\"type\":\"ping\"}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\"ok\"}}\n\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";
const STREAM_ARTIFACT: &[u8] = b"event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_mock\",\"name\":\"artifacts\",\"input\":{}}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"id\\\": \\\"demo\\\"\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\",\\\"type\\\":\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"text/html\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\",\\\"content\\\":\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"<div>ok</div>\\\\n\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"}\"}}\n\nevent: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";
const STREAM_ERROR: &[u8] = b"event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"partial\"}}\n\nevent: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
