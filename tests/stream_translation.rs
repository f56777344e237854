use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use claude2api_rs::error::CanonicalError;
use claude2api_rs::stream::{translate, AlwaysListening, FragmentSink, TranslateOutcome};
use futures_util::Stream;
use serde_json::json;

#[derive(Default)]
struct Recorder {
    emitted: Vec<(String, bool)>,
    finished: usize,
    emit_count: Arc<AtomicUsize>,
}

impl FragmentSink for Recorder {
    async fn emit(&mut self, fragment: &str, streaming: bool) {
        self.emitted.push((fragment.to_string(), streaming));
        self.emit_count.fetch_add(1, Ordering::SeqCst);
    }

    async fn finish(&mut self) {
        self.finished += 1;
    }
}

impl Recorder {
    fn joined(&self) -> String {
        self.emitted.iter().map(|(text, _)| text.as_str()).collect()
    }
}

fn data_line(event: &serde_json::Value) -> String {
    format!("event: {}\r\ndata: {event}\r\n\r\n", event["type"].as_str().unwrap_or("x"))
}

fn text(value: &str) -> String {
    data_line(&json!({
        "type": "content_block_delta",
        "index": 0,
        "delta": {"type": "text_delta", "text": value}
    }))
}

fn thinking(value: &str) -> String {
    data_line(&json!({
        "type": "content_block_delta",
        "index": 0,
        "delta": {"type": "thinking_delta", "thinking": value}
    }))
}

fn partial_json(value: &str) -> String {
    data_line(&json!({
        "type": "content_block_delta",
        "index": 1,
        "delta": {"type": "input_json_delta", "partial_json": value}
    }))
}

fn block_start(kind: &str) -> String {
    data_line(&json!({
        "type": "content_block_start",
        "index": 1,
        "content_block": {"type": kind}
    }))
}

fn block_stop() -> String {
    data_line(&json!({"type": "content_block_stop", "index": 0}))
}

fn error_event(message: &str) -> String {
    data_line(&json!({
        "type": "error",
        "error": {"type": "rate_limit_error", "message": message}
    }))
}

/// Cut the body into fixed-size byte chunks, ignoring char boundaries.
fn chunked(body: &str, size: usize) -> Vec<Result<Bytes, Infallible>> {
    body.as_bytes()
        .chunks(size)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect()
}

fn upstream(body: &str, size: usize) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    futures_util::stream::iter(chunked(body, size))
}

async fn run(body: &str, streaming: bool) -> (Recorder, TranslateOutcome) {
    let mut sink = Recorder::default();
    let outcome = translate(upstream(body, 7), streaming, &mut sink, &AlwaysListening)
        .await
        .expect("translate");
    (sink, outcome)
}

#[tokio::test]
async fn test_text_only_streaming_matches_buffered() {
    let body = [
        text("Hello"),
        text(", w\u{f6}rld"),
        ": ping\n".to_string(),
        text(" \u{1f980} and "),
        text("\"quotes\"\n"),
        data_line(&json!({"type": "message_stop"})),
    ]
    .concat();

    let (streamed, outcome) = run(&body, true).await;
    assert_eq!(outcome, TranslateOutcome::Completed);
    assert_eq!(streamed.finished, 1);
    assert!(streamed.emitted.iter().all(|(_, streaming)| *streaming));

    let (buffered, outcome) = run(&body, false).await;
    assert_eq!(outcome, TranslateOutcome::Completed);
    assert_eq!(buffered.finished, 0);
    assert_eq!(buffered.emitted.len(), 1);
    assert!(!buffered.emitted[0].1);

    assert_eq!(streamed.joined(), buffered.emitted[0].0);
    assert_eq!(buffered.emitted[0].0, "Hello, w\u{f6}rld \u{1f980} and \"quotes\"\n");
}

#[tokio::test]
async fn test_reasoning_markers_are_balanced() {
    let body = [
        block_start("thinking"),
        thinking("first"),
        thinking(" thought"),
        block_stop(),
        block_start("text"),
        text("answer"),
        block_stop(),
        block_start("thinking"),
        thinking("again"),
        block_stop(),
        text("done"),
    ]
    .concat();

    let (sink, _) = run(&body, false).await;
    let reply = &sink.emitted[0].0;
    assert_eq!(
        reply,
        "<think> first thought</think>\nanswer<think> again</think>\ndone"
    );

    let mut depth = 0_i32;
    let mut rest = reply.as_str();
    while let Some(pos) = rest.find('<') {
        rest = &rest[pos..];
        if rest.starts_with("<think> ") {
            depth += 1;
        } else if rest.starts_with("</think>\n") {
            depth -= 1;
        }
        assert!((0..=1).contains(&depth), "markers nested or unbalanced");
        rest = &rest[1..];
    }
    assert_eq!(depth, 0);
}

#[tokio::test]
async fn test_reasoning_left_open_is_closed_at_end() {
    let body = [thinking("unfinished")].concat();
    let (sink, outcome) = run(&body, true).await;
    assert_eq!(outcome, TranslateOutcome::Completed);
    assert_eq!(sink.joined(), "<think> unfinished</think>\n");
}

#[tokio::test]
async fn test_tool_use_payload_is_suppressed() {
    let body = [
        text("Searching."),
        block_start("tool_use"),
        partial_json("{\"query\": \"rust"),
        partial_json(" async\"}"),
        block_stop(),
        text(" Found it."),
    ]
    .concat();

    let (sink, _) = run(&body, true).await;
    assert_eq!(sink.joined(), "Searching. Found it.");
    assert!(!sink.joined().contains("query"));
}

#[tokio::test]
async fn test_language_tag_opens_tagged_fence() {
    let body = [
        block_start("tool_use"),
        partial_json("{\"id\": \"calc\""),
        partial_json(",\"language\":"),
        partial_json("\"python"),
        partial_json(",\"content\":"),
        partial_json("\"print(1)"),
        partial_json("\\nprint(2)"),
        partial_json("\"}"),
        block_stop(),
    ]
    .concat();

    let (sink, _) = run(&body, true).await;
    assert_eq!(sink.joined(), "\n```python\nprint(1)\nprint(2)\n```\n");
    assert!(sink.emitted[0].0.starts_with("\n```python\n"));
}

#[tokio::test]
async fn test_brace_fragment_is_empty_output() {
    let body = [
        block_start("tool_result"),
        partial_json("[{\"type\":\"text\""),
        partial_json("\"result body"),
        partial_json("\"}"),
        block_stop(),
    ]
    .concat();

    let (sink, outcome) = run(&body, true).await;
    assert_eq!(outcome, TranslateOutcome::Completed);
    let fragments: Vec<&str> = sink.emitted.iter().map(|(text, _)| text.as_str()).collect();
    assert_eq!(fragments, vec!["\n```md\nresult body", "", "\n```\n"]);
}

#[tokio::test]
async fn test_newline_escape_split_across_fragments_stays_literal() {
    // the `\n` escape is cut between the two body fragments; each fragment is
    // decoded on its own, so the backslash and the `n` come out verbatim while
    // the complete `\u00e9` escapes still decode
    let body = [
        block_start("tool_use"),
        partial_json(",\"content\":"),
        partial_json("\"caf\\u00e9 \\"),
        partial_json("n\\u00e9t\\u00e9\\"),
        block_stop(),
    ]
    .concat();

    let (sink, _) = run(&body, false).await;
    assert_eq!(
        sink.emitted[0].0,
        "\n```md\ncaf\u{e9} \\n\u{e9}t\u{e9}\\\n```\n"
    );
}

#[tokio::test]
async fn test_unicode_escape_split_across_fragments_stays_literal() {
    let body = [
        block_start("tool_use"),
        partial_json(",\"content\":"),
        partial_json("\"caf\\u00"),
        partial_json("e9"),
        block_stop(),
    ]
    .concat();

    let (sink, _) = run(&body, true).await;
    let fragments: Vec<&str> = sink.emitted.iter().map(|(text, _)| text.as_str()).collect();
    assert_eq!(fragments, vec!["\n```md\ncaf\\u00", "e9", "\n```\n"]);
    assert_eq!(sink.joined(), "\n```md\ncaf\\u00e9\n```\n");
}

struct DropFlagged<S> {
    inner: S,
    dropped: Arc<AtomicBool>,
}

impl<S> Drop for DropFlagged<S> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl<S: Stream + Unpin> Stream for DropFlagged<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[tokio::test]
async fn test_disconnect_stops_writes_and_releases_upstream() {
    const LISTENED_FRAGMENTS: usize = 3;

    let body = (0..10).map(|i| text(&format!("part{i} "))).collect::<String>();
    let dropped = Arc::new(AtomicBool::new(false));
    let stream = DropFlagged {
        inner: upstream(&body, 11),
        dropped: Arc::clone(&dropped),
    };

    let emit_count = Arc::new(AtomicUsize::new(0));
    let mut sink = Recorder {
        emit_count: Arc::clone(&emit_count),
        ..Recorder::default()
    };
    let probe = Arc::clone(&emit_count);
    let liveness = move || probe.load(Ordering::SeqCst) < LISTENED_FRAGMENTS;

    let outcome = translate(stream, true, &mut sink, &liveness)
        .await
        .expect("translate");

    assert_eq!(outcome, TranslateOutcome::Cancelled);
    assert_eq!(sink.emitted.len(), LISTENED_FRAGMENTS);
    assert_eq!(sink.finished, 0);
    assert_eq!(sink.joined(), "part0 part1 part2 ");
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_rate_limit_error_is_only_output() {
    let body = [error_event("rate limited"), text("never shown")].concat();

    for streaming in [true, false] {
        let (sink, outcome) = run(&body, streaming).await;
        assert_eq!(
            outcome,
            TranslateOutcome::UpstreamReported("rate limited".to_string())
        );
        assert_eq!(sink.emitted, vec![("rate limited".to_string(), streaming)]);
        assert_eq!(sink.finished, 0);
    }
}

#[tokio::test]
async fn test_read_failure_is_distinct_from_clean_end() {
    let items: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(text("partial"))),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        Ok(Bytes::from(text("unreachable"))),
    ];
    let mut sink = Recorder::default();
    let result = translate(futures_util::stream::iter(items), true, &mut sink, &AlwaysListening).await;

    assert!(matches!(result, Err(CanonicalError::Transport(_))));
    assert_eq!(sink.joined(), "partial");
    assert_eq!(sink.finished, 0);
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let body = [
        "data: {broken\n".to_string(),
        text("kept"),
        "data: [DONE]\n".to_string(),
        "retry: 100\n".to_string(),
    ]
    .concat();

    let (sink, outcome) = run(&body, false).await;
    assert_eq!(outcome, TranslateOutcome::Completed);
    assert_eq!(sink.emitted, vec![("kept".to_string(), false)]);
}
