use criterion::{black_box, criterion_group, criterion_main, Criterion};

use claude2api_rs::protocol::openai_chat::stream::OpenAiChunkEncoder;
use bytes::Bytes;
use claude2api_rs::stream::{
    line_stream, parse_event_line, unescape_fragment, StreamTranslator, Translated,
};
use futures_util::StreamExt;

fn delta_line(kind: &str, field: &str, value: &str) -> String {
    let delta = serde_json::json!({
        "type": "content_block_delta",
        "index": 0,
        "delta": { "type": kind, field: value }
    });
    format!("event: content_block_delta\ndata: {delta}\n\n")
}

fn build_mixed_stream(rounds: usize) -> Vec<u8> {
    let mut body = String::new();
    for i in 0..rounds {
        body.push_str(&delta_line("thinking_delta", "thinking", "weighing the options "));
        body.push_str("data: {\"type\":\"content_block_stop\",\"index\":0}\n\n");
        body.push_str(&delta_line("text_delta", "text", "Here is the answer, "));
        body.push_str(
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\"}}\n\n",
        );
        body.push_str(&delta_line("input_json_delta", "partial_json", ",\"language\":"));
        body.push_str(&delta_line("input_json_delta", "partial_json", "\"rust"));
        body.push_str(&delta_line("input_json_delta", "partial_json", ",\"content\":"));
        body.push_str(&delta_line(
            "input_json_delta",
            "partial_json",
            &format!("\"fn f{i}() -> u32 {{\\n    {i}\\n}}"),
        ));
        body.push_str(&delta_line("input_json_delta", "partial_json", "\"}"));
        body.push_str("data: {\"type\":\"content_block_stop\",\"index\":1}\n\n");
    }
    body.into_bytes()
}

async fn translate_bytes(bytes: &[u8], chunk: usize) -> usize {
    let pieces: Vec<Result<Bytes, std::convert::Infallible>> = bytes
        .chunks(chunk)
        .map(|piece| Ok(Bytes::copy_from_slice(piece)))
        .collect();
    let mut lines = Box::pin(line_stream(futures_util::stream::iter(pieces)));
    let mut translator = StreamTranslator::new();
    let mut emitted = 0;
    while let Some(Ok(line)) = lines.next().await {
        let Some(event) = parse_event_line(&line) else {
            continue;
        };
        if let Translated::Fragment(fragment) = translator.process(event) {
            emitted += fragment.len();
        }
    }
    emitted
}

fn bench_translate(c: &mut Criterion) {
    let small = build_mixed_stream(4);
    let large = build_mixed_stream(400);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("bench runtime");

    c.bench_function("translate_mixed_small", |b| {
        b.iter(|| black_box(runtime.block_on(translate_bytes(black_box(&small), 512))));
    });
    c.bench_function("translate_mixed_large_tiny_chunks", |b| {
        b.iter(|| black_box(runtime.block_on(translate_bytes(black_box(&large), 61))));
    });
}

fn bench_unescape(c: &mut Criterion) {
    c.bench_function("unescape_strict", |b| {
        b.iter(|| black_box(unescape_fragment(black_box("\"line one\\n\\tline \\u00e9two"))));
    });
    c.bench_function("unescape_fallback", |b| {
        b.iter(|| black_box(unescape_fragment(black_box("caf\\u00e9 \\u00e8 split \\"))));
    });
}

fn bench_chunk_encode(c: &mut Criterion) {
    let encoder = OpenAiChunkEncoder::new("chatcmpl-0000000000000001", "claude-opus-4-20250514", 1_700_000_000);
    c.bench_function("encode_content_frame", |b| {
        b.iter(|| black_box(encoder.content_frame(black_box("\n```rust\nfn main() {}\n"))));
    });
}

criterion_group!(benches, bench_translate, bench_unescape, bench_chunk_encode);
criterion_main!(benches);
