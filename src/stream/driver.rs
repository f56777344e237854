use std::future::Future;

use futures_util::{Stream, StreamExt};

use super::event::parse_event_line;
use super::sse::line_stream;
use super::translator::{StreamTranslator, Translated};
use crate::error::CanonicalError;

/// Receiver of translated fragments.
///
/// Emitting is infallible from the translator's point of view; a sink whose
/// client went away reports that through [`ClientLiveness`] instead.
pub trait FragmentSink: Send {
    /// Deliver one fragment (streaming) or the whole reply (non-streaming).
    fn emit(&mut self, fragment: &str, streaming: bool) -> impl Future<Output = ()> + Send;

    /// Write the protocol terminal marker after a clean streaming completion.
    fn finish(&mut self) -> impl Future<Output = ()> + Send;
}

/// Read-only probe telling whether the downstream caller still listens.
pub trait ClientLiveness {
    fn is_listening(&self) -> bool;
}

impl<F> ClientLiveness for F
where
    F: Fn() -> bool,
{
    fn is_listening(&self) -> bool {
        self()
    }
}

/// Liveness probe for callers that cannot disconnect mid-translation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysListening;

impl ClientLiveness for AlwaysListening {
    fn is_listening(&self) -> bool {
        true
    }
}

/// How a translation ended when it did not fail on I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateOutcome {
    /// Input ended cleanly; the terminal marker (streaming) or the aggregate
    /// (non-streaming) was delivered.
    Completed,
    /// The upstream sent an `error` event; its message was the only output.
    UpstreamReported(String),
    /// The caller disconnected; nothing further was written.
    Cancelled,
}

/// Translate an upstream byte stream into sink fragments.
///
/// The byte stream is owned by this call and dropped on every exit path,
/// which releases the underlying connection.
///
/// # Errors
///
/// Returns [`CanonicalError::Transport`] when reading the upstream fails.
/// Fragments emitted before the failure stay emitted; no terminal marker
/// follows.
pub async fn translate<S, E, K, C>(
    byte_stream: S,
    streaming: bool,
    sink: &mut K,
    liveness: &C,
) -> Result<TranslateOutcome, CanonicalError>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    K: FragmentSink,
    C: ClientLiveness,
{
    translate_lines(line_stream(byte_stream), streaming, sink, liveness).await
}

/// Translate an already line-split upstream stream.
///
/// # Errors
///
/// Propagates the first `Err` yielded by `lines`.
pub async fn translate_lines<L, K, C>(
    lines: L,
    streaming: bool,
    sink: &mut K,
    liveness: &C,
) -> Result<TranslateOutcome, CanonicalError>
where
    L: Stream<Item = Result<String, CanonicalError>>,
    K: FragmentSink,
    C: ClientLiveness,
{
    let mut lines = Box::pin(lines);
    let mut translator = StreamTranslator::new();

    while let Some(line) = lines.next().await {
        let line = line?;
        if !liveness.is_listening() {
            tracing::info!(
                segment = ?translator.segment(),
                "client closed connection, abandoning upstream stream"
            );
            return Ok(TranslateOutcome::Cancelled);
        }
        let Some(event) = parse_event_line(&line) else {
            continue;
        };
        match translator.process(event) {
            Translated::Fragment(fragment) => {
                deliver(&mut translator, sink, fragment, streaming).await;
            }
            Translated::Nothing => {}
            Translated::UpstreamError(message) => {
                tracing::warn!(%message, "upstream reported an error mid-stream");
                sink.emit(&message, streaming).await;
                return Ok(TranslateOutcome::UpstreamReported(message));
            }
        }
    }
    drop(lines);

    if let Some(fragment) = translator.finish() {
        deliver(&mut translator, sink, fragment, streaming).await;
    }
    if streaming {
        sink.finish().await;
    } else {
        let reply = translator.take_accumulated();
        sink.emit(&reply, false).await;
    }
    Ok(TranslateOutcome::Completed)
}

async fn deliver<K: FragmentSink>(
    translator: &mut StreamTranslator,
    sink: &mut K,
    fragment: String,
    streaming: bool,
) {
    if streaming {
        sink.emit(&fragment, true).await;
    } else {
        translator.accumulate(&fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        emitted: Vec<(String, bool)>,
        finished: usize,
    }

    impl FragmentSink for Recorder {
        async fn emit(&mut self, fragment: &str, streaming: bool) {
            self.emitted.push((fragment.to_string(), streaming));
        }

        async fn finish(&mut self) {
            self.finished += 1;
        }
    }

    fn lines(raw: &[&str]) -> impl Stream<Item = Result<String, CanonicalError>> {
        let owned: Vec<Result<String, CanonicalError>> =
            raw.iter().map(|line| Ok((*line).to_string())).collect();
        futures_util::stream::iter(owned)
    }

    #[tokio::test]
    async fn streaming_emits_fragments_then_marker() {
        let mut sink = Recorder::default();
        let outcome = translate_lines(
            lines(&[
                "event: content_block_delta",
                r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"Hi"}}"#,
                "",
                r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"!"}}"#,
            ]),
            true,
            &mut sink,
            &AlwaysListening,
        )
        .await
        .unwrap();
        assert_eq!(outcome, TranslateOutcome::Completed);
        assert_eq!(
            sink.emitted,
            vec![("Hi".to_string(), true), ("!".to_string(), true)]
        );
        assert_eq!(sink.finished, 1);
    }

    #[tokio::test]
    async fn non_streaming_emits_once() {
        let mut sink = Recorder::default();
        translate_lines(
            lines(&[
                r#"data: {"type":"content_block_delta","delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
                r#"data: {"type":"content_block_stop"}"#,
                r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"ok"}}"#,
            ]),
            false,
            &mut sink,
            &AlwaysListening,
        )
        .await
        .unwrap();
        assert_eq!(
            sink.emitted,
            vec![("<think> hmm</think>\nok".to_string(), false)]
        );
        assert_eq!(sink.finished, 0);
    }

    #[tokio::test]
    async fn read_error_is_distinct_from_clean_end() {
        let mut sink = Recorder::default();
        let items = vec![
            Ok(r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"a"}}"#.to_string()),
            Err(CanonicalError::Transport("reset".into())),
        ];
        let result = translate_lines(
            futures_util::stream::iter(items),
            true,
            &mut sink,
            &AlwaysListening,
        )
        .await;
        assert!(matches!(result, Err(CanonicalError::Transport(_))));
        assert_eq!(sink.emitted, vec![("a".to_string(), true)]);
        assert_eq!(sink.finished, 0);
    }
}
