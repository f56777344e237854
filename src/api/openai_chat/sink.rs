use std::convert::Infallible;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::protocol::openai_chat::stream::OpenAiChunkEncoder;
use crate::stream::{done_frame, FragmentSink};

pub(crate) type FrameSender = mpsc::Sender<Result<Bytes, Infallible>>;

/// Streams each fragment to the client as one `chat.completion.chunk` frame.
///
/// A failed send means the client went away; the translation notices through
/// its liveness probe on the next line, so the error is dropped here.
pub(crate) struct ChannelSink {
    tx: FrameSender,
    encoder: OpenAiChunkEncoder,
}

impl ChannelSink {
    pub(crate) fn new(tx: FrameSender, encoder: OpenAiChunkEncoder) -> Self {
        Self { tx, encoder }
    }
}

impl FragmentSink for ChannelSink {
    async fn emit(&mut self, fragment: &str, _streaming: bool) {
        let frame = self.encoder.content_frame(fragment);
        if self.tx.send(Ok(Bytes::from(frame))).await.is_err() {
            tracing::debug!("client receiver dropped, fragment discarded");
        }
    }

    async fn finish(&mut self) {
        let mut tail = self.encoder.stop_frame();
        tail.push_str(done_frame());
        if self.tx.send(Ok(Bytes::from(tail))).await.is_err() {
            tracing::debug!("client receiver dropped before completion marker");
        }
    }
}

/// Keeps the single aggregated reply of a non-streaming translation.
#[derive(Debug, Default)]
pub(crate) struct AggregateSink {
    content: Option<String>,
}

impl AggregateSink {
    pub(crate) fn into_content(self) -> String {
        self.content.unwrap_or_default()
    }
}

impl FragmentSink for AggregateSink {
    async fn emit(&mut self, fragment: &str, _streaming: bool) {
        self.content
            .get_or_insert_with(String::new)
            .push_str(fragment);
    }

    async fn finish(&mut self) {}
}
