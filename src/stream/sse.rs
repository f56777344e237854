//! Line splitting for the upstream event stream and SSE frame encoding for
//! the downstream OpenAI-compatible stream.
//!
//! The upstream is consumed line by line: bytes arriving in arbitrary chunk
//! boundaries are buffered until a `\n` is found, a trailing `\r` is dropped,
//! and each complete line is yielded in order.

use bytes::BytesMut;
use futures_util::Stream;
use memchr::memchr;
use smallvec::SmallVec;

use crate::error::CanonicalError;

struct PendingLines {
    lines: SmallVec<[String; 8]>,
    head: usize,
}

impl PendingLines {
    #[inline]
    fn new() -> Self {
        Self {
            lines: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<String> {
        if self.head >= self.lines.len() {
            return None;
        }
        let line = std::mem::take(&mut self.lines[self.head]);
        self.head += 1;
        if self.head == self.lines.len() {
            self.lines.clear();
            self.head = 0;
        }
        Some(line)
    }

    #[inline]
    fn push(&mut self, line: String) {
        self.lines.push(line);
    }
}

// ---------------------------------------------------------------------------
// LineSplitter: incremental newline splitter
// ---------------------------------------------------------------------------

/// Incremental line splitter.
///
/// Splitting happens on raw bytes, so a multi-byte UTF-8 character cut across
/// two chunks is reassembled before the line is decoded.
#[derive(Default)]
struct LineSplitter {
    buffer: BytesMut,
}

impl LineSplitter {
    fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    #[cfg(test)]
    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        self.feed_with(chunk, |line| out.push(line));
        out
    }

    fn feed_with(&mut self, chunk: &[u8], mut push: impl FnMut(String)) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = memchr(b'\n', &self.buffer) {
            let raw = self.buffer.split_to(pos + 1);
            push(decode_line(&raw[..pos]));
        }
    }

    /// Take the unterminated tail left at end of input, if any.
    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = self.buffer.split();
        Some(decode_line(&raw))
    }
}

#[inline]
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

/// Split an upstream byte stream into lines.
///
/// A read error is yielded once as [`CanonicalError::Transport`] and ends the
/// stream; a clean end of input yields the unterminated tail (if any) and
/// then `None`.
pub fn line_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, CanonicalError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Some(Box::pin(byte_stream)),
            LineSplitter::new(),
            PendingLines::new(),
        ),
        |(mut source, mut splitter, mut pending)| async move {
            loop {
                if let Some(line) = pending.pop_front() {
                    return Some((Ok(line), (source, splitter, pending)));
                }
                let stream = source.as_mut()?;
                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => splitter.feed_with(&bytes, |line| pending.push(line)),
                    Some(Err(err)) => {
                        let error =
                            CanonicalError::Transport(format!("Error reading upstream stream: {err}"));
                        return Some((Err(error), (None, splitter, pending)));
                    }
                    None => {
                        let tail = splitter.finish();
                        return tail.map(|line| (Ok(line), (None, splitter, pending)));
                    }
                }
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Format a `[DONE]` frame as SSE text.
#[must_use]
pub fn done_frame() -> &'static str {
    DONE_FRAME
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
