//! Segment state machine turning upstream events into display fragments.
//!
//! Reasoning deltas are wrapped in `<think>` markers, tool payloads are either
//! suppressed (opaque tool invocations) or rendered as fenced code blocks, and
//! plain text passes through untouched. One [`StreamTranslator`] lives for
//! exactly one upstream stream.

use super::event::{BlockType, Delta, UpstreamEvent};
use super::tokens::{classify_fragment, normalize_language, ControlToken, DEFAULT_CODE_LANGUAGE};
use super::unescape::unescape_fragment;

pub const THINKING_OPEN: &str = "<think> ";
pub const THINKING_CLOSE: &str = "</think>\n";
pub const CODE_FENCE_CLOSE: &str = "\n```\n";

/// Coarse view of where the translator currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Idle,
    Thinking,
    ToolUse,
    CodeBlock,
}

/// Result of feeding one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translated {
    Fragment(String),
    Nothing,
    /// The upstream reported a failure; the stream must end here.
    UpstreamError(String),
}

/// Per-stream translation state.
#[derive(Debug)]
pub struct StreamTranslator {
    thinking_open: bool,
    code_block_open: bool,
    in_tool_use: bool,
    tool_result_pending: bool,
    pending_language_tag: bool,
    code_language: String,
    accumulated: String,
}

impl Default for StreamTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTranslator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            thinking_open: false,
            code_block_open: false,
            in_tool_use: false,
            tool_result_pending: false,
            pending_language_tag: false,
            code_language: DEFAULT_CODE_LANGUAGE.to_string(),
            accumulated: String::new(),
        }
    }

    #[must_use]
    pub fn segment(&self) -> Segment {
        if self.thinking_open {
            Segment::Thinking
        } else if self.code_block_open {
            Segment::CodeBlock
        } else if self.in_tool_use {
            Segment::ToolUse
        } else {
            Segment::Idle
        }
    }

    #[cfg(test)]
    fn code_language(&self) -> &str {
        &self.code_language
    }

    pub fn process(&mut self, event: UpstreamEvent) -> Translated {
        match event {
            UpstreamEvent::Error(message) => Translated::UpstreamError(message),
            UpstreamEvent::BlockStart(BlockType::ToolUse) => {
                self.in_tool_use = true;
                Translated::Nothing
            }
            UpstreamEvent::BlockStart(BlockType::ToolResult) => {
                self.tool_result_pending = true;
                Translated::Nothing
            }
            UpstreamEvent::BlockStart(_) | UpstreamEvent::Other => Translated::Nothing,
            UpstreamEvent::BlockStop => self.close_segment(),
            UpstreamEvent::Delta(Delta::Text(text)) => Translated::Fragment(text),
            UpstreamEvent::Delta(Delta::Thinking(thinking)) => self.thinking(&thinking),
            UpstreamEvent::Delta(Delta::InputJson(fragment)) => self.input_json(&fragment),
        }
    }

    /// Close whatever segment is still open when the stream ends cleanly.
    pub fn finish(&mut self) -> Option<String> {
        match self.close_segment() {
            Translated::Fragment(text) => Some(text),
            _ => None,
        }
    }

    pub fn accumulate(&mut self, fragment: &str) {
        self.accumulated.push_str(fragment);
    }

    #[must_use]
    pub fn take_accumulated(&mut self) -> String {
        std::mem::take(&mut self.accumulated)
    }

    fn close_segment(&mut self) -> Translated {
        if self.thinking_open {
            self.thinking_open = false;
            Translated::Fragment(THINKING_CLOSE.to_string())
        } else if self.code_block_open {
            self.code_block_open = false;
            Translated::Fragment(CODE_FENCE_CLOSE.to_string())
        } else {
            Translated::Nothing
        }
    }

    fn thinking(&mut self, thinking: &str) -> Translated {
        if self.thinking_open {
            return Translated::Fragment(thinking.to_string());
        }
        let mut out =
            String::with_capacity(CODE_FENCE_CLOSE.len() + THINKING_OPEN.len() + thinking.len());
        if self.code_block_open {
            self.code_block_open = false;
            out.push_str(CODE_FENCE_CLOSE);
        }
        self.thinking_open = true;
        out.push_str(THINKING_OPEN);
        out.push_str(thinking);
        Translated::Fragment(out)
    }

    fn input_json(&mut self, fragment: &str) -> Translated {
        match (self.in_tool_use, classify_fragment(fragment)) {
            (true, Some(ControlToken::ContentField)) => {
                self.in_tool_use = false;
                return self.close_code_block();
            }
            (_, Some(token)) if token.announces_language() => {
                self.pending_language_tag = true;
                return Translated::Nothing;
            }
            (_, Some(_)) => return Translated::Nothing,
            (_, None) => {}
        }

        if self.pending_language_tag {
            self.pending_language_tag = false;
            match normalize_language(fragment) {
                Some(language) => {
                    tracing::debug!(%language, "code language announced");
                    self.code_language = language;
                }
                None => tracing::debug!(
                    language = %self.code_language,
                    "blank code language, keeping current"
                ),
            }
            return Translated::Nothing;
        }
        if self.in_tool_use {
            tracing::trace!(fragment, "suppressing tool input");
            return Translated::Nothing;
        }
        if self.tool_result_pending {
            self.tool_result_pending = false;
            return Translated::Nothing;
        }

        let body = unescape_fragment(fragment);
        if self.code_block_open {
            return Translated::Fragment(body);
        }

        let mut out = String::with_capacity(16 + self.code_language.len() + body.len());
        if self.thinking_open {
            self.thinking_open = false;
            out.push_str(THINKING_CLOSE);
        }
        self.code_block_open = true;
        out.push_str("\n```");
        out.push_str(&self.code_language);
        out.push('\n');
        out.push_str(&body);
        Translated::Fragment(out)
    }

    fn close_code_block(&mut self) -> Translated {
        if self.code_block_open {
            self.code_block_open = false;
            Translated::Fragment(CODE_FENCE_CLOSE.to_string())
        } else {
            Translated::Nothing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(fragment: &str) -> UpstreamEvent {
        UpstreamEvent::Delta(Delta::InputJson(fragment.to_string()))
    }

    fn frag(text: &str) -> Translated {
        Translated::Fragment(text.to_string())
    }

    #[test]
    fn text_passes_through() {
        let mut t = StreamTranslator::new();
        assert_eq!(
            t.process(UpstreamEvent::Delta(Delta::Text("Hello".into()))),
            frag("Hello")
        );
        assert_eq!(t.segment(), Segment::Idle);
        assert_eq!(t.process(UpstreamEvent::BlockStop), Translated::Nothing);
    }

    #[test]
    fn thinking_is_wrapped_once() {
        let mut t = StreamTranslator::new();
        t.process(UpstreamEvent::BlockStart(BlockType::Thinking));
        assert_eq!(
            t.process(UpstreamEvent::Delta(Delta::Thinking("let me".into()))),
            frag("<think> let me")
        );
        assert_eq!(
            t.process(UpstreamEvent::Delta(Delta::Thinking(" see".into()))),
            frag(" see")
        );
        assert_eq!(t.segment(), Segment::Thinking);
        assert_eq!(t.process(UpstreamEvent::BlockStop), frag("</think>\n"));
        assert_eq!(t.process(UpstreamEvent::BlockStop), Translated::Nothing);
    }

    #[test]
    fn tool_use_is_suppressed_until_content_token() {
        let mut t = StreamTranslator::new();
        t.process(UpstreamEvent::BlockStart(BlockType::ToolUse));
        assert_eq!(t.segment(), Segment::ToolUse);
        assert_eq!(t.process(json("{\"id\": \"abc\"")), Translated::Nothing);
        assert_eq!(t.process(json(",\"title\":\"x\"")), Translated::Nothing);
        assert_eq!(t.process(json(",\"content\":")), Translated::Nothing);
        assert_eq!(t.segment(), Segment::Idle);
        assert_eq!(t.process(json("\"print(1)")), frag("\n```md\nprint(1)"));
        assert_eq!(t.process(json("\\nprint(2)")), frag("\nprint(2)"));
        assert_eq!(t.process(json("\"}")), frag(""));
        assert_eq!(t.process(UpstreamEvent::BlockStop), frag("\n```\n"));
    }

    #[test]
    fn language_lookahead_tags_the_fence() {
        let mut t = StreamTranslator::new();
        t.process(UpstreamEvent::BlockStart(BlockType::ToolUse));
        assert_eq!(t.process(json(",\"language\":")), Translated::Nothing);
        assert_eq!(t.process(json("\"python")), Translated::Nothing);
        assert_eq!(t.code_language(), "python");
        t.process(json(",\"content\":"));
        assert_eq!(t.process(json("\"x = 1")), frag("\n```python\nx = 1"));
    }

    #[test]
    fn type_token_maps_html_alias() {
        let mut t = StreamTranslator::new();
        t.process(UpstreamEvent::BlockStart(BlockType::ToolUse));
        t.process(json(",\"type\":"));
        t.process(json("\"text/html"));
        assert_eq!(t.code_language(), "html");
    }

    #[test]
    fn blank_language_keeps_current_fence_tag() {
        let mut t = StreamTranslator::new();
        t.process(UpstreamEvent::BlockStart(BlockType::ToolUse));
        t.process(json(",\"language\":"));
        assert_eq!(t.process(json("")), Translated::Nothing);
        assert_eq!(t.code_language(), "md");
        t.process(json(",\"language\":"));
        t.process(json("\"rust"));
        t.process(json(",\"language\":"));
        assert_eq!(t.process(json("\"")), Translated::Nothing);
        assert_eq!(t.code_language(), "rust");
        t.process(json(",\"content\":"));
        assert_eq!(t.process(json("\"let x = 1;")), frag("\n```rust\nlet x = 1;"));
    }

    #[test]
    fn language_persists_across_code_blocks() {
        let mut t = StreamTranslator::new();
        t.process(UpstreamEvent::BlockStart(BlockType::ToolUse));
        t.process(json(",\"language\":"));
        t.process(json("\"rust"));
        t.process(json(",\"content\":"));
        t.process(json("fn main() {}"));
        t.process(UpstreamEvent::BlockStop);

        t.process(UpstreamEvent::BlockStart(BlockType::ToolUse));
        t.process(json(",\"content\":"));
        assert_eq!(t.process(json("let x = 1;")), frag("\n```rust\nlet x = 1;"));
    }

    #[test]
    fn tool_result_skips_next_payload_fragment_once() {
        let mut t = StreamTranslator::new();
        t.process(UpstreamEvent::BlockStart(BlockType::ToolResult));
        assert_eq!(t.process(json("[{\"type\":\"text\"")), Translated::Nothing);
        assert_eq!(t.process(json("body")), frag("\n```md\nbody"));
    }

    #[test]
    fn code_without_block_start_still_balances() {
        let mut t = StreamTranslator::new();
        assert_eq!(t.process(json("orphan")), frag("\n```md\norphan"));
        assert_eq!(t.finish(), Some("\n```\n".to_string()));
        assert_eq!(t.finish(), None);
    }

    #[test]
    fn segments_never_overlap() {
        let mut t = StreamTranslator::new();
        t.process(UpstreamEvent::Delta(Delta::Thinking("a".into())));
        assert_eq!(t.process(json("code")), frag("</think>\n\n```md\ncode"));
        assert_eq!(t.segment(), Segment::CodeBlock);
        assert_eq!(
            t.process(UpstreamEvent::Delta(Delta::Thinking("b".into()))),
            frag("\n```\n<think> b")
        );
        assert_eq!(t.segment(), Segment::Thinking);
    }

    #[test]
    fn error_event_is_surfaced() {
        let mut t = StreamTranslator::new();
        assert_eq!(
            t.process(UpstreamEvent::Error("rate limited".into())),
            Translated::UpstreamError("rate limited".into())
        );
    }

    #[test]
    fn accumulate_and_take() {
        let mut t = StreamTranslator::new();
        t.accumulate("a");
        t.accumulate("b");
        assert_eq!(t.take_accumulated(), "ab");
        assert_eq!(t.take_accumulated(), "");
    }
}
