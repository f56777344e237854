//! Translation of the upstream web-session event stream.
//!
//! Bytes flow through [`sse::line_stream`], each line is decoded by
//! [`event::parse_event_line`], the [`translator::StreamTranslator`] turns
//! events into display fragments, and [`driver::translate`] hands those to a
//! [`driver::FragmentSink`].

pub mod driver;
pub mod event;
pub mod sse;
pub mod tokens;
pub mod translator;
pub mod unescape;

pub use driver::{
    translate, translate_lines, AlwaysListening, ClientLiveness, FragmentSink, TranslateOutcome,
};
pub use event::{parse_event_line, BlockType, Delta, UpstreamEvent};
pub use sse::{done_frame, line_stream};
pub use translator::{Segment, StreamTranslator, Translated};
pub use unescape::unescape_fragment;
