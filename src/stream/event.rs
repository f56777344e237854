use serde::Deserialize;

/// Prefix carried by every line that holds an event payload.
pub const DATA_PREFIX: &str = "data: ";

/// Content block kinds announced by `content_block_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Text,
    Thinking,
    ToolUse,
    ToolResult,
    Other,
}

impl BlockType {
    fn from_wire(kind: &str) -> Self {
        match kind {
            "text" => BlockType::Text,
            "thinking" => BlockType::Thinking,
            "tool_use" => BlockType::ToolUse,
            "tool_result" => BlockType::ToolResult,
            _ => BlockType::Other,
        }
    }
}

/// Incremental payload of a delta event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Text(String),
    Thinking(String),
    InputJson(String),
}

/// One decoded line of the upstream stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    BlockStart(BlockType),
    BlockStop,
    Delta(Delta),
    Error(String),
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct WireEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content_block: Option<WireTyped>,
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Default, Deserialize)]
struct WireTyped {
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    thinking: String,
    #[serde(default)]
    partial_json: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

impl From<WireEvent> for UpstreamEvent {
    fn from(wire: WireEvent) -> Self {
        if wire.kind == "error" {
            if let Some(error) = wire.error.filter(|e| !e.message.is_empty()) {
                return UpstreamEvent::Error(error.message);
            }
        }
        if let Some(block) = wire.content_block {
            return UpstreamEvent::BlockStart(BlockType::from_wire(&block.kind));
        }
        if wire.kind == "content_block_stop" {
            return UpstreamEvent::BlockStop;
        }
        let Some(delta) = wire.delta else {
            return UpstreamEvent::Other;
        };
        match delta.kind.as_str() {
            "text_delta" if !delta.text.is_empty() => {
                UpstreamEvent::Delta(Delta::Text(delta.text))
            }
            "thinking_delta" => UpstreamEvent::Delta(Delta::Thinking(delta.thinking)),
            "input_json_delta" => UpstreamEvent::Delta(Delta::InputJson(delta.partial_json)),
            _ => UpstreamEvent::Other,
        }
    }
}

/// Decode one raw line.
///
/// Returns `None` for lines without the `data: ` prefix (blank lines,
/// `event:` lines, comments, heartbeats) and for payloads that are not valid
/// event JSON. Neither case is an error for the stream.
#[must_use]
pub fn parse_event_line(line: &str) -> Option<UpstreamEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str::<WireEvent>(payload) {
        Ok(wire) => Some(wire.into()),
        Err(err) => {
            tracing::debug!(error = %err, "skipping undecodable upstream event line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_data_lines_are_ignored() {
        assert_eq!(parse_event_line(""), None);
        assert_eq!(parse_event_line("event: content_block_delta"), None);
        assert_eq!(parse_event_line(": ping"), None);
        assert_eq!(parse_event_line("data:{\"type\":\"ping\"}"), None);
    }

    #[test]
    fn malformed_payload_is_skipped() {
        assert_eq!(parse_event_line("data: {not json"), None);
        assert_eq!(parse_event_line("data: "), None);
    }

    #[test]
    fn block_start_types() {
        let event = parse_event_line(
            r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"t1","name":"artifacts","input":{}}}"#,
        );
        assert_eq!(event, Some(UpstreamEvent::BlockStart(BlockType::ToolUse)));

        let event = parse_event_line(
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
        );
        assert_eq!(event, Some(UpstreamEvent::BlockStart(BlockType::Thinking)));

        let event = parse_event_line(
            r#"data: {"type":"content_block_start","content_block":{"type":"image"}}"#,
        );
        assert_eq!(event, Some(UpstreamEvent::BlockStart(BlockType::Other)));
    }

    #[test]
    fn deltas() {
        assert_eq!(
            parse_event_line(
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#
            ),
            Some(UpstreamEvent::Delta(Delta::Text("Hi".into())))
        );
        assert_eq!(
            parse_event_line(
                r#"data: {"type":"content_block_delta","delta":{"type":"thinking_delta","thinking":"hmm"}}"#
            ),
            Some(UpstreamEvent::Delta(Delta::Thinking("hmm".into())))
        );
        assert_eq!(
            parse_event_line(
                r#"data: {"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":",\"content\":"}}"#
            ),
            Some(UpstreamEvent::Delta(Delta::InputJson(",\"content\":".into())))
        );
    }

    #[test]
    fn empty_text_delta_is_other() {
        assert_eq!(
            parse_event_line(r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":""}}"#),
            Some(UpstreamEvent::Other)
        );
    }

    #[test]
    fn error_event_requires_message() {
        assert_eq!(
            parse_event_line(r#"data: {"type":"error","error":{"type":"rate_limit_error","message":"rate limited"}}"#),
            Some(UpstreamEvent::Error("rate limited".into()))
        );
        assert_eq!(
            parse_event_line(r#"data: {"type":"error","error":{"message":""}}"#),
            Some(UpstreamEvent::Other)
        );
    }

    #[test]
    fn stop_and_other() {
        assert_eq!(
            parse_event_line(r#"data: {"type":"content_block_stop","index":0}"#),
            Some(UpstreamEvent::BlockStop)
        );
        assert_eq!(
            parse_event_line(r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#),
            Some(UpstreamEvent::Other)
        );
        assert_eq!(
            parse_event_line(r#"data: {"type":"message_stop"}"#),
            Some(UpstreamEvent::Other)
        );
    }
}
