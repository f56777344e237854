use crate::util::{push_json_string_escaped, push_u64_decimal};

/// Per-response chunk encoder.
///
/// `id`, `model` and `created` are fixed for the whole stream, so the common
/// JSON prefix is rendered once and reused for every fragment.
#[derive(Debug, Clone)]
pub struct OpenAiChunkEncoder {
    prefix: String,
}

impl OpenAiChunkEncoder {
    #[must_use]
    pub fn new(id: &str, model: &str, created: u64) -> Self {
        let mut prefix = String::with_capacity(96 + id.len() + model.len());
        push_openai_chunk_prefix(&mut prefix, id, model, created);
        Self { prefix }
    }

    /// Encode one content fragment as a complete `data:` frame.
    #[must_use]
    pub fn content_frame(&self, content: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + 64 + content.len());
        out.push_str(&self.prefix);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"content\":");
        push_json_string_escaped(&mut out, content);
        out.push_str("},\"finish_reason\":null}]}\n\n");
        out
    }

    /// Encode the closing chunk carrying `finish_reason: "stop"`.
    #[must_use]
    pub fn stop_frame(&self) -> String {
        let mut out = String::with_capacity(self.prefix.len() + 64);
        out.push_str(&self.prefix);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
        out
    }
}

fn push_openai_chunk_prefix(out: &mut String, id: &str, model: &str, created: u64) {
    out.push_str("data: {\"id\":");
    push_json_string_escaped(out, id);
    out.push_str(",\"object\":\"chat.completion.chunk\",\"created\":");
    push_u64_decimal(out, created);
    out.push_str(",\"model\":");
    push_json_string_escaped(out, model);
}
