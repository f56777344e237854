use super::{OpenAiChatResponse, OpenAiChoice, OpenAiResponseMessage, OpenAiUsage};

/// Build the single `chat.completion` body of a non-streaming reply.
#[must_use]
pub fn encode_openai_chat_response(
    id: &str,
    model: &str,
    created: u64,
    content: String,
) -> OpenAiChatResponse {
    OpenAiChatResponse {
        id: id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiResponseMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: Some("stop".to_string()),
        }],
        usage: OpenAiUsage::default(),
    }
}
