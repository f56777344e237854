//! Flattening of an OpenAI message list into one web-session prompt.

use crate::config::FeaturesConfig;
use crate::error::CanonicalError;
use crate::protocol::openai_chat::{OpenAiContent, OpenAiContentPart, OpenAiMessage};
use crate::session::{big_context_attachment, OutgoingMessage, WebSession};

/// Prompt sent instead of the conversation when it travels as `context.txt`.
pub const BIG_CONTEXT_PROMPT: &str =
    "The full conversation is in the attached context.txt. Reply to its last message.";

/// Messages rendered to text plus the images that still need uploading.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub text: String,
    pub image_data_uris: Vec<String>,
}

fn role_label(role: &str) -> &'static str {
    match role {
        "assistant" => "Assistant",
        "system" | "developer" => "System",
        _ => "Human",
    }
}

/// Render messages in order, one block per message, separated by a blank
/// line. Images given as `data:` URIs are collected for upload; remote image
/// URLs cannot be forwarded and are dropped.
#[must_use]
pub fn render_prompt(messages: &[OpenAiMessage], role_prefix: bool) -> RenderedPrompt {
    let mut rendered = RenderedPrompt::default();
    for message in messages {
        let mut text = String::new();
        match &message.content {
            None => {}
            Some(OpenAiContent::Text(body)) => text.push_str(body),
            Some(OpenAiContent::Parts(parts)) => {
                for part in parts {
                    match part {
                        OpenAiContentPart::Text { text: body } => {
                            if !text.is_empty() {
                                text.push('\n');
                            }
                            text.push_str(body);
                        }
                        OpenAiContentPart::ImageUrl { image_url } => {
                            if image_url.url.starts_with("data:") {
                                rendered.image_data_uris.push(image_url.url.clone());
                            } else {
                                tracing::debug!(url = %image_url.url, "skipping remote image url");
                            }
                        }
                        OpenAiContentPart::Unsupported => {}
                    }
                }
            }
        }
        if text.is_empty() {
            continue;
        }
        if !rendered.text.is_empty() {
            rendered.text.push_str("\n\n");
        }
        if role_prefix {
            rendered.text.push_str(role_label(&message.role));
            rendered.text.push_str(": ");
        }
        rendered.text.push_str(&text);
    }
    rendered
}

/// Build the completion payload: render, upload images, and move an oversized
/// prompt into a `context.txt` attachment.
///
/// # Errors
///
/// Fails when the conversation renders to nothing or an image upload fails.
pub async fn build_outgoing_message(
    session: &WebSession,
    features: &FeaturesConfig,
    messages: &[OpenAiMessage],
) -> Result<OutgoingMessage, CanonicalError> {
    let rendered = render_prompt(messages, features.role_prefix);
    if rendered.text.is_empty() && rendered.image_data_uris.is_empty() {
        return Err(CanonicalError::InvalidRequest(
            "messages contain no text or image content".to_string(),
        ));
    }

    let mut files = Vec::with_capacity(rendered.image_data_uris.len());
    for uri in &rendered.image_data_uris {
        files.push(session.upload_file(uri).await?);
    }

    let threshold = features.big_context_threshold_chars;
    if threshold > 0 && rendered.text.chars().count() > threshold {
        tracing::debug!(
            chars = rendered.text.chars().count(),
            threshold,
            "sending prompt as context attachment"
        );
        return Ok(OutgoingMessage {
            prompt: BIG_CONTEXT_PROMPT.to_string(),
            attachments: vec![big_context_attachment(&rendered.text)],
            files,
        });
    }

    Ok(OutgoingMessage {
        prompt: rendered.text,
        attachments: Vec::new(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(json: &str) -> Vec<OpenAiMessage> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn renders_roles_with_blank_lines() {
        let msgs = messages(
            r#"[
                {"role":"system","content":"Be terse."},
                {"role":"user","content":"Hi"},
                {"role":"assistant","content":"Hello."},
                {"role":"user","content":"Bye"}
            ]"#,
        );
        let rendered = render_prompt(&msgs, true);
        assert_eq!(
            rendered.text,
            "System: Be terse.\n\nHuman: Hi\n\nAssistant: Hello.\n\nHuman: Bye"
        );
        assert!(rendered.image_data_uris.is_empty());
    }

    #[test]
    fn renders_without_prefix() {
        let msgs = messages(r#"[{"role":"user","content":"a"},{"role":"assistant","content":"b"}]"#);
        assert_eq!(render_prompt(&msgs, false).text, "a\n\nb");
    }

    #[test]
    fn collects_data_uri_images_and_joins_text_parts() {
        let msgs = messages(
            r#"[{"role":"user","content":[
                {"type":"text","text":"look"},
                {"type":"image_url","image_url":{"url":"data:image/png;base64,aGk="}},
                {"type":"image_url","image_url":{"url":"https://example.com/cat.png"}},
                {"type":"text","text":"closely"}
            ]}]"#,
        );
        let rendered = render_prompt(&msgs, true);
        assert_eq!(rendered.text, "Human: look\nclosely");
        assert_eq!(rendered.image_data_uris, vec!["data:image/png;base64,aGk=".to_string()]);
    }

    #[test]
    fn skips_empty_messages() {
        let msgs = messages(
            r#"[{"role":"assistant","content":null},{"role":"user","content":""},{"role":"user","content":"x"}]"#,
        );
        assert_eq!(render_prompt(&msgs, true).text, "Human: x");
    }
}
