//! Request bodies sent to the web-session API.
//!
//! Every body is built per call from borrowed request data, so nothing here
//! is shared or mutated between requests.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::CanonicalError;

/// Parent uuid the web client sends for the first message of a conversation.
pub const ROOT_PARENT_MESSAGE_UUID: &str = "00000000-0000-4000-8000-000000000000";

#[derive(Debug, Serialize)]
pub struct CreateConversationBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub uuid: String,
    pub name: &'static str,
    pub include_conversation_preferences: bool,
}

impl<'a> CreateConversationBody<'a> {
    #[must_use]
    pub fn new(model: Option<&'a str>, uuid: String) -> Self {
        Self {
            model,
            uuid,
            name: "",
            include_conversation_preferences: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct PersonalizedStyle {
    #[serde(rename = "type")]
    kind: &'static str,
    key: &'static str,
    name: &'static str,
    #[serde(rename = "nameKey")]
    name_key: &'static str,
    prompt: &'static str,
    summary: &'static str,
    #[serde(rename = "summaryKey")]
    summary_key: &'static str,
    #[serde(rename = "isDefault")]
    is_default: bool,
}

const DEFAULT_STYLE: PersonalizedStyle = PersonalizedStyle {
    kind: "default",
    key: "Default",
    name: "Normal",
    name_key: "normal_style_name",
    prompt: "Normal",
    summary: "Default responses from Claude",
    summary_key: "normal_style_summary",
    is_default: true,
};

#[derive(Debug, Serialize)]
struct ToolRef {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
}

const DEFAULT_TOOLS: [ToolRef; 3] = [
    ToolRef {
        kind: "web_search_v0",
        name: "web_search",
    },
    ToolRef {
        kind: "artifacts_v0",
        name: "artifacts",
    },
    ToolRef {
        kind: "repl_v0",
        name: "repl",
    },
];

/// Inline text attachment carried in the completion body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub file_name: String,
    pub file_type: String,
    pub file_size: usize,
    pub extracted_content: String,
}

/// Wrap a long prompt as the `context.txt` attachment.
#[must_use]
pub fn big_context_attachment(text: &str) -> Attachment {
    Attachment {
        file_name: "context.txt".to_string(),
        file_type: "text/plain".to_string(),
        file_size: text.len(),
        extracted_content: text.to_string(),
    }
}

/// Body of `POST .../chat_conversations/{id}/completion`.
#[derive(Debug, Serialize)]
pub struct CompletionBody<'a> {
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    personalized_styles: [PersonalizedStyle; 1],
    tools: [ToolRef; 3],
    parent_message_uuid: &'static str,
    pub attachments: &'a [Attachment],
    pub files: &'a [String],
    sync_sources: [&'static str; 0],
    rendering_mode: &'static str,
    pub timezone: &'a str,
}

impl<'a> CompletionBody<'a> {
    #[must_use]
    pub fn new(
        prompt: &'a str,
        model: Option<&'a str>,
        attachments: &'a [Attachment],
        files: &'a [String],
        timezone: &'a str,
    ) -> Self {
        Self {
            prompt,
            model,
            personalized_styles: [DEFAULT_STYLE],
            tools: DEFAULT_TOOLS,
            parent_message_uuid: ROOT_PARENT_MESSAGE_UUID,
            attachments,
            files,
            sync_sources: [],
            rendering_mode: "messages",
            timezone,
        }
    }
}

/// Account settings the web client always sends in full, with their defaults.
const ACCOUNT_SETTING_DEFAULTS: &[(&str, Option<bool>)] = &[
    ("input_menu_pinned_items", None),
    ("has_seen_mm_examples", None),
    ("has_seen_starter_prompts", None),
    ("has_started_claudeai_onboarding", Some(true)),
    ("has_finished_claudeai_onboarding", Some(true)),
    ("dismissed_claudeai_banners", None),
    ("dismissed_artifacts_announcement", None),
    ("preview_feature_uses_artifacts", None),
    ("preview_feature_uses_latex", None),
    ("preview_feature_uses_citations", None),
    ("preview_feature_uses_harmony", None),
    ("enabled_artifacts_attachments", Some(true)),
    ("enabled_turmeric", None),
    ("enable_chat_suggestions", None),
    ("dismissed_artifact_feedback_form", None),
    ("enabled_mm_pdfs", None),
    ("enabled_gdrive", None),
    ("enabled_bananagrams", None),
    ("enabled_gdrive_indexing", None),
    ("enabled_web_search", Some(true)),
    ("enabled_compass", None),
    ("enabled_sourdough", None),
    ("enabled_foccacia", None),
    ("dismissed_claude_code_spotlight", None),
    ("enabled_geolocation", None),
    ("enabled_mcp_tools", None),
    ("paprika_mode", None),
    ("enabled_monkeys_in_a_barrel", None),
];

/// Build the `{"settings": {...}}` body with `key` overridden.
///
/// # Errors
///
/// Returns [`CanonicalError::InvalidRequest`] for a key the account API does
/// not know.
pub fn account_settings_body(
    key: &str,
    value: serde_json::Value,
) -> Result<serde_json::Value, CanonicalError> {
    if !ACCOUNT_SETTING_DEFAULTS.iter().any(|(name, _)| *name == key) {
        return Err(CanonicalError::InvalidRequest(format!(
            "unknown setting key: {key}"
        )));
    }
    let mut settings = serde_json::Map::with_capacity(ACCOUNT_SETTING_DEFAULTS.len());
    for (name, default) in ACCOUNT_SETTING_DEFAULTS {
        let entry = if *name == "dismissed_claudeai_banners" {
            serde_json::Value::Array(Vec::new())
        } else {
            default.map_or(serde_json::Value::Null, serde_json::Value::Bool)
        };
        settings.insert((*name).to_string(), entry);
    }
    settings.insert(key.to_string(), value);
    Ok(serde_json::json!({ "settings": settings }))
}

/// One entry of `GET /api/organizations`.
#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rate_limit_tier: Option<String>,
}

const CHAT_CAPABLE_TIERS: &[&str] = &[
    "default_claude_ai",
    "default_claude_max_20x",
    "default_raven_enterprise",
];

/// Pick the organization that owns chat conversations.
///
/// # Errors
///
/// Returns [`CanonicalError::Upstream`] when the list is empty or, with
/// several entries, none carries a chat-capable rate limit tier.
pub fn select_organization(orgs: &[Organization]) -> Result<&Organization, CanonicalError> {
    let no_org = |message: &str| CanonicalError::Upstream {
        status: 404,
        message: message.to_string(),
    };
    match orgs {
        [] => Err(no_org("no organizations found")),
        [only] => Ok(only),
        _ => orgs
            .iter()
            .find(|org| {
                org.rate_limit_tier
                    .as_deref()
                    .is_some_and(|tier| CHAT_CAPABLE_TIERS.contains(&tier))
            })
            .ok_or_else(|| no_org("no default organization found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatedConversation {
    pub uuid: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadedFile {
    pub file_uuid: String,
}

/// A decoded `data:<mime>;base64,<payload>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    /// Parse and decode a base64 data URI.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::InvalidRequest`] when the URI is not a base64
    /// data URI or the payload does not decode.
    pub fn parse(uri: &str) -> Result<Self, CanonicalError> {
        let invalid = |what: &str| CanonicalError::InvalidRequest(format!("invalid file data: {what}"));
        let (meta, payload) = uri.split_once(',').ok_or_else(|| invalid("missing ','"))?;
        let meta = meta
            .strip_prefix("data:")
            .ok_or_else(|| invalid("missing data: scheme"))?;
        let (content_type, encoding) = meta
            .split_once(';')
            .ok_or_else(|| invalid("missing encoding"))?;
        if encoding != "base64" {
            return Err(invalid("only base64 encoding is supported"));
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|err| invalid(&format!("base64 decode failed: {err}")))?;
        Ok(Self {
            content_type: content_type.to_string(),
            bytes,
        })
    }

    /// File name the web client would use for this content type.
    #[must_use]
    pub fn file_name(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/jpeg" => "image.jpg",
            "image/png" => "image.png",
            "application/pdf" => "document.pdf",
            _ => "file",
        }
    }
}
