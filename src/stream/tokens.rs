//! Literal control fragments the web upstream sends inside `input_json_delta`
//! payloads.
//!
//! Tool invocations (artifacts, REPL, search) stream their JSON input one
//! fragment at a time. A handful of fragments carry no displayable text and
//! only mark structure: where the visible `content` field starts and where a
//! language identifier follows. They are matched verbatim, so every literal
//! lives in [`CONTROL_TOKENS`] and nowhere else.

/// Structural marker found in a tool payload fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlToken {
    /// `,"content":`: the tool input switches to its displayable body.
    ContentField,
    /// `,"language":`: the next fragment names the code language.
    LanguageField,
    /// `,"type":`: the next fragment names a content type (used as language).
    TypeField,
}

impl ControlToken {
    /// Whether this token announces a language value in the next fragment.
    #[must_use]
    pub fn announces_language(self) -> bool {
        matches!(self, ControlToken::LanguageField | ControlToken::TypeField)
    }
}

/// Exact fragment text → token. Matching is whole-fragment, never substring.
pub const CONTROL_TOKENS: &[(&str, ControlToken)] = &[
    (",\"content\":", ControlToken::ContentField),
    (",\"language\":", ControlToken::LanguageField),
    (",\"type\":", ControlToken::TypeField),
];

/// Content-type aliases the upstream uses in place of a fence language.
const LANGUAGE_ALIASES: &[(&str, &str)] = &[("text/html", "html")];

/// Fence language used until the upstream announces one.
pub const DEFAULT_CODE_LANGUAGE: &str = "md";

/// Classify a raw `partial_json` fragment.
#[must_use]
pub fn classify_fragment(fragment: &str) -> Option<ControlToken> {
    CONTROL_TOKENS
        .iter()
        .find(|(literal, _)| *literal == fragment)
        .map(|(_, token)| *token)
}

/// Turn the fragment that follows a language token into a fence language.
///
/// Returns `None` when the fragment carries no usable name (empty, or only
/// quotes), so the caller keeps its current language.
#[must_use]
pub fn normalize_language(fragment: &str) -> Option<String> {
    let raw = fragment.trim().trim_matches('"').trim();
    if raw.is_empty() {
        return None;
    }
    let language = LANGUAGE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == raw)
        .map_or_else(|| raw.to_string(), |(_, short)| (*short).to_string());
    Some(language)
}
