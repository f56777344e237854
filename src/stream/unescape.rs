//! Decoding of tool payload fragments.
//!
//! Code and artifact bodies arrive as slices of a JSON string value with the
//! surrounding quotes cut off, and the upstream is free to cut in the middle
//! of an escape sequence. Decoding is therefore a prioritized chain: a strict
//! JSON-string decode first, then literal substitutions, then a manual
//! `\uXXXX` scan. Each fragment is decoded on its own.

use memchr::memchr;

/// Decode one `partial_json` fragment into display text.
#[must_use]
pub fn unescape_fragment(fragment: &str) -> String {
    let body = fragment.strip_prefix('"').unwrap_or(fragment);
    if body == "\"}" || body == "}" {
        return String::new();
    }
    if let Some(decoded) = decode_json_string_body(body) {
        return decoded;
    }
    tracing::debug!(fragment = body, "strict fragment decode failed, using fallback");
    decode_unicode_escapes(&substitute_escapes(body))
}

/// Strict decode of a JSON string body (content between the quotes).
#[must_use]
pub fn decode_json_string_body(body: &str) -> Option<String> {
    let mut quoted = String::with_capacity(body.len() + 2);
    quoted.push('"');
    quoted.push_str(body);
    quoted.push('"');
    serde_json::from_str::<String>(&quoted).ok()
}

/// Literal substitutions applied when strict decoding fails, in this order.
const FALLBACK_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("\\\\n", ""),
    ("\\\\u", "\\u"),
    ("\\\"", "\""),
    ("\\\\'", "'"),
    ("\\n", "\n"),
    ("\\t", "\t"),
];

fn substitute_escapes(body: &str) -> String {
    let mut out = body.to_string();
    for (from, to) in FALLBACK_SUBSTITUTIONS {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    out
}

/// Replace every complete `\uXXXX` escape with its character.
///
/// Surrogate pairs are combined when both halves are present. Anything that
/// is not a complete, valid escape (including a truncated one at the end of
/// the input) is copied through unchanged.
#[must_use]
pub fn decode_unicode_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = memchr(b'\\', rest.as_bytes()) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        if let Some((ch, consumed)) = parse_unicode_escape(rest) {
            out.push(ch);
            rest = &rest[consumed..];
        } else {
            out.push('\\');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

fn parse_unicode_escape(s: &str) -> Option<(char, usize)> {
    let first = hex_escape_value(s)?;
    if (0xD800..=0xDBFF).contains(&first) {
        let second = hex_escape_value(&s[6..])?;
        if !(0xDC00..=0xDFFF).contains(&second) {
            return None;
        }
        let combined = 0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00);
        return char::from_u32(combined).map(|ch| (ch, 12));
    }
    char::from_u32(first).map(|ch| (ch, 6))
}

#[inline]
fn hex_escape_value(s: &str) -> Option<u32> {
    let bytes = s.as_bytes();
    if bytes.len() < 6 || bytes[0] != b'\\' || bytes[1] != b'u' {
        return None;
    }
    bytes[2..6].iter().try_fold(0u32, |acc, &b| {
        let digit = char::from(b).to_digit(16)?;
        Some((acc << 4) | digit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_path_decodes_escapes() {
        assert_eq!(unescape_fragment("def f():\\n\\treturn 1"), "def f():\n\treturn 1");
        assert_eq!(unescape_fragment("say \\\"hi\\\""), "say \"hi\"");
        assert_eq!(unescape_fragment("caf\\u00e9"), "café");
    }

    #[test]
    fn leading_quote_is_stripped() {
        assert_eq!(unescape_fragment("\"print(1)"), "print(1)");
    }

    #[test]
    fn closing_brace_artifacts_are_empty() {
        assert_eq!(unescape_fragment("\"}"), "");
        assert_eq!(unescape_fragment("}"), "");
        assert_eq!(unescape_fragment("\"\"}"), "");
    }

    #[test]
    fn trailing_lone_backslash_falls_back() {
        // strict decode fails because the final backslash escapes the quote
        assert_eq!(unescape_fragment("line\\nnext\\"), "line\nnext\\");
    }

    #[test]
    fn fallback_decodes_unicode_and_keeps_partial_tail() {
        assert_eq!(unescape_fragment("caf\\u00e9 \\u00"), "café \\u00");
    }

    #[test]
    fn split_unicode_escape_is_not_rejoined() {
        let joined = unescape_fragment("caf\\u00") + &unescape_fragment("e9");
        assert_eq!(joined, "caf\\u00e9");
    }

    #[test]
    fn fallback_applies_substitutions_in_order() {
        // `\\n` is dropped before single `\n` becomes a newline
        assert_eq!(unescape_fragment("a\\\\nb\\nc\\"), "ab\nc\\");
        // `\\u` collapses to `\u` and is then decoded
        assert_eq!(unescape_fragment("x\\\\u0041\\"), "xA\\");
        assert_eq!(unescape_fragment("it\\\\'s\\"), "it's\\");
    }

    #[test]
    fn decode_unicode_escapes_handles_any_position() {
        assert_eq!(decode_unicode_escapes("\\u0041bc"), "Abc");
        assert_eq!(decode_unicode_escapes("ab\\u0043"), "abC");
        assert_eq!(decode_unicode_escapes("日本\\u8a9e"), "日本語");
        assert_eq!(decode_unicode_escapes("\\uZZZZ"), "\\uZZZZ");
        assert_eq!(decode_unicode_escapes("\\u12"), "\\u12");
        assert_eq!(decode_unicode_escapes("\\"), "\\");
    }

    #[test]
    fn decode_unicode_escapes_combines_surrogates() {
        assert_eq!(decode_unicode_escapes("\\ud83d\\ude00"), "😀");
        assert_eq!(decode_unicode_escapes("\\ud83d!"), "\\ud83d!");
    }
}
