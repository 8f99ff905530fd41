//! JSON request bodies for the completion service.
//!
//! The body is assembled by hand rather than serialized so that the numeric
//! settings (`maxtokens`, `temperature`) reach the service exactly as they were
//! written in the config file.

use crate::{error::Result, store::Section};

/// Model used when the section does not name one.
pub const DEFAULT_MODEL: &str = "vine-omni";

const HEX: &[u8; 16] = b"0123456789abcdef";

const fn escaped_width(b: u8) -> usize {
    match b {
        b'"' | b'\\' | 0x08 | 0x0c | b'\n' | b'\r' | b'\t' => 2,
        0..0x20 => 6,
        _ => 1,
    }
}

/// Escapes bytes into the body of a JSON string literal, without quotes.
///
/// `"` and `\` are backslash-escaped, the usual short escapes are used for
/// backspace, form feed, newline, carriage return and tab, other bytes below
/// 0x20 become `\u00xx` with lowercase hex, and every byte from 0x20 upward
/// is copied through untouched. No UTF-8 validation is done, so the output
/// keeps the input's byte encoding.
///
/// # Errors
///
/// Returns [`Error::Allocation`](crate::Error::Allocation) if the output
/// cannot be allocated.
pub fn escape_json_string(input: &[u8]) -> Result<Vec<u8>> {
    let len: usize = input.iter().map(|&b| escaped_width(b)).sum();
    let mut out = Vec::new();
    out.try_reserve_exact(len)?;

    for &b in input {
        match b {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0c => out.extend_from_slice(b"\\f"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0..0x20 => {
                out.extend_from_slice(b"\\u00");
                out.push(HEX[usize::from(b >> 4)]);
                out.push(HEX[usize::from(b & 0xf)]);
            }
            _ => out.push(b),
        }
    }

    Ok(out)
}

/// Builds the request body for `prompt` from a section's settings.
///
/// Field order is fixed: `model`, `prompt`, then `max_tokens` and
/// `temperature` when configured. The two numeric settings are inserted
/// verbatim, unquoted.
///
/// # Errors
///
/// Returns [`Error::Allocation`](crate::Error::Allocation) if a buffer cannot
/// be allocated.
pub fn build_request_body(section: &Section, prompt: &[u8]) -> Result<Vec<u8>> {
    let model = escape_json_string(section.get_non_empty("model").unwrap_or(DEFAULT_MODEL).as_bytes())?;
    let prompt = escape_json_string(prompt)?;
    let max_tokens = section.get_non_empty("maxtokens");
    let temperature = section.get_non_empty("temperature");

    let needed = model.len()
        + prompt.len()
        + max_tokens.map_or(0, |v| v.len() + 16)
        + temperature.map_or(0, |v| v.len() + 16)
        + 32;
    let mut body = Vec::new();
    body.try_reserve_exact(needed)?;

    body.extend_from_slice(b"{\"model\":\"");
    body.extend_from_slice(&model);
    body.extend_from_slice(b"\",\"prompt\":\"");
    body.extend_from_slice(&prompt);
    body.push(b'"');
    if let Some(max_tokens) = max_tokens {
        body.extend_from_slice(b",\"max_tokens\":");
        body.extend_from_slice(max_tokens.as_bytes());
    }
    if let Some(temperature) = temperature {
        body.extend_from_slice(b",\"temperature\":");
        body.extend_from_slice(temperature.as_bytes());
    }
    body.push(b'}');

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section_with(pairs: &[(&str, &str)]) -> Section {
        let mut section = Section::new("test");
        for (k, v) in pairs {
            section.set(*k, *v);
        }
        section
    }

    fn body(section: &Section, prompt: &str) -> String {
        String::from_utf8(build_request_body(section, prompt.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_escape_plain_ascii_unchanged() {
        let printable: Vec<u8> = (0x20u8..0x7f).filter(|b| *b != b'"' && *b != b'\\').collect();
        assert_eq!(escape_json_string(&printable).unwrap(), printable);
    }

    #[test]
    fn test_escape_quote_and_newline() {
        assert_eq!(escape_json_string(b"a\"b\nc").unwrap(), b"a\\\"b\\nc");
    }

    #[test]
    fn test_escape_short_forms() {
        assert_eq!(
            escape_json_string(b"\\ \x08 \x0c \r \t").unwrap(),
            b"\\\\ \\b \\f \\r \\t"
        );
    }

    #[test]
    fn test_escape_other_controls_lowercase_hex() {
        assert_eq!(escape_json_string(b"\x00").unwrap(), b"\\u0000");
        assert_eq!(escape_json_string(b"\x01\x1b\x1f").unwrap(), b"\\u0001\\u001b\\u001f");
    }

    #[test]
    fn test_escape_high_bytes_pass_through() {
        assert_eq!(
            escape_json_string("héllo → 世界 \u{7f}".as_bytes()).unwrap(),
            "héllo → 世界 \u{7f}".as_bytes()
        );
        // Latin-1 text is not UTF-8 and is still copied byte for byte
        assert_eq!(escape_json_string(b"caf\xe9\n").unwrap(), b"caf\xe9\\n");
    }

    #[test]
    fn test_escape_empty() {
        assert!(escape_json_string(b"").unwrap().is_empty());
    }

    #[test]
    fn test_escape_decodes_back() {
        let input = "line1\nline2\t\"quoted\" \\ \u{02} ünïcode";
        let escaped = String::from_utf8(escape_json_string(input.as_bytes()).unwrap()).unwrap();
        let decoded: String = serde_json::from_str(&format!("\"{escaped}\"")).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_body_default_model_and_max_tokens() {
        let section = section_with(&[("posturl", "http://x"), ("maxtokens", "100")]);
        assert_eq!(
            body(&section, "hi"),
            r#"{"model":"vine-omni","prompt":"hi","max_tokens":100}"#
        );
    }

    #[test]
    fn test_body_all_fields_in_order() {
        let section = section_with(&[
            ("temperature", "0.2"),
            ("maxtokens", "512"),
            ("model", "m1"),
        ]);
        assert_eq!(
            body(&section, "p"),
            r#"{"model":"m1","prompt":"p","max_tokens":512,"temperature":0.2}"#
        );
    }

    #[test]
    fn test_body_temperature_only() {
        let section = section_with(&[("temperature", "1")]);
        assert_eq!(
            body(&section, "p"),
            r#"{"model":"vine-omni","prompt":"p","temperature":1}"#
        );
    }

    #[test]
    fn test_body_empty_values_treated_as_absent() {
        let section = section_with(&[("model", ""), ("maxtokens", ""), ("temperature", "")]);
        assert_eq!(body(&section, "p"), r#"{"model":"vine-omni","prompt":"p"}"#);
    }

    #[test]
    fn test_body_keeps_latin1_prompt_bytes() {
        let raw = build_request_body(&section_with(&[]), b"/* caf\xe9 */").unwrap();
        assert_eq!(raw, b"{\"model\":\"vine-omni\",\"prompt\":\"/* caf\xe9 */\"}");
    }

    #[test]
    fn test_body_is_valid_json() {
        let section = section_with(&[("model", "we\"ird"), ("maxtokens", "64")]);
        let prompt = "/* READ: a.c */\nint main() { puts(\"it's\"); }\n";
        let body = body(&section, prompt);

        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["model"], "we\"ird");
        assert_eq!(value["prompt"], prompt);
        assert_eq!(value["max_tokens"], 64);
        assert_eq!(value.as_object().unwrap().len(), 3);
    }
}
