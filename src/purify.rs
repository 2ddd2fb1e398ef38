//! JSON string purification (§7).
//!
//! Every string embedded in a produced JSON document — commit messages,
//! author names, file paths, error text — passes through `purify_str`
//! first. It escapes control bytes, quotes, backslashes, and the
//! characters that make naive HTML-embedded JSON dangerous (`<`, `>`,
//! `&`, `=`) as `\uXXXX`, and drops anything that isn't valid UTF-8 at the
//! byte level by replacing it with `�`.

/// Escapes a string for safe embedding inside a JSON document that may
/// itself be inlined into an HTML `<script>` block (§6 "HTML sandwich").
pub fn purify_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '=' => out.push_str("\\u003d"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Purifies raw, possibly non-UTF-8 bytes (git blob/path content is not
/// guaranteed to be UTF-8, spec §4.D "Blob" note). Invalid sequences are
/// replaced per `String::from_utf8_lossy` before purification.
pub fn purify_bytes(b: &[u8]) -> String {
    purify_str(&String::from_utf8_lossy(b))
}

/// Purifies an already-serialized JSON document as a whole, applied once
/// right before a job artifact is cached or streamed (§7, §8.6). `serde_json`
/// already escapes `"`, `\`, and control bytes correctly on the way out, so
/// the only bytes left for this pass are the four HTML-sensitive ones
/// (`<`, `>`, `&`, `=`) it has no reason to touch itself. Those four never
/// appear as JSON structural syntax (no object/array/number/literal token
/// uses any of them), only inside string content, so replacing them
/// unconditionally anywhere in the buffer is safe.
pub fn purify_json_bytes(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len());
    for &b in buf {
        match b {
            b'<' => out.extend_from_slice(b"\\u003c"),
            b'>' => out.extend_from_slice(b"\\u003e"),
            b'&' => out.extend_from_slice(b"\\u0026"),
            b'=' => out.extend_from_slice(b"\\u003d"),
            _ => out.push(b),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_backslashes() {
        assert_eq!(purify_str(r#"a"b\c"#), r#"a\"b\\c"#);
    }

    #[test]
    fn escapes_html_sensitive_chars() {
        assert_eq!(purify_str("<a href=\"x\">&amp;</a>"), "\\u003ca href=\\\"x\\\"\\u003e\\u0026amp;\\u003c/a\\u003e");
    }

    #[test]
    fn escapes_control_bytes() {
        assert_eq!(purify_str("a\u{0001}b"), "a\\u0001b");
    }

    #[test]
    fn escapes_newlines_as_short_forms() {
        assert_eq!(purify_str("a\nb\tc\rd"), "a\\nb\\tc\\rd");
    }

    #[test]
    fn lossy_bytes_do_not_panic() {
        let bytes = [0x41, 0xff, 0x42];
        let s = purify_bytes(&bytes);
        assert!(s.contains('A') && s.contains('B'));
    }

    #[test]
    fn json_bytes_escapes_html_sensitive_chars_without_touching_structure() {
        let doc = br#"{"a":"<script>&x=1</script>"}"#;
        let out = purify_json_bytes(doc);
        let s = String::from_utf8(out).unwrap();
        assert!(!s.contains('<') && !s.contains('>') && !s.contains('&') && !s.contains('='));
        assert!(s.starts_with('{') && s.ends_with('}'));
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["a"], "<script>&x=1</script>");
    }

    #[test]
    fn json_bytes_leaves_quotes_and_control_escapes_from_serde_alone() {
        let doc = serde_json::to_vec(&serde_json::json!({"msg": "a\"b\\c\nd"})).unwrap();
        let out = purify_json_bytes(&doc);
        assert_eq!(out, doc);
    }
}
