//! Best-effort cleanup of raw model text toward parseable JSON.
//!
//! Every step is pure and leaves already-clean JSON untouched, so running the
//! chain twice gives the same result as running it once.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

static LEADING_FENCE: OnceLock<Regex> = OnceLock::new();
static TRAILING_FENCE: OnceLock<Regex> = OnceLock::new();

fn leading_fence() -> &'static Regex {
    LEADING_FENCE.get_or_init(|| {
        Regex::new(r"^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n?")
            .unwrap_or_else(|_| Regex::new("$^").unwrap())
    })
}

fn trailing_fence() -> &'static Regex {
    TRAILING_FENCE.get_or_init(|| {
        Regex::new(r"\s*```\s*$").unwrap_or_else(|_| Regex::new("$^").unwrap())
    })
}

/// Run the full chain: fences, object slice, quotes, trailing commas.
pub fn sanitize(raw: &str) -> String {
    let unfenced = strip_fences(raw);
    let sliced = slice_to_object(&unfenced);
    let quoted = normalize_quotes(sliced);
    strip_trailing_commas(&quoted).into_owned()
}

/// Strip one leading fence marker (with optional language tag) and one trailing fence.
pub fn strip_fences(text: &str) -> Cow<'_, str> {
    let head = leading_fence().replace(text, "");
    match trailing_fence().replace(&head, "") {
        Cow::Borrowed(tail) if tail.len() == text.len() => Cow::Borrowed(text),
        Cow::Borrowed(tail) => Cow::Owned(tail.to_string()),
        Cow::Owned(tail) => Cow::Owned(tail),
    }
}

/// Slice to the span between the first `{` and the last `}`.
///
/// Text without such a pair is returned unchanged.
pub fn slice_to_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Map curly quotes to ASCII quotes and drop backticks.
pub fn normalize_quotes(text: &str) -> Cow<'_, str> {
    let needs_work = text.chars().any(|c| {
        matches!(
            c,
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{2018}'
                | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '`'
        )
    });
    if !needs_work {
        return Cow::Borrowed(text);
    }

    let normalized: String = text
        .chars()
        .filter_map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => Some('"'),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => Some('\''),
            '`' => None,
            other => Some(other),
        })
        .collect();
    Cow::Owned(normalized)
}

/// Remove commas that directly precede `]` or `}` (whitespace allowed between).
///
/// Commas inside string literals are kept, so `"a,}"` survives intact.
pub fn strip_trailing_commas(text: &str) -> Cow<'_, str> {
    let mut drop_at: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;
    let mut pending_comma: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                pending_comma = None;
            }
            ',' => pending_comma = Some(i),
            ']' | '}' => {
                if let Some(at) = pending_comma.take() {
                    drop_at.push(at);
                }
            }
            c if c.is_whitespace() => {}
            _ => pending_comma = None,
        }
    }

    if drop_at.is_empty() {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for at in drop_at {
        out.push_str(&text[last..at]);
        last = at + 1;
    }
    out.push_str(&text[last..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_language_tagged_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strips_bare_fence_with_whitespace() {
        let raw = "  \n```\n{\"a\": 1}\n```  \n";
        assert_eq!(strip_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fences_leaves_unfenced_text_borrowed() {
        let raw = "{\"a\": 1}";
        assert!(matches!(strip_fences(raw), Cow::Borrowed(_)));
    }

    #[test]
    fn test_slices_prose_around_object() {
        let raw = "Here is the data: {\"a\": {\"b\": 2}} hope that helps";
        assert_eq!(slice_to_object(raw), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn test_slice_without_braces_is_unchanged() {
        assert_eq!(slice_to_object("Alice, Bob"), "Alice, Bob");
        assert_eq!(slice_to_object("} backwards {"), "} backwards {");
    }

    #[test]
    fn test_normalizes_smart_quotes_and_backticks() {
        let raw = "{\u{201C}name\u{201D}: \u{201C}`Ada`\u{201D}}";
        assert_eq!(normalize_quotes(raw), "{\"name\": \"Ada\"}");
    }

    #[test]
    fn test_strips_trailing_commas_before_closers() {
        let raw = "{\"tags\": [\"a\", \"b\",], \"n\": 1,\n}";
        assert_eq!(strip_trailing_commas(raw), "{\"tags\": [\"a\", \"b\"], \"n\": 1\n}");
    }

    #[test]
    fn test_trailing_comma_inside_string_is_preserved() {
        let raw = r#"{"quote": "wait,}", "n": [1,]}"#;
        assert_eq!(
            strip_trailing_commas(raw),
            r#"{"quote": "wait,}", "n": [1]}"#
        );
    }

    #[test]
    fn test_escaped_quote_does_not_end_string() {
        let raw = r#"{"line": "she said \",]\" loudly"}"#;
        assert_eq!(strip_trailing_commas(raw), raw);
    }

    #[test]
    fn test_full_chain_repairs_fenced_sloppy_json() {
        let raw = "Sure! ```json\n{\u{201C}title\u{201D}: \u{201C}Dusk\u{201D}, \"chapters\": [1, 2,],}\n```";
        let clean = sanitize(raw);
        let value: serde_json::Value = serde_json::from_str(&clean).unwrap();
        assert_eq!(value["title"], "Dusk");
        assert_eq!(value["chapters"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_clean_json_is_identity() {
        let clean = r#"{"characters": [{"name": "Alice", "description": "a fox"}], "count": 2}"#;
        assert_eq!(sanitize(clean), clean);
    }

    proptest! {
        #[test]
        fn prop_sanitize_never_panics(raw in ".{0,200}") {
            let _ = sanitize(&raw);
        }

        #[test]
        fn prop_sanitize_is_idempotent_on_serialized_json(
            keys in proptest::collection::vec("[a-z]{1,8}", 0..6),
            text in "[a-zA-Z0-9 ,.]{0,20}",
        ) {
            let mut map = serde_json::Map::new();
            for (i, key) in keys.iter().enumerate() {
                map.insert(key.clone(), serde_json::json!([text.clone(), i]));
            }
            let clean = serde_json::Value::Object(map).to_string();
            prop_assert_eq!(sanitize(&clean), clean.clone());
            prop_assert_eq!(sanitize(&sanitize(&clean)), clean);
        }
    }
}
