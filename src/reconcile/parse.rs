use super::sanitize::{sanitize, strip_fences};
use serde_json::Value;

/// Why a response could not be read as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub message: String,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Parse a model response in two tiers.
///
/// Fence stripping alone is tried first so already-valid JSON is never run
/// through the heavier rewrites; the full sanitizer chain is the fallback.
pub fn parse_response(raw: &str) -> Result<Value, ParseFailure> {
    let unfenced = strip_fences(raw);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced.trim()) {
        return Ok(value);
    }

    let sanitized = sanitize(raw);
    serde_json::from_str::<Value>(sanitized.trim()).map_err(|e| ParseFailure {
        message: e.to_string(),
    })
}

/// Last-chance recovery once the retry budget is spent.
///
/// Tries the first balanced top-level object, then a truncated object with its
/// open strings and containers closed.
pub fn salvage(raw: &str) -> Option<Value> {
    let unfenced = strip_fences(raw);

    if let Some(fragment) = extract_balanced_object(&unfenced) {
        if let Ok(value) = parse_response(fragment) {
            return Some(value);
        }
    }

    let start = unfenced.find('{')?;
    let closed = close_truncated(&unfenced[start..]);
    parse_response(&closed).ok()
}

/// Extract the first balanced `{...}` span, ignoring braces inside strings.
pub(crate) fn extract_balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    let mut start_idx = None;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if start_idx.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start_idx = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = start_idx {
                        return Some(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Close whatever a cut-off response left open, innermost first.
pub(crate) fn close_truncated(text: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for c in text.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut closed = text.trim_end().to_string();
    if escape_next {
        closed.pop();
    }
    if in_string {
        closed.push('"');
    }
    // A dangling separator or key would still be rejected by the parser.
    loop {
        let trimmed_len = closed.trim_end().len();
        match closed[..trimmed_len].chars().last() {
            Some(',') => closed.truncate(trimmed_len - 1),
            Some(':') => {
                closed.truncate(trimmed_len - 1);
                drop_dangling_key(&mut closed);
            }
            _ => {
                closed.truncate(trimmed_len);
                break;
            }
        }
    }
    while let Some(closer) = stack.pop() {
        closed.push(closer);
    }
    closed
}

/// Remove a trailing `"key"` left behind after its `:` was cut.
fn drop_dangling_key(text: &mut String) {
    let trimmed_len = text.trim_end().len();
    text.truncate(trimmed_len);
    if !text.ends_with('"') {
        return;
    }
    let body = &text[..text.len() - 1];
    if let Some(open) = body.rfind('"') {
        text.truncate(open);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_json_parses_without_sanitizing() {
        // Curly quotes inside a valid string must not be rewritten.
        let raw = "{\"line\": \"\u{201C}Run,\u{201D} she said\"}";
        let value = parse_response(raw).unwrap();
        assert_eq!(value["line"], "\u{201C}Run,\u{201D} she said");
    }

    #[test]
    fn test_fenced_json_parses_on_first_tier() {
        let value = parse_response("```json\n{\"a\": [1, 2]}\n```").unwrap();
        assert_eq!(value, json!({"a": [1, 2]}));
    }

    #[test]
    fn test_sloppy_json_parses_on_second_tier() {
        let raw = "Here you go:\n{\u{201C}a\u{201D}: [1, 2,],}\nLet me know!";
        assert_eq!(parse_response(raw).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_prose_reports_failure() {
        let err = parse_response("I could not find any characters.").unwrap_err();
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_balanced_extraction_ignores_braces_in_strings() {
        let text = "noise {\"a\": \"}{\", \"b\": {\"c\": 1}} trailing {\"x\": 2}";
        assert_eq!(
            extract_balanced_object(text),
            Some("{\"a\": \"}{\", \"b\": {\"c\": 1}}")
        );
    }

    #[test]
    fn test_salvage_recovers_first_of_two_objects() {
        let raw = "{\"title\": \"One\"}\n{\"title\": \"Two\"}";
        assert!(parse_response(raw).is_err());
        assert_eq!(salvage(raw), Some(json!({"title": "One"})));
    }

    #[test]
    fn test_salvage_closes_truncated_object() {
        let raw = "{\"characters\": [{\"name\": \"Alice\", \"description\": \"a quiet";
        let value = salvage(raw).unwrap();
        assert_eq!(value["characters"][0]["name"], "Alice");
        assert_eq!(value["characters"][0]["description"], "a quiet");
    }

    #[test]
    fn test_salvage_drops_dangling_key() {
        let raw = "{\"title\": \"Dusk\", \"chapters\":";
        assert_eq!(salvage(raw), Some(json!({"title": "Dusk"})));
    }

    #[test]
    fn test_salvage_gives_up_on_plain_prose() {
        assert_eq!(salvage("no structure here at all"), None);
    }
}
