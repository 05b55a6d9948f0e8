/// Truncate to `max` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Single-line preview of raw model text, used in prompts and log entries.
pub fn excerpt(raw: &str, max_chars: usize) -> String {
    let flattened = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&flattened, max_chars)
}

#[cfg(test)]
mod tests {
    use super::{excerpt, truncate};

    #[test]
    fn test_truncate_unicode_safe() {
        let input = "ééééé";
        assert_eq!(truncate(input, 4), "é...");
    }

    #[test]
    fn test_truncate_small_max() {
        let input = "こんにちは";
        assert_eq!(truncate(input, 3), "こんに");
        assert_eq!(truncate(input, 0), "");
    }

    #[test]
    fn test_excerpt_flattens_whitespace() {
        let raw = "{\n  \"characters\":\n    [ ";
        assert_eq!(excerpt(raw, 200), "{ \"characters\": [");
        assert_eq!(excerpt(raw, 8), "{ \"ch...");
    }
}
