const MAX_ERROR_LENGTH: usize = 2_000;

/// Largest char boundary at or below `max` bytes.
fn floor_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    let mut idx = max;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Cut `text` to at most `max` bytes, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        format!("{}...", &text[..floor_boundary(text, max)])
    }
}

pub fn truncate_error(error: &str) -> String {
    truncate_chars(error, MAX_ERROR_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_chars("exit 1", 10), "exit 1");
    }

    #[test]
    fn test_cut_respects_char_boundaries() {
        // 'é' is two bytes; a cut at byte 2 would split it
        assert_eq!(truncate_chars("aéb", 2), "a...");
        let long = "ü".repeat(MAX_ERROR_LENGTH);
        assert!(truncate_error(&long).ends_with("..."));
    }
}
