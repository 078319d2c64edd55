// ============================================================
// Layer 1 — Pretty Printing
// ============================================================
// Renders a passage with one character span highlighted, for
// showing predicted answers in context.

pub const BOLD:  &str = "\x1b[1m";
pub const GREEN: &str = "\x1b[32m";
pub const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightStyle {
    /// Bold green terminal escape codes
    Ansi,
    /// Plain `[[` ... `]]` markers, for logs and pipes
    Brackets,
}

/// `passage` with characters [start, end) marked. Offsets are
/// clamped to the passage; an empty span leaves it unchanged.
pub fn highlight(passage: &str, start: usize, end: usize, style: HighlightStyle) -> String {
    let len   = passage.chars().count();
    let end   = end.min(len);
    let start = start.min(end);
    if start == end {
        return passage.to_string();
    }

    let (open, close) = match style {
        HighlightStyle::Ansi     => (format!("{BOLD}{GREEN}"), RESET.to_string()),
        HighlightStyle::Brackets => ("[[".to_string(), "]]".to_string()),
    };

    let mut out = String::with_capacity(passage.len() + open.len() + close.len());
    for (i, c) in passage.chars().enumerate() {
        if i == start {
            out.push_str(&open);
        }
        out.push(c);
        if i + 1 == end {
            out.push_str(&close);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brackets_mark_the_span() {
        let out = highlight("Paris is the capital.", 0, 5, HighlightStyle::Brackets);
        assert_eq!(out, "[[Paris]] is the capital.");
    }

    #[test]
    fn test_ansi_wraps_span_in_escapes() {
        let out = highlight("in 1889", 3, 7, HighlightStyle::Ansi);
        assert_eq!(out, format!("in {BOLD}{GREEN}1889{RESET}"));
    }

    #[test]
    fn test_offsets_clamp_and_empty_span_is_noop() {
        assert_eq!(highlight("abc", 1, 99, HighlightStyle::Brackets), "a[[bc]]");
        assert_eq!(highlight("abc", 2, 2, HighlightStyle::Brackets), "abc");
        assert_eq!(highlight("abc", 3, 1, HighlightStyle::Brackets), "abc");
    }

    #[test]
    fn test_multibyte_characters_use_char_offsets() {
        assert_eq!(highlight("café au lait", 0, 4, HighlightStyle::Brackets), "[[café]] au lait");
    }
}
