//! Whitespace normalization applied to every piece of extracted text.

/// Normalize extracted text.
///
/// Each line is trimmed, runs of interior whitespace collapse to a single
/// space and empty lines are dropped. The surviving lines are joined with
/// `\n`. Applying it twice gives the same result as applying it once.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split(is_line_break) {
        let mut words = line.split_whitespace();
        let Some(first) = words.next() else {
            continue;
        };
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(first);
        for word in words {
            out.push(' ');
            out.push_str(word);
        }
    }
    out
}

/// Number of characters in the normalized form of `text`.
pub fn normalized_len(text: &str) -> usize {
    normalize(text).chars().count()
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{0b}' | '\u{0c}' | '\u{1c}' | '\u{1d}' | '\u{1e}' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_and_drops_blank_lines() {
        let raw = "  Invoice   No.\t42  \n\n   \r\nTotal:    1,200.00\n";
        assert_eq!(normalize(raw), "Invoice No. 42\nTotal: 1,200.00");
    }

    #[test]
    fn empty_and_blank_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t\n  "), "");
    }

    #[test]
    fn idempotent() {
        let samples = [
            "a  b\n\n c ",
            "\u{2028}line\u{00a0}one\u{2029}line two\r\n",
            "=== Page 1 ===\n[Text]\nHello   world\n",
            "x",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn no_edge_or_repeated_whitespace() {
        let out = normalize("  a \t b  \n   \n c\u{3000}\u{3000}d ");
        for line in out.lines() {
            assert!(!line.is_empty());
            assert_eq!(line, line.trim());
            assert!(!line.contains("  "));
        }
        assert_eq!(out, "a b\nc d");
    }

    #[test]
    fn normalized_len_counts_chars() {
        assert_eq!(normalized_len("  café  \n"), 4);
    }
}
