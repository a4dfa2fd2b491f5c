//! Comment-aware line scanning.
//!
//! A comment marker only starts a comment when it is preceded by an even
//! number (0, 2, 4, ...) of consecutive escape characters. An odd count means
//! the marker itself is escaped and the line continues past it.

/// Escape character shared by LaTeX and Typst sources.
pub const ESCAPE_CHAR: char = '\\';

/// Truncates `line` at the first unescaped occurrence of `marker`.
///
/// # Examples
///
/// ```
/// use corpus_lab_coverage::scan::strip_line_comment;
///
/// assert_eq!(strip_line_comment("a%b", "%", '\\'), "a");
/// assert_eq!(strip_line_comment(r"a\%b", "%", '\\'), r"a\%b");
/// assert_eq!(strip_line_comment(r"a\\%b", "%", '\\'), r"a\\");
/// ```
pub fn strip_line_comment<'a>(line: &'a str, marker: &str, escape: char) -> &'a str {
    let Some(step) = marker.chars().next().map(char::len_utf8) else {
        return line;
    };

    let mut search_from = 0;
    while let Some(offset) = line[search_from..].find(marker) {
        let pos = search_from + offset;
        let escapes = line[..pos]
            .chars()
            .rev()
            .take_while(|&ch| ch == escape)
            .count();
        if escapes % 2 == 0 {
            return &line[..pos];
        }
        search_from = pos + step;
    }
    line
}

/// Strips line comments from every line of `text`.
///
/// Line terminators are normalized to `\n`.
pub fn strip_comments(text: &str, marker: &str, escape: char) -> String {
    let mut out = String::with_capacity(text.len());
    for (idx, line) in text.lines().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        out.push_str(strip_line_comment(line, marker, escape));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescaped_marker_truncates() {
        assert_eq!(strip_line_comment("a%b", "%", ESCAPE_CHAR), "a");
        assert_eq!(strip_line_comment("% whole line", "%", ESCAPE_CHAR), "");
        assert_eq!(strip_line_comment("no comment", "%", ESCAPE_CHAR), "no comment");
    }

    #[test]
    fn test_odd_escape_count_keeps_marker() {
        assert_eq!(strip_line_comment(r"a\%b", "%", ESCAPE_CHAR), r"a\%b");
        assert_eq!(strip_line_comment(r"50\\\% off", "%", ESCAPE_CHAR), r"50\\\% off");
    }

    #[test]
    fn test_even_escape_count_truncates() {
        assert_eq!(strip_line_comment(r"line\\%comment", "%", ESCAPE_CHAR), r"line\\");
        assert_eq!(strip_line_comment(r"x\\\\%y", "%", ESCAPE_CHAR), r"x\\\\");
    }

    #[test]
    fn test_escaped_marker_then_real_comment() {
        assert_eq!(
            strip_line_comment(r"10\% growth % note", "%", ESCAPE_CHAR),
            r"10\% growth "
        );
    }

    #[test]
    fn test_multi_char_marker() {
        assert_eq!(strip_line_comment("#set page() // a4", "//", ESCAPE_CHAR), "#set page() ");
        assert_eq!(strip_line_comment(r"a \// b", "//", ESCAPE_CHAR), r"a \// b");
        // Escaped slash followed by a real comment.
        assert_eq!(strip_line_comment(r"a \/// b", "//", ESCAPE_CHAR), r"a \/");
    }

    #[test]
    fn test_strip_comments_across_lines() {
        let text = "\\documentclass{article} % class\r\n% \\usepackage{hidden}\n\\usepackage{shown}";
        let stripped = strip_comments(text, "%", ESCAPE_CHAR);
        assert_eq!(stripped, "\\documentclass{article} \n\n\\usepackage{shown}");
    }

    #[test]
    fn test_multibyte_text_is_preserved() {
        assert_eq!(strip_line_comment("résumé – ok % ß", "%", ESCAPE_CHAR), "résumé – ok ");
    }
}
