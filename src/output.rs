//! Output buffering for a single hook run.
//!
//! The buffer keeps the OSC-stripped text exactly as it arrived, SGR sequences
//! included, so the TUI can render colors. Classification works on [`OutputBuffer::plain_text`],
//! which drops every remaining escape sequence.

use strip_ansi_escapes::strip;

/// Append-only text produced by the current run.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    text: String,
    lines: usize,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends already-filtered display text.
    pub fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.lines += text.matches('\n').count();
        self.text.push_str(text);
    }

    /// Empties the buffer. Only called when a new run starts.
    pub fn clear(&mut self) {
        self.text.clear();
        self.lines = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Display text with SGR sequences intact.
    pub fn display_text(&self) -> &str {
        &self.text
    }

    /// Number of display lines, counting an unterminated last line.
    pub fn line_count(&self) -> usize {
        if self.text.is_empty() || self.text.ends_with('\n') {
            self.lines
        } else {
            self.lines + 1
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    /// Text with every escape sequence resolved away. A carriage return overwrites the
    /// line so far, as it does on screen.
    pub fn plain_text(&self) -> String {
        sanitize_text(&overwrite_carriage_returns(self.display_text()))
    }
}

fn overwrite_carriage_returns(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body.strip_suffix('\r').unwrap_or(body), "\n"),
            None => (line, ""),
        };
        out.push_str(body.rsplit('\r').next().unwrap_or(body));
        out.push_str(newline);
    }
    out
}

/// Strips ANSI escape codes. Invalid UTF-8 sequences are replaced.
pub fn sanitize_text(text: &str) -> String {
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_drops_colors() {
        let mut buffer = OutputBuffer::new();
        buffer.append("black....\u{1b}[42mPassed\u{1b}[m\n");
        buffer.append("flake8...\u{1b}[41mFailed\u{1b}[m\n");
        assert_eq!(buffer.plain_text(), "black....Passed\nflake8...Failed\n");
        assert!(buffer.display_text().contains("\u{1b}[41m"));
    }

    #[test]
    fn carriage_returns_keep_the_last_overwrite() {
        let mut buffer = OutputBuffer::new();
        buffer.append("Initializing...\rblack....\u{1b}[41mFailed\u{1b}[m\r\n");
        buffer.append("[INFO] 1/2\r[INFO] 2/2");
        assert_eq!(buffer.plain_text(), "black....Failed\n[INFO] 2/2");
    }

    #[test]
    fn line_count_includes_partial_line() {
        let mut buffer = OutputBuffer::new();
        assert_eq!(buffer.line_count(), 0);
        buffer.append("one\ntw");
        assert_eq!(buffer.line_count(), 2);
        buffer.append("o\n");
        assert_eq!(buffer.line_count(), 2);
        assert_eq!(buffer.lines().collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut buffer = OutputBuffer::new();
        buffer.append("left over\n");
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.line_count(), 0);
        assert_eq!(buffer.plain_text(), "");
    }
}
