//! Buffered output sinks with automatic indentation at line starts.

use crate::ast::stmt::FileMode;
use crate::indent::Indentation;

/// Destination metadata for writers bound to a file url. The base stdout
/// writer carries none.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteTarget {
    pub url: String,
    pub mode: FileMode,
    pub charset: String,
}

/// A single-owner text sink. The current indentation prefix is emitted once
/// per line, at the first indent-eligible write after a line start.
#[derive(Debug)]
pub struct Writer {
    buffer: String,
    at_line_start: bool,
    indentation: Indentation,
    target: Option<WriteTarget>,
}

impl Writer {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            at_line_start: true,
            indentation: Indentation::default(),
            target: None,
        }
    }

    pub fn with_target(target: WriteTarget, indentation: Indentation) -> Self {
        Self {
            buffer: String::new(),
            at_line_start: true,
            indentation,
            target: Some(target),
        }
    }

    pub fn target(&self) -> Option<&WriteTarget> {
        self.target.as_ref()
    }

    pub fn at_line_start(&self) -> bool {
        self.at_line_start
    }

    /// Seed the buffer with pre-existing content, bypassing indentation.
    /// Used by append-mode writers.
    pub fn preload(&mut self, content: &str) {
        self.buffer.push_str(content);
        self.at_line_start = self.buffer.is_empty() || self.buffer.ends_with('\n');
    }

    pub fn write(&mut self, text: &str, apply_indent: bool) {
        if text.is_empty() {
            return;
        }
        if self.at_line_start && apply_indent {
            self.buffer.push_str(&self.indentation.as_string());
        }
        self.buffer.push_str(text);
        self.at_line_start = false;
    }

    /// As `write`, then a newline. An empty `text` at a line start still
    /// emits the indentation prefix when `apply_indent` holds, so trailing
    /// blank indented lines survive.
    pub fn write_line(&mut self, text: &str, apply_indent: bool) {
        if self.at_line_start && apply_indent {
            self.buffer.push_str(&self.indentation.as_string());
        }
        self.buffer.push_str(text);
        self.buffer.push('\n');
        self.at_line_start = true;
    }

    /// A bare newline. `apply_indent_next` decides whether the next
    /// indent-eligible write re-emits the prefix.
    pub fn new_line(&mut self, apply_indent_next: bool) {
        self.buffer.push('\n');
        self.at_line_start = apply_indent_next;
    }

    pub fn content(&self) -> &str {
        &self.buffer
    }

    pub fn into_content(self) -> String {
        self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.at_line_start = true;
    }

    pub fn set_indentation(&mut self, indentation: Indentation) {
        self.indentation = indentation;
    }

    pub fn indentation(&self) -> &Indentation {
        &self.indentation
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indented(level: usize) -> Writer {
        let mut w = Writer::new();
        w.set_indentation(Indentation::new(level, "  "));
        w
    }

    #[test]
    fn indent_emitted_once_per_line() {
        let mut w = indented(2);
        w.write("a", true);
        w.write("b", true);
        w.write("c", true);
        assert_eq!(w.content(), "    abc");
    }

    #[test]
    fn write_line_resets_line_start() {
        let mut w = indented(1);
        w.write_line("first", true);
        w.write("second", true);
        assert_eq!(w.content(), "  first\n  second");
    }

    #[test]
    fn blank_line_keeps_indentation_when_requested() {
        let mut w = indented(1);
        w.write_line("", true);
        assert_eq!(w.content(), "  \n");
    }

    #[test]
    fn new_line_without_indent_suppresses_prefix() {
        let mut w = indented(1);
        w.write("x", true);
        w.new_line(false);
        w.write("y", true);
        assert_eq!(w.content(), "  x\ny");
    }

    #[test]
    fn empty_write_is_a_no_op() {
        let mut w = indented(3);
        w.write("", true);
        assert_eq!(w.content(), "");
        assert!(w.at_line_start());
    }

    #[test]
    fn write_without_indent_skips_prefix() {
        let mut w = indented(2);
        w.write("raw", false);
        assert_eq!(w.content(), "raw");
    }

    #[test]
    fn preload_tracks_trailing_newline() {
        let mut w = indented(0);
        w.preload("existing\n");
        assert!(w.at_line_start());
        w.preload("partial");
        assert!(!w.at_line_start());
    }

    #[test]
    fn clear_resets_state() {
        let mut w = indented(1);
        w.write("something", true);
        w.clear();
        assert_eq!(w.content(), "");
        assert!(w.at_line_start());
    }
}
