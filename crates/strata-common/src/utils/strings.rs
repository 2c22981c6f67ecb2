//! Indentation-aware text buffer used for SQL generation.

use std::fmt;

const INDENT_SIZE: usize = 4;

/// A string builder that prefixes each new line with the current indent.
///
/// Indentation is written lazily when the first fragment of a line is
/// appended, so empty lines carry no trailing whitespace.
#[derive(Debug, Clone)]
pub struct IndentedStringBuilder {
    buffer: String,
    indent: usize,
    indent_pending: bool,
}

impl Default for IndentedStringBuilder {
    fn default() -> Self {
        Self {
            buffer: String::new(),
            indent: 0,
            indent_pending: true,
        }
    }
}

impl IndentedStringBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment to the current line.
    pub fn append(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if text.is_empty() {
            return self;
        }
        self.write_pending_indent();
        self.buffer.push_str(text);
        self
    }

    /// Appends a fragment and terminates the line.
    pub fn append_line(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.append(text);
        self.buffer.push('\n');
        self.indent_pending = true;
        self
    }

    /// Appends multi-line text, indenting every line.
    pub fn append_lines(&mut self, text: impl AsRef<str>) -> &mut Self {
        for line in text.as_ref().lines() {
            self.append_line(line);
        }
        self
    }

    /// Increases the indent for subsequent lines.
    pub fn increment_indent(&mut self) -> &mut Self {
        self.indent += 1;
        self
    }

    /// Decreases the indent for subsequent lines.
    pub fn decrement_indent(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self
    }

    /// Returns the current indent level.
    #[must_use]
    pub fn indent_level(&self) -> usize {
        self.indent
    }

    /// Returns the number of bytes written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the text written so far.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Clears the buffer and resets indentation.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.indent = 0;
        self.indent_pending = true;
    }

    /// Consumes the builder, returning the text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.buffer
    }

    fn write_pending_indent(&mut self) {
        if self.indent_pending {
            for _ in 0..self.indent * INDENT_SIZE {
                self.buffer.push(' ');
            }
            self.indent_pending = false;
        }
    }
}

impl fmt::Display for IndentedStringBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buffer)
    }
}
