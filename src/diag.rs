//! Line-prefixed parse diagnostics.
//!
//! Diagnostics go to an optional sink; a `None` sink is silent. The tokenizer
//! feeds the line counter, so every message comes out as `Line N: …`. Writing
//! never interrupts control flow — the parser aborts through its own return
//! values, and sink I/O errors are ignored.

use std::io::Write;

/// Marker for an aborted parse. The diagnostic was already written to the
/// sink when this is produced; it carries no payload of its own.
pub(crate) struct Abort;

/// Result alias for parse steps.
pub(crate) type Step<T = ()> = Result<T, Abort>;

/// Diagnostics sink with the current source line number.
pub(crate) struct Diagnostics<'a> {
    out: Option<&'a mut dyn Write>,
    line: u32,
}

impl<'a> Diagnostics<'a> {
    pub fn new(out: Option<&'a mut dyn Write>) -> Self {
        Diagnostics { out, line: 1 }
    }

    /// Called by the tokenizer for every newline it consumes.
    pub fn bump_line(&mut self) {
        self.line += 1;
    }

    /// Report a byte outside the printable-ASCII-plus-whitespace range.
    pub fn illegal_character(&mut self, byte: u8) {
        if let Some(out) = self.out.as_mut() {
            let _ = writeln!(out, "Line {}: illegal character {}", self.line, byte);
        }
    }

    /// Report an unexpected token; an empty literal means end of file.
    pub fn unexpected_token(&mut self, literal: &str) {
        if let Some(out) = self.out.as_mut() {
            let _ = if literal.is_empty() {
                writeln!(out, "Line {}: unexpected end of file", self.line)
            } else {
                writeln!(out, "Line {}: unexpected token {}", self.line, literal)
            };
        }
    }

    /// Report any other parse error.
    pub fn error(&mut self, message: &str) {
        if let Some(out) = self.out.as_mut() {
            let _ = writeln!(out, "Line {}: {}", self.line, message);
        }
    }
}
