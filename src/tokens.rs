//! DSL tokenizer.
//!
//! A single-pass byte FSM with three states (`Start`, `Name`, `Str`). Every
//! token carries its djb2 hash (computed while scanning) and its literal
//! text. Newlines are significant and come out as tokens of their own;
//! `#` comments are discarded up to and including the end of the line;
//! `\r`/`\r\n` fold into `\n`. Any byte outside printable ASCII plus
//! whitespace is an illegal-character error.

use crate::diag::{Abort, Diagnostics, Step};
use crate::hash::StrHash;

/// Hash of the newline token.
pub(crate) const NEWLINE: StrHash = StrHash::of("\n");

/// One scanned token: hash plus literal text.
///
/// String tokens keep their surrounding quotes; a newline is the literal
/// `"\n"` regardless of the source line ending.
#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub hash: StrHash,
    pub text: String,
}

impl Token {
    /// First byte of the literal, `0` when empty.
    #[inline]
    pub fn first_byte(&self) -> u8 {
        self.text.as_bytes().first().copied().unwrap_or(0)
    }

    /// True if the literal starts a name (`[A-Za-z0-9_]`).
    #[inline]
    pub fn is_name(&self) -> bool {
        is_name_byte(self.first_byte())
    }

    /// True if the literal is a quoted string.
    #[inline]
    pub fn is_string(&self) -> bool {
        self.first_byte() == b'"'
    }

    /// String content without the surrounding quotes.
    pub fn string_content(&self) -> &str {
        let inner = self.text.strip_prefix('"').unwrap_or(&self.text);
        inner.strip_suffix('"').unwrap_or(inner)
    }
}

#[inline]
pub(crate) fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Tokenizer over an in-memory source.
pub(crate) struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
}

enum State {
    Start,
    Name,
    Str,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Tokenizer { input, pos: 0 }
    }

    /// True if the next byte belongs to the current run: neither whitespace,
    /// newline nor end of input. Used to scan binding expressions whose
    /// sub-tokens must be contiguous (`~a2+`, `b0|b1`).
    pub fn is_next_stuck(&self) -> bool {
        match self.input.get(self.pos) {
            Some(&b) => !matches!(b, b' ' | b'\t' | b'\r' | b'\n'),
            None => false,
        }
    }

    /// Scan the next token. `Ok(None)` at end of input.
    pub fn next_token(&mut self, diag: &mut Diagnostics) -> Step<Option<Token>> {
        let mut state = State::Start;
        let mut hash = StrHash::EMPTY;
        let mut text = Vec::new();

        fn emit(hash: StrHash, text: Vec<u8>) -> Option<Token> {
            Some(Token {
                hash,
                text: String::from_utf8_lossy(&text).into_owned(),
            })
        }

        loop {
            match state {
                State::Start => {
                    let Some(&byte) = self.input.get(self.pos) else {
                        return Ok(None);
                    };
                    self.pos += 1;
                    match byte {
                        b'#' => {
                            while let Some(&b) = self.input.get(self.pos) {
                                self.pos += 1;
                                if b == b'\n' {
                                    break;
                                }
                            }
                            return Ok(Some(self.newline_token(diag)));
                        }
                        b' ' | b'\t' => {}
                        b'\r' => {
                            if self.input.get(self.pos) == Some(&b'\n') {
                                self.pos += 1;
                            }
                            return Ok(Some(self.newline_token(diag)));
                        }
                        b'\n' => return Ok(Some(self.newline_token(diag))),
                        b'"' => {
                            state = State::Str;
                            hash = hash.push(byte);
                            text.push(byte);
                        }
                        b if is_name_byte(b) => {
                            state = State::Name;
                            hash = hash.push(b);
                            text.push(b);
                        }
                        0x20..=0x7E => {
                            hash = hash.push(byte);
                            text.push(byte);
                            return Ok(emit(hash, text));
                        }
                        _ => {
                            diag.illegal_character(byte);
                            return Err(Abort);
                        }
                    }
                }
                State::Name => match self.input.get(self.pos) {
                    Some(&b) if is_name_byte(b) => {
                        self.pos += 1;
                        hash = hash.push(b);
                        text.push(b);
                    }
                    _ => return Ok(emit(hash, text)),
                },
                State::Str => {
                    let Some(&byte) = self.input.get(self.pos) else {
                        // Unterminated string at end of input; the parser
                        // rejects it at the grammar level.
                        return Ok(emit(hash, text));
                    };
                    self.pos += 1;
                    // Strings pass multi-byte UTF-8 through (icon glyphs);
                    // only control characters are illegal.
                    if byte < 0x20 || byte == 0x7F {
                        diag.illegal_character(byte);
                        return Err(Abort);
                    }
                    hash = hash.push(byte);
                    text.push(byte);
                    if byte == b'"' {
                        return Ok(emit(hash, text));
                    }
                }
            }
        }
    }

    fn newline_token(&self, diag: &mut Diagnostics) -> Token {
        diag.bump_line();
        Token {
            hash: NEWLINE,
            text: "\n".to_owned(),
        }
    }
}
