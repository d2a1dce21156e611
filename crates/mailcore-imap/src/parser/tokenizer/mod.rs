//! Tokenizer for IMAP response lines.
//!
//! The transport strips literal data out of the byte stream while reading and
//! leaves the `{n}` markers in the line. The tokenizer walks the line and, on
//! each marker, takes the next buffer from the literal queue and checks its
//! length against the declared size.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::{Error, Result};

mod token;

pub use token::Token;

/// Lazy tokenizer over one response line.
///
/// Yields top-level tokens; lists are returned whole. After the first error
/// the iterator is exhausted.
pub struct ResponseTokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    literals: VecDeque<Bytes>,
    finished: bool,
}

impl<'a> ResponseTokenizer<'a> {
    /// Creates a tokenizer for `input` with its literal buffers in wire order.
    pub fn new(input: &'a [u8], literals: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            input,
            pos: 0,
            literals: literals.into_iter().collect(),
            finished: false,
        }
    }

    /// Returns the current byte position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(self.pos, message)
    }

    /// Reads the next token, or `None` at the end of the line.
    ///
    /// `in_list` makes `)` terminate instead of being an error.
    fn read_token(&mut self, in_list: bool) -> Result<Option<Token>> {
        self.skip_spaces();
        match self.peek() {
            None => Ok(None),
            Some(b')') if in_list => Ok(None),
            Some(b')') => Err(self.error("Unexpected ')'")),
            Some(b'"') => self.read_quoted().map(Some),
            Some(b'(') => self.read_list().map(Some),
            Some(_) => self.read_atom().map(Some),
        }
    }

    fn read_quoted(&mut self) -> Result<Token> {
        self.pos += 1;
        let mut value = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("Unterminated quoted string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Token::Quoted(Bytes::from(value)));
                }
                Some(b'\\') if matches!(self.input.get(self.pos + 1), Some(b'"' | b'\\')) => {
                    value.push(self.input[self.pos + 1]);
                    self.pos += 2;
                }
                Some(b) => {
                    value.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    fn read_list(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            if let Some(token) = self.read_token(true)? {
                items.push(token);
                continue;
            }
            if self.peek() == Some(b')') {
                self.pos += 1;
                return Ok(Token::List(items));
            }
            return Err(Error::parse(start, "Unterminated list"));
        }
    }

    fn read_atom(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'[' => depth += 1,
                b']' if depth > 0 => depth -= 1,
                b' ' | b')' if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }
        if depth > 0 {
            return Err(Error::parse(start, "Unresolved '[' in atom"));
        }

        let raw = &self.input[start..self.pos];
        if raw.len() > 2 && raw[0] == b'{' && raw[raw.len() - 1] == b'}' {
            return self.take_literal(start, &raw[1..raw.len() - 1]).map(Token::Literal);
        }
        if raw.is_empty() || raw.eq_ignore_ascii_case(b"NIL") {
            return Ok(Token::Nil);
        }
        if raw.iter().all(u8::is_ascii_digit) {
            if let Some(n) = std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
                return Ok(Token::Number(n));
            }
        }
        Ok(Token::Atom(Bytes::copy_from_slice(raw)))
    }

    fn take_literal(&mut self, start: usize, spec: &[u8]) -> Result<Bytes> {
        let digits = spec.strip_suffix(b"+").unwrap_or(spec);
        let declared: usize = std::str::from_utf8(digits)
            .ok()
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::parse(start, "Invalid literal size"))?;
        let Some(buffer) = self.literals.pop_front() else {
            return Err(Error::parse(start, "Literal marker without literal data"));
        };
        if buffer.len() != declared {
            return Err(Error::parse(
                start,
                format!(
                    "Literal declared {declared} bytes but {} were read",
                    buffer.len()
                ),
            ));
        }
        Ok(buffer)
    }
}

impl Iterator for ResponseTokenizer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = match self.read_token(false) {
            Ok(Some(token)) => return Some(Ok(token)),
            Ok(None) if self.literals.is_empty() => Ok(()),
            Ok(None) => Err(self.error(format!(
                "{} literal buffers left over at end of line",
                self.literals.len()
            ))),
            Err(e) => Err(e),
        };
        self.finished = true;
        result.err().map(Err)
    }
}

/// Tokenizes a whole line.
pub fn tokenize(input: &[u8], literals: impl IntoIterator<Item = Bytes>) -> Result<Vec<Token>> {
    ResponseTokenizer::new(input, literals).collect()
}
