//! Framed I/O for IMAP protocol.
//!
//! IMAP uses CRLF-terminated lines with support for literals.
//! This module provides buffered reading and writing with proper
//! handling of the IMAP framing. Literal payloads are cut out of the line
//! while reading so the tokenizer can consume them out of band.

use std::io::{self, BufRead, BufReader, Read, Write};

use bytes::Bytes;

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// One server response with its literals extracted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResponse {
    /// Line text without CRLF; `{n}` markers stay in place.
    pub data: Vec<u8>,
    /// Literal payloads in wire order.
    pub literals: Vec<Bytes>,
}

/// Framed connection for IMAP protocol.
///
/// Handles line-based reading with literal support and buffered writing.
pub struct FramedStream<S> {
    reader: BufReader<S>,
}

impl<S> FramedStream<S>
where
    S: Read + Write,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
        }
    }

    /// Reads a complete IMAP response, handling literals.
    ///
    /// # Errors
    ///
    /// Returns I/O errors, and a parse error when a line or literal exceeds
    /// the size limits.
    pub fn read_response(&mut self) -> Result<RawResponse> {
        let mut response = RawResponse::default();

        loop {
            let line = self.read_line()?;
            let line = line.strip_suffix(b"\r\n").unwrap_or(&line);
            response.data.extend_from_slice(line);

            let Some(literal_len) = parse_literal_length(line) else {
                break;
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::parse(
                    response.data.len(),
                    format!("literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"),
                ));
            }
            let mut literal = vec![0u8; literal_len];
            self.reader.read_exact(&mut literal)?;
            response.literals.push(Bytes::from(literal));
        }

        Ok(response)
    }

    /// Reads a single CRLF-terminated line.
    fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            if let Some(pos) = find_lf(buf) {
                line.extend_from_slice(&buf[..=pos]);
                self.reader.consume(pos + 1);
                if line.ends_with(b"\r\n") {
                    break;
                }
            } else {
                let len = buf.len();
                line.extend_from_slice(buf);
                self.reader.consume(len);
            }

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::parse(line.len(), "line too long"));
            }
        }

        Ok(line)
    }

    /// Writes and flushes raw bytes.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from the underlying stream.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Note: Any buffered data will be lost.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

fn find_lf(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Parses a literal length from the end of a line without CRLF.
///
/// Matches `{123}` or `{123+}` (non-synchronizing).
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let digits = &inner[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// In-memory duplex stream: reads from a script, records writes.
    struct MockStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl MockStream {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY {123}"), Some(123));
        assert_eq!(parse_literal_length(b"BODY {123+}"), Some(123));
        assert_eq!(parse_literal_length(b"{0}"), Some(0));
        assert_eq!(parse_literal_length(b"no literal"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}"), None);
        assert_eq!(parse_literal_length(b"empty {}"), None);
    }

    #[test]
    fn test_framed_read_simple_line() {
        let mut framed = FramedStream::new(MockStream::new(b"* OK ready\r\n"));
        let response = framed.read_response().unwrap();
        assert_eq!(response.data, b"* OK ready");
        assert!(response.literals.is_empty());
    }

    #[test]
    fn test_framed_read_with_literals() {
        let mut framed = FramedStream::new(MockStream::new(
            b"* 1 FETCH (BODY[1] {5}\r\nhello BODY[2] {7}\r\nwor\r\nld)\r\n* OK next\r\n",
        ));
        let response = framed.read_response().unwrap();
        assert_eq!(response.data, b"* 1 FETCH (BODY[1] {5} BODY[2] {7})");
        assert_eq!(
            response.literals,
            vec![Bytes::from_static(b"hello"), Bytes::from_static(b"wor\r\nld")]
        );
        assert_eq!(framed.read_response().unwrap().data, b"* OK next");
    }

    #[test]
    fn test_bare_lf_inside_line() {
        let mut framed = FramedStream::new(MockStream::new(b"* OK a\nb\r\n"));
        assert_eq!(framed.read_response().unwrap().data, b"* OK a\nb");
    }

    #[test]
    fn test_framed_write() {
        let mut framed = FramedStream::new(MockStream::new(b""));
        framed.write_all(b"A001 LOGIN user pass\r\n").unwrap();
        assert_eq!(framed.get_ref().output, b"A001 LOGIN user pass\r\n");
    }

    #[test]
    fn test_eof_is_io_error() {
        let mut framed = FramedStream::new(MockStream::new(b"* OK trunc"));
        assert!(matches!(framed.read_response(), Err(Error::Io(_))));
    }

    #[test]
    fn test_literal_size_validation() {
        let header = format!("* 1 FETCH (BODY {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mut framed = FramedStream::new(MockStream::new(header.as_bytes()));
        let err = framed.read_response().unwrap_err();
        assert!(err.to_string().contains("literal too large"));
    }

    #[test]
    fn test_short_literal_is_io_error() {
        let mut framed = FramedStream::new(MockStream::new(b"* 1 FETCH (BODY {10}\r\nabc"));
        assert!(matches!(framed.read_response(), Err(Error::Io(_))));
    }

    #[test]
    fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mut framed = FramedStream::new(MockStream::new(long_line.as_bytes()));
        let err = framed.read_response().unwrap_err();
        assert!(err.to_string().contains("line too long"));
    }
}
