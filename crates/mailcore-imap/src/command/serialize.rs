//! Wire encoding of command requests.

use bytes::Bytes;

use crate::{Error, Result};

/// One argument of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Written exactly as given.
    Raw(String),
    /// Written as an atom, quoted when it contains special characters, or
    /// as a literal when quoting cannot carry it.
    Astring(String),
    /// Sent as a synchronizing literal.
    Literal(Bytes),
}

/// Piece of an encoded command as it goes to the wire.
///
/// A `Line` ending in a literal marker must be followed by a continuation
/// request from the server before the next `Literal` is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Command text, CRLF included.
    Line(Vec<u8>),
    /// Literal payload.
    Literal(Bytes),
}

/// A command verb with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    verb: String,
    args: Vec<Arg>,
}

impl Request {
    /// Creates a request without arguments.
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            args: Vec::new(),
        }
    }

    /// Appends a raw argument.
    #[must_use]
    pub fn raw(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Raw(arg.into()));
        self
    }

    /// Appends an astring argument.
    #[must_use]
    pub fn astring(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Astring(arg.into()));
        self
    }

    /// Appends a literal argument.
    #[must_use]
    pub fn literal(mut self, data: impl Into<Bytes>) -> Self {
        self.args.push(Arg::Literal(data.into()));
        self
    }

    /// The command verb, e.g. `UID FETCH`.
    #[must_use]
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// The arguments in order.
    #[must_use]
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Encodes the request under `tag`, splitting at literals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a raw argument contains CR, LF
    /// or NUL.
    pub fn encode(&self, tag: &str) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.verb.as_bytes());

        for arg in &self.args {
            buf.push(b' ');
            match arg {
                Arg::Raw(raw) => {
                    if raw.bytes().any(breaks_line) {
                        return Err(Error::InvalidArgument(format!(
                            "{} argument contains a line break: {raw:?}",
                            self.verb
                        )));
                    }
                    buf.extend_from_slice(raw.as_bytes());
                }
                Arg::Astring(s) if needs_literal(s) => {
                    push_literal(&mut frames, &mut buf, Bytes::copy_from_slice(s.as_bytes()));
                }
                Arg::Astring(s) => write_astring(&mut buf, s),
                Arg::Literal(data) => push_literal(&mut frames, &mut buf, data.clone()),
            }
        }

        buf.extend_from_slice(b"\r\n");
        frames.push(Frame::Line(buf));
        Ok(frames)
    }
}

fn push_literal(frames: &mut Vec<Frame>, buf: &mut Vec<u8>, data: Bytes) {
    buf.extend_from_slice(format!("{{{}}}\r\n", data.len()).as_bytes());
    frames.push(Frame::Line(std::mem::take(buf)));
    frames.push(Frame::Literal(data));
}

/// Returns true if `s` cannot go inside a quoted string: CR, LF, NUL or
/// 8-bit bytes.
#[must_use]
pub fn needs_literal(s: &str) -> bool {
    s.bytes().any(|b| breaks_line(b) || !b.is_ascii())
}

const fn breaks_line(b: u8) -> bool {
    matches!(b, b'\r' | b'\n' | 0)
}

/// Writes an astring (atom or quoted string).
///
/// Callers check [`needs_literal`] first; [`Request::encode`] does.
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Returns true if the byte needs quoting.
const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn single_line(request: &Request, tag: &str) -> Vec<u8> {
        let frames = request.encode(tag).unwrap();
        assert_eq!(frames.len(), 1);
        match frames.into_iter().next().unwrap() {
            Frame::Line(line) => line,
            Frame::Literal(_) => panic!("unexpected literal"),
        }
    }

    #[test]
    fn test_astring_quoting() {
        let mut buf = Vec::new();
        write_astring(&mut buf, "user@example.com");
        assert_eq!(buf, b"user@example.com");

        buf.clear();
        write_astring(&mut buf, "pass word");
        assert_eq!(buf, b"\"pass word\"");

        buf.clear();
        write_astring(&mut buf, "");
        assert_eq!(buf, b"\"\"");

        buf.clear();
        write_astring(&mut buf, r#"a"b\c"#);
        assert_eq!(buf, br#""a\"b\\c""#);
    }

    #[test]
    fn test_simple_request() {
        let request = Request::new("CAPABILITY");
        assert_eq!(single_line(&request, "A0001"), b"A0001 CAPABILITY\r\n");
    }

    #[test]
    fn test_mixed_arguments() {
        let request = Request::new("LOGIN").astring("jane").astring("se cret");
        assert_eq!(
            single_line(&request, "A1"),
            b"A1 LOGIN jane \"se cret\"\r\n"
        );

        let request = Request::new("UID FETCH").raw("1:5").raw("(UID FLAGS)");
        assert_eq!(
            single_line(&request, "A2"),
            b"A2 UID FETCH 1:5 (UID FLAGS)\r\n"
        );
    }

    #[test]
    fn test_literal_splits_frames() {
        let request = Request::new("APPEND")
            .raw("INBOX")
            .raw("(\\Seen)")
            .literal(Bytes::from_static(b"hello"));
        let frames = request.encode("A3").unwrap();
        assert_eq!(
            frames,
            vec![
                Frame::Line(b"A3 APPEND INBOX (\\Seen) {5}\r\n".to_vec()),
                Frame::Literal(Bytes::from_static(b"hello")),
                Frame::Line(b"\r\n".to_vec()),
            ]
        );
        assert_eq!(request.verb(), "APPEND");
        assert_eq!(request.args().len(), 3);
    }

    #[test]
    fn test_line_breaks_in_astring_become_literal() {
        let request = Request::new("LOGIN").astring("user").astring("pw\r\nX LOGOUT");
        let frames = request.encode("A1").unwrap();
        assert_eq!(
            frames,
            vec![
                Frame::Line(b"A1 LOGIN user {12}\r\n".to_vec()),
                Frame::Literal(Bytes::from_static(b"pw\r\nX LOGOUT")),
                Frame::Line(b"\r\n".to_vec()),
            ]
        );
    }

    #[test]
    fn test_eight_bit_astring_becomes_literal() {
        assert!(needs_literal("Entw\u{fc}rfe"));
        assert!(needs_literal("a\0b"));
        assert!(!needs_literal("say \"hi\""));
        let frames = Request::new("LOGIN")
            .astring("j\u{f6}rg")
            .astring("secret")
            .encode("A2")
            .unwrap();
        assert_eq!(frames[0], Frame::Line(b"A2 LOGIN {5}\r\n".to_vec()));
        assert_eq!(frames[2], Frame::Line(b" secret\r\n".to_vec()));
    }

    #[test]
    fn test_raw_line_break_rejected() {
        let request = Request::new("SELECT").raw("INBOX\r\nA2 DELETE INBOX");
        assert!(matches!(request.encode("A1"), Err(Error::InvalidArgument(_))));
    }
}
