//! Blocking [`Transport`] over a byte stream, and connectors that open one.

use std::io::{self, Read, Write};
use std::iter::Peekable;

use bytes::Bytes;
use tracing::{debug, warn};

use super::framed::{FramedStream, RawResponse};
use super::stream::{ImapStream, connect_plain, connect_tls};
use super::transport::{Completion, Status, Transport};
use super::{Config, Security};
use crate::command::{Capability, Command, Frame, Request, TagGenerator, check_response};
use crate::parser::{UntaggedResponses, split_untagged};
use crate::types::Capabilities;
use crate::{Error, Result};

/// What a single server response turned out to be.
enum Incoming {
    Continuation,
    Untagged,
    Tagged(Completion),
}

/// IMAP connection speaking the wire protocol over `S`.
///
/// Runs one command at a time; untagged responses are recorded until the
/// caller drains them.
pub struct StreamTransport<S> {
    framed: FramedStream<S>,
    tags: TagGenerator,
    untagged: UntaggedResponses,
    capabilities: Capabilities,
    host: String,
    port: u16,
    logging_out: bool,
    closed: bool,
}

// Manual Debug implementation since FramedStream doesn't implement Debug
impl<S> std::fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tags", &self.tags)
            .field("capabilities", &self.capabilities)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S> StreamTransport<S>
where
    S: Read + Write,
{
    /// Reads the server greeting and learns the initial capabilities.
    ///
    /// Capabilities come from a `[CAPABILITY ...]` greeting code, or from an
    /// explicit CAPABILITY command when the greeting carries none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bye`] when the server refuses the connection, and
    /// I/O or parse errors for a broken greeting.
    pub fn new(stream: S, host: impl Into<String>, port: u16, tag_prefix: &str) -> Result<Self> {
        let mut transport = Self {
            framed: FramedStream::new(stream),
            tags: TagGenerator::new(tag_prefix),
            untagged: UntaggedResponses::new(),
            capabilities: Capabilities::new(),
            host: host.into(),
            port,
            logging_out: false,
            closed: false,
        };
        transport.read_greeting()?;
        if transport.capabilities.is_empty() {
            let caps = Capability.run(&mut transport)?;
            transport.capabilities.extend_from(&caps);
        }
        debug!(
            host = %transport.host,
            capabilities = transport.capabilities.len(),
            "connected"
        );
        Ok(transport)
    }

    fn read_greeting(&mut self) -> Result<()> {
        let response = self.framed.read_response()?;
        let body = response
            .data
            .strip_prefix(b"* ")
            .ok_or_else(|| Error::parse(0, "greeting is not an untagged response"))?;
        let split = split_untagged(body).ok_or_else(|| Error::parse(2, "empty greeting"))?;

        match split.name.as_str() {
            "BYE" => return Err(Error::Bye(text_of(&split.data))),
            "OK" | "PREAUTH" => {}
            other => {
                return Err(Error::parse(2, format!("unexpected greeting {other}")));
            }
        }

        if let Some((code, data)) = split.code
            && code == "CAPABILITY"
        {
            self.capabilities
                .merge(String::from_utf8_lossy(&data).split_whitespace());
        }
        Ok(())
    }

    /// Writes the request frames, waiting for a continuation before each
    /// literal.
    ///
    /// Returns early with the tagged completion if the server rejects the
    /// command instead of asking for the literal.
    fn write_request(&mut self, tag: &str, frames: Vec<Frame>) -> Result<Option<Completion>> {
        let mut frames: Peekable<_> = frames.into_iter().peekable();
        while let Some(frame) = frames.next() {
            match frame {
                Frame::Line(line) => {
                    self.framed.write_all(&line)?;
                    if matches!(frames.peek(), Some(Frame::Literal(_)))
                        && let Some(completion) = self.wait_for_continuation(tag)?
                    {
                        return Ok(Some(completion));
                    }
                }
                Frame::Literal(data) => self.framed.write_all(&data)?,
            }
        }
        Ok(None)
    }

    fn wait_for_continuation(&mut self, tag: &str) -> Result<Option<Completion>> {
        loop {
            let response = self.framed.read_response()?;
            match self.classify(response, tag)? {
                Incoming::Continuation => return Ok(None),
                Incoming::Untagged => {}
                Incoming::Tagged(completion) => return Ok(Some(completion)),
            }
        }
    }

    fn read_completion(&mut self, tag: &str) -> Result<Completion> {
        loop {
            let response = self.framed.read_response()?;
            match self.classify(response, tag)? {
                Incoming::Tagged(completion) => return Ok(completion),
                Incoming::Untagged => {}
                Incoming::Continuation => {
                    warn!(tag, "unexpected continuation request");
                }
            }
        }
    }

    fn classify(&mut self, response: RawResponse, tag: &str) -> Result<Incoming> {
        let RawResponse { data, literals } = response;

        if data.first() == Some(&b'+') {
            return Ok(Incoming::Continuation);
        }

        if let Some(body) = data.strip_prefix(b"* ") {
            if !self.logging_out
                && let Some(split) = split_untagged(body)
                && split.name == "BYE"
            {
                self.closed = true;
                return Err(Error::Bye(text_of(&split.data)));
            }
            self.untagged.record(body, literals);
            return Ok(Incoming::Untagged);
        }

        parse_tagged(&data, tag).map(Incoming::Tagged)
    }

    /// Marks the connection unusable after a failed exchange.
    ///
    /// Framing errors leave the stream at an unknown position, so they are
    /// reported as `InvalidData` I/O errors.
    fn abandon(&mut self, err: Error) -> Error {
        self.closed = true;
        match err {
            Error::Parse { .. } => {
                warn!(host = %self.host, error = %err, "response stream out of sync");
                Error::Io(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
            }
            other => other,
        }
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.framed.get_ref()
    }
}

impl StreamTransport<ImapStream> {
    /// Upgrades the connection with STARTTLS and refreshes capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the server refuses STARTTLS, and TLS
    /// or I/O errors from the upgrade.
    pub fn start_tls(mut self) -> Result<Self> {
        let completion = self.send(&Request::new("STARTTLS"))?;
        check_response(&completion, "STARTTLS failed.")?;
        self.untagged.drain();

        let stream = self.framed.into_inner().upgrade_to_tls(&self.host)?;
        let mut transport = Self {
            framed: FramedStream::new(stream),
            tags: self.tags,
            untagged: UntaggedResponses::new(),
            capabilities: Capabilities::new(),
            host: self.host,
            port: self.port,
            logging_out: false,
            closed: false,
        };
        let caps = Capability.run(&mut transport)?;
        transport.capabilities.extend_from(&caps);
        Ok(transport)
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: Read + Write,
{
    fn send(&mut self, request: &Request) -> Result<Completion> {
        if self.closed {
            return Err(Error::IllegalState("Connection was closed".to_string()));
        }

        let tag = self.tags.next_tag();
        let frames = request.encode(&tag)?;
        debug!(tag = %tag, verb = request.verb(), "sending command");

        let exchange = match self.write_request(&tag, frames) {
            Ok(Some(completion)) => Ok(completion),
            Ok(None) => self.read_completion(&tag),
            Err(err) => Err(err),
        };
        let completion = exchange.map_err(|err| self.abandon(err))?;
        debug!(tag = %tag, status = ?completion.status, "command completed");
        Ok(completion)
    }

    fn untagged(&mut self) -> &mut UntaggedResponses {
        &mut self.untagged
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.logging_out = true;
        let result = self.send(&Request::new("LOGOUT"));
        self.closed = true;
        self.untagged.drain();
        result.map(|_| ())
    }
}

/// Parses `tag status text`.
fn parse_tagged(data: &[u8], expected: &str) -> Result<Completion> {
    let line = String::from_utf8_lossy(data);
    let mut parts = line.splitn(3, ' ');
    let tag = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();
    let text = parts.next().unwrap_or_default().trim().to_string();

    if tag != expected {
        return Err(Error::parse(
            0,
            format!("unexpected tag {tag:?}, expected {expected:?}"),
        ));
    }
    let status = Status::from_atom(status.as_bytes())
        .ok_or_else(|| Error::parse(tag.len() + 1, format!("unknown status {status:?}")))?;

    Ok(Completion {
        tag: tag.to_string(),
        status,
        text,
    })
}

fn text_of(data: &Bytes) -> String {
    String::from_utf8_lossy(data).trim().to_string()
}

/// Opens transports to a given endpoint.
///
/// The session reconnects through a connector when a login referral points
/// it at another server.
pub trait Connector {
    /// Transport produced by this connector.
    type Transport: Transport;

    /// Connects to `host:port` and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns connection, TLS and greeting errors.
    fn connect(&self, host: &str, port: u16) -> Result<Self::Transport>;
}

/// Connector over TCP, with TLS according to [`Config::security`].
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: Config,
}

impl TcpConnector {
    /// Creates a connector using `config` for security, timeouts and tags.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Configuration used for new connections.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}

impl Connector for TcpConnector {
    type Transport = StreamTransport<ImapStream>;

    fn connect(&self, host: &str, port: u16) -> Result<Self::Transport> {
        let config = self.config.with_endpoint(host, port);
        match config.security {
            Security::Implicit => {
                StreamTransport::new(connect_tls(&config)?, host, port, &config.tag_prefix)
            }
            Security::None => {
                StreamTransport::new(connect_plain(&config)?, host, port, &config.tag_prefix)
            }
            Security::StartTls => {
                StreamTransport::new(connect_plain(&config)?, host, port, &config.tag_prefix)?
                    .start_tls()
            }
        }
    }
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
    use std::io::{self, Cursor};

    use super::*;
    use crate::ResponseCode;

    struct MockStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl MockStream {
        fn new(input: &str) -> Self {
            Self {
                input: Cursor::new(input.as_bytes().to_vec()),
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

    fn written(transport: &StreamTransport<MockStream>) -> String {
        String::from_utf8_lossy(&transport.get_ref().output).into_owned()
    }

    #[test]
    fn test_greeting_capability_code() {
        let transport = StreamTransport::new(
            MockStream::new("* OK [CAPABILITY IMAP4rev1 ID] ready\r\n"),
            "localhost",
            143,
            "A",
        )
        .unwrap();
        assert!(transport.capabilities().supports("ID"));
        assert!(transport.capabilities().supports("FETCH"));
        assert!(written(&transport).is_empty());
    }

    #[test]
    fn test_greeting_without_capabilities_asks() {
        let transport = StreamTransport::new(
            MockStream::new(
                "* OK ready\r\n* CAPABILITY IMAP4rev1 NAMESPACE\r\nA0000 OK done\r\n",
            ),
            "localhost",
            143,
            "A",
        )
        .unwrap();
        assert_eq!(written(&transport), "A0000 CAPABILITY\r\n");
        assert!(transport.capabilities().supports("NAMESPACE"));
    }

    #[test]
    fn test_bye_greeting() {
        let err = StreamTransport::new(
            MockStream::new("* BYE too many connections\r\n"),
            "localhost",
            143,
            "A",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Bye(text) if text == "too many connections"));
    }

    #[test]
    fn test_send_collects_untagged() {
        let mut transport = StreamTransport::new(
            MockStream::new(
                "* OK [CAPABILITY IMAP4rev1] hi\r\n* 3 EXISTS\r\n* 1 FETCH (BODY[] {3}\r\nabc)\r\nX0000 OK done\r\n",
            ),
            "localhost",
            143,
            "X",
        )
        .unwrap();
        let completion = transport.send(&Request::new("NOOP")).unwrap();
        assert_eq!(completion.status, Status::Ok);
        assert_eq!(completion.text, "done");
        assert!(transport.untagged().contains("EXISTS"));
        let fetch = transport.untagged().take("FETCH");
        assert_eq!(fetch[0].literals, vec![Bytes::from_static(b"abc")]);
    }

    #[test]
    fn test_literal_waits_for_continuation() {
        let mut transport = StreamTransport::new(
            MockStream::new(
                "* OK [CAPABILITY IMAP4rev1] hi\r\n+ go ahead\r\nA0000 OK [APPENDUID 1 9] done\r\n",
            ),
            "localhost",
            143,
            "A",
        )
        .unwrap();
        let request = Request::new("APPEND").astring("INBOX").literal(&b"hello"[..]);
        let completion = transport.send(&request).unwrap();
        assert_eq!(completion.text, "[APPENDUID 1 9] done");
        assert_eq!(written(&transport), "A0000 APPEND INBOX {5}\r\nhello\r\n");
    }

    #[test]
    fn test_rejected_literal_skips_payload() {
        let mut transport = StreamTransport::new(
            MockStream::new(
                "* OK [CAPABILITY IMAP4rev1] hi\r\nA0000 NO [TRYCREATE] no mailbox\r\n",
            ),
            "localhost",
            143,
            "A",
        )
        .unwrap();
        let request = Request::new("APPEND").astring("Missing").literal(&b"hello"[..]);
        let completion = transport.send(&request).unwrap();
        assert_eq!(completion.status, Status::No);
        let err = check_response(&completion, "Append failed.").unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseCode::TryCreate));
        assert!(!written(&transport).contains("hello"));
    }

    #[test]
    fn test_untagged_bye_is_fatal() {
        let mut transport = StreamTransport::new(
            MockStream::new("* OK [CAPABILITY IMAP4rev1] hi\r\n* BYE idle timeout\r\n"),
            "localhost",
            143,
            "A",
        )
        .unwrap();
        let err = transport.send(&Request::new("NOOP")).unwrap_err();
        assert!(matches!(err, Error::Bye(_)));
        let err = transport.send(&Request::new("NOOP")).unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn test_shutdown_logs_out_once() {
        let mut transport = StreamTransport::new(
            MockStream::new(
                "* OK [CAPABILITY IMAP4rev1] hi\r\n* BYE logging out\r\nA0000 OK bye\r\n",
            ),
            "localhost",
            143,
            "A",
        )
        .unwrap();
        transport.shutdown().unwrap();
        transport.shutdown().unwrap();
        assert_eq!(written(&transport), "A0000 LOGOUT\r\n");
    }

    #[test]
    fn test_tag_mismatch() {
        let mut transport = StreamTransport::new(
            MockStream::new("* OK [CAPABILITY IMAP4rev1] hi\r\nB0007 OK what\r\n"),
            "localhost",
            143,
            "A",
        )
        .unwrap();
        let err = transport.send(&Request::new("NOOP")).unwrap_err();
        assert!(matches!(&err, Error::Io(e) if e.kind() == io::ErrorKind::InvalidData));
        assert!(err.is_fatal());
        let err = transport.send(&Request::new("NOOP")).unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn test_rejected_argument_keeps_transport_open() {
        let mut transport = StreamTransport::new(
            MockStream::new("* OK [CAPABILITY IMAP4rev1] hi\r\nA0001 OK done\r\n"),
            "localhost",
            143,
            "A",
        )
        .unwrap();
        let err = transport
            .send(&Request::new("SELECT").raw("INBOX\r\nA9 LOGOUT"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(written(&transport).is_empty());
        transport.send(&Request::new("NOOP")).unwrap();
        assert_eq!(written(&transport), "A0001 NOOP\r\n");
    }

    #[test]
    fn test_oversized_line_closes_transport() {
        let mut input = "* OK [CAPABILITY IMAP4rev1] hi\r\n* ".to_string();
        input.push_str(&"x".repeat(1024 * 1024 + 16));
        input.push_str("\r\nA0000 OK done\r\n");
        let mut transport = StreamTransport::new(MockStream::new(&input), "localhost", 143, "A")
            .unwrap();
        let err = transport.send(&Request::new("NOOP")).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("line too long"));
        assert!(transport.closed);
    }

    #[test]
    fn test_parse_tagged() {
        let completion = parse_tagged(b"A0001 NO [NOPERM] denied", "A0001").unwrap();
        assert_eq!(completion.status, Status::No);
        assert_eq!(completion.text, "[NOPERM] denied");
        assert!(parse_tagged(b"A0001 MAYBE x", "A0001").is_err());
    }
}
