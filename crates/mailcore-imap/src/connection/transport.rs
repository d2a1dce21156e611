//! The send/receive contract between commands and the connection.

use crate::Result;
use crate::command::Request;
use crate::parser::UntaggedResponses;
use crate::types::Capabilities;

/// Status of a tagged completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command succeeded.
    Ok,
    /// Command failed.
    No,
    /// Command was rejected as invalid.
    Bad,
}

impl Status {
    /// Parses `OK`, `NO` or `BAD`, ignoring case.
    #[must_use]
    pub fn from_atom(atom: &[u8]) -> Option<Self> {
        if atom.eq_ignore_ascii_case(b"OK") {
            Some(Self::Ok)
        } else if atom.eq_ignore_ascii_case(b"NO") {
            Some(Self::No)
        } else if atom.eq_ignore_ascii_case(b"BAD") {
            Some(Self::Bad)
        } else {
            None
        }
    }
}

/// The tagged line that completed a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Tag the command was sent with.
    pub tag: String,
    /// Completion status.
    pub status: Status,
    /// Text after the status, response code included.
    pub text: String,
}

/// A connection that runs one command at a time.
///
/// Untagged responses received while a command runs are recorded in
/// [`Transport::untagged`] for the command to consume; whatever it leaves
/// behind is drained by the session.
pub trait Transport {
    /// Sends a request and blocks until its tagged completion arrives.
    ///
    /// # Errors
    ///
    /// Returns I/O and TLS errors, [`crate::Error::Bye`] when the server
    /// disconnects, and parse errors for malformed responses.
    fn send(&mut self, request: &Request) -> Result<Completion>;

    /// Untagged responses collected so far.
    fn untagged(&mut self) -> &mut UntaggedResponses;

    /// Capabilities announced before login.
    fn capabilities(&self) -> &Capabilities;

    /// Host the transport is connected to.
    fn host(&self) -> &str;

    /// Port the transport is connected to.
    fn port(&self) -> u16;

    /// Logs out and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from the logout exchange.
    fn shutdown(&mut self) -> Result<()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_atom() {
        assert_eq!(Status::from_atom(b"OK"), Some(Status::Ok));
        assert_eq!(Status::from_atom(b"no"), Some(Status::No));
        assert_eq!(Status::from_atom(b"Bad"), Some(Status::Bad));
        assert_eq!(Status::from_atom(b"PREAUTH"), None);
    }
}
