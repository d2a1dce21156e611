//! Typed IMAP commands.
//!
//! Each command encodes its own arguments and decodes the untagged data
//! its completion left behind. [`check_response`] turns a NO or BAD
//! completion into an [`Error::Protocol`] classified by response code.

mod auth;
mod folder;
mod message;
mod serialize;
mod tag_generator;

pub use auth::{Capability, Id, Login, Namespace, XScalixId};
pub use folder::{Close, Create, Delete, Examine, List, Rename, Select, Unselect};
pub use message::{Append, DeleteMessage, Expunge, Fetch, Search, Store, UpdateMessage};
pub use serialize::{Arg, Frame, Request, needs_literal, write_astring};
pub use tag_generator::TagGenerator;

use crate::connection::{Completion, Status, Transport};
use crate::parser::{UntaggedResponses, bracketed_code, tokenize};
use crate::{Error, ResponseCode, Result};

/// A command that can be run against a [`Transport`].
pub trait Command {
    /// Value produced from a successful completion.
    type Output;

    /// Name used for capability gating, e.g. `FETCH` or `UID`.
    fn name(&self) -> &'static str;

    /// Builds the request to send.
    ///
    /// # Errors
    ///
    /// Returns an error when the command arguments are invalid.
    fn encode(&self) -> Result<Request>;

    /// Turns a successful completion and its untagged data into the output.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed untagged data.
    fn decode(&self, completion: &Completion, untagged: &mut UntaggedResponses)
    -> Result<Self::Output>;

    /// Prefix for error messages.
    fn context(&self) -> String {
        format!("{} failed.", self.name())
    }

    /// Whether a folder must be selected before running.
    fn requires_selection(&self) -> bool {
        false
    }

    /// Sends the command, checks the completion and decodes the output.
    ///
    /// # Errors
    ///
    /// Returns transport errors, [`Error::Protocol`] for NO/BAD completions,
    /// or decode errors.
    fn run<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<Self::Output> {
        let request = self.encode()?;
        let completion = transport.send(&request)?;
        check_response(&completion, &self.context())?;
        self.decode(&completion, transport.untagged())
    }
}

/// Fails unless the completion status is OK.
///
/// The bracketed code at the start of the completion text selects the
/// [`ResponseCode`]; anything outside the known table is
/// [`ResponseCode::Generic`].
///
/// # Errors
///
/// Returns [`Error::Protocol`] for NO and BAD completions.
pub fn check_response(completion: &Completion, context: &str) -> Result<()> {
    if completion.status == Status::Ok {
        return Ok(());
    }
    let code = bracketed_code(completion.text.as_bytes())
        .map_or(ResponseCode::Generic, |(name, _)| ResponseCode::from_atom(&name));
    Err(Error::Protocol {
        code,
        message: format!("{context} {}", completion.text),
    })
}

/// Capability names from an untagged CAPABILITY response or a
/// `[CAPABILITY ...]` code in the completion.
fn reported_capabilities(completion: &Completion, untagged: &mut UntaggedResponses) -> Vec<String> {
    let mut names: Vec<String> = untagged
        .take("CAPABILITY")
        .iter()
        .flat_map(|line| {
            line.text()
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();
    if let Some((code, data)) = bracketed_code(completion.text.as_bytes())
        && code == "CAPABILITY"
    {
        names.extend(
            String::from_utf8_lossy(&data)
                .split_whitespace()
                .map(str::to_string),
        );
    }
    names
}

/// Numeric value of the last untagged response with `name`.
fn untagged_number(untagged: &mut UntaggedResponses, name: &str) -> Option<u64> {
    untagged
        .take_last(name)
        .and_then(|line| line.text().split_whitespace().next()?.parse().ok())
}

/// Flag list of the last untagged response with `name`.
fn untagged_flags(untagged: &mut UntaggedResponses, name: &str) -> Result<Vec<String>> {
    let Some(line) = untagged.take_last(name) else {
        return Ok(Vec::new());
    };
    let tokens = tokenize(&line.data, line.literals.iter().cloned())?;
    Ok(tokens
        .first()
        .and_then(|token| token.as_list())
        .unwrap_or_default()
        .iter()
        .filter_map(|flag| flag.to_text())
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn completion(status: Status, text: &str) -> Completion {
        Completion {
            tag: "A0001".to_string(),
            status,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_check_response_ok() {
        assert!(check_response(&completion(Status::Ok, "done"), "LIST failed.").is_ok());
    }

    #[test]
    fn test_check_response_classifies_code() {
        let err = check_response(
            &completion(Status::No, "[ALREADYEXISTS] Mailbox exists"),
            "Could not create folder.",
        )
        .unwrap_err();
        match err {
            Error::Protocol { code, message } => {
                assert_eq!(code, ResponseCode::AlreadyExists);
                assert_eq!(message, "Could not create folder. [ALREADYEXISTS] Mailbox exists");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_check_response_generic() {
        let err = check_response(&completion(Status::Bad, "syntax error"), "X failed.")
            .unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseCode::Generic));
        let err = check_response(&completion(Status::No, "[UIDNEXT 4] odd"), "X failed.")
            .unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseCode::Generic));
    }

    #[test]
    fn test_reported_capabilities() {
        let mut untagged = UntaggedResponses::new();
        untagged.record(b"CAPABILITY IMAP4rev1 IDLE", Vec::new());
        let caps = reported_capabilities(
            &completion(Status::Ok, "[CAPABILITY ID NAMESPACE] Logged in"),
            &mut untagged,
        );
        assert_eq!(caps, vec!["IMAP4rev1", "IDLE", "ID", "NAMESPACE"]);
        assert!(untagged.is_empty());
    }

    #[test]
    fn test_untagged_helpers() {
        let mut untagged = UntaggedResponses::new();
        untagged.record(b"3 EXISTS", Vec::new());
        untagged.record(b"4 EXISTS", Vec::new());
        untagged.record(b"FLAGS (\\Seen \\Deleted)", Vec::new());
        assert_eq!(untagged_number(&mut untagged, "EXISTS"), Some(4));
        assert_eq!(untagged_number(&mut untagged, "EXISTS"), None);
        assert_eq!(
            untagged_flags(&mut untagged, "FLAGS").unwrap(),
            vec!["\\Seen", "\\Deleted"]
        );
        assert!(untagged_flags(&mut untagged, "PERMANENTFLAGS").unwrap().is_empty());
    }
}
