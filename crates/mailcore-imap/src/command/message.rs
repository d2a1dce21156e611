//! Message commands: FETCH, SEARCH, STORE, APPEND and deletion.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Local};
use tracing::info;

use super::folder::Create;
use super::{Command, Request, check_response};
use crate::connection::{Completion, Transport};
use crate::parser::{UntaggedResponses, bracketed_code, parse_fetch_response};
use crate::query::{FetchQuery, IdSet, SearchQuery, StoreQuery, expand};
use crate::types::{FetchedMessage, Folder};
use crate::{Error, ResponseCode, Result};

fn fetched_messages(untagged: &mut UntaggedResponses) -> Result<Vec<FetchedMessage>> {
    untagged
        .take("FETCH")
        .iter()
        .map(parse_fetch_response)
        .collect()
}

/// `FETCH` or `UID FETCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
    query: FetchQuery,
}

impl Fetch {
    /// Fetches the items described by `query`.
    #[must_use]
    pub const fn new(query: FetchQuery) -> Self {
        Self { query }
    }
}

impl Command for Fetch {
    type Output = Vec<FetchedMessage>;

    fn name(&self) -> &'static str {
        if self.query.is_uid() { "UID" } else { "FETCH" }
    }

    fn encode(&self) -> Result<Request> {
        let (range, items) = self.query.build()?;
        let verb = if self.query.is_uid() { "UID FETCH" } else { "FETCH" };
        Ok(Request::new(verb).raw(range).raw(items))
    }

    fn decode(&self, _completion: &Completion, untagged: &mut UntaggedResponses) -> Result<Vec<FetchedMessage>> {
        fetched_messages(untagged)
    }

    fn requires_selection(&self) -> bool {
        true
    }
}

/// `SEARCH [CHARSET charset] criteria`.
///
/// Yields the ids listed by the server; an empty search matches ALL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Search {
    query: SearchQuery,
    charset: Option<String>,
}

impl Search {
    /// Searches with `query`.
    #[must_use]
    pub const fn new(query: SearchQuery) -> Self {
        Self {
            query,
            charset: None,
        }
    }

    /// Declares the charset of the string criteria.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }
}

impl Command for Search {
    type Output = Vec<u64>;

    fn name(&self) -> &'static str {
        "SEARCH"
    }

    fn encode(&self) -> Result<Request> {
        let (range, criteria) = self.query.build()?;
        let mut request = Request::new("SEARCH");
        if let Some(charset) = &self.charset {
            request = request.raw("CHARSET").astring(charset.as_str());
        }
        let whole_mailbox = range.is_empty();
        if !whole_mailbox {
            request = request.raw(range);
        }
        if !criteria.is_empty() {
            request = request.raw(criteria);
        } else if whole_mailbox {
            request = request.raw("ALL");
        }
        Ok(request)
    }

    fn decode(&self, _completion: &Completion, untagged: &mut UntaggedResponses) -> Result<Vec<u64>> {
        untagged
            .take("SEARCH")
            .iter()
            .flat_map(|line| {
                line.text()
                    .split_whitespace()
                    .map(|id| {
                        id.parse()
                            .map_err(|_| Error::parse(0, format!("Invalid SEARCH id {id:?}")))
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn requires_selection(&self) -> bool {
        true
    }
}

/// `STORE` or `UID STORE`.
///
/// Yields the FETCH responses the change caused; empty when silent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    query: StoreQuery,
}

impl Store {
    /// Applies `query`.
    #[must_use]
    pub const fn new(query: StoreQuery) -> Self {
        Self { query }
    }
}

impl Command for Store {
    type Output = Vec<FetchedMessage>;

    fn name(&self) -> &'static str {
        if self.query.is_uid() { "UID" } else { "STORE" }
    }

    fn encode(&self) -> Result<Request> {
        let (range, item, flags) = self.query.build()?;
        let verb = if self.query.is_uid() { "UID STORE" } else { "STORE" };
        Ok(Request::new(verb).raw(range).raw(item).raw(flags))
    }

    fn decode(&self, _completion: &Completion, untagged: &mut UntaggedResponses) -> Result<Vec<FetchedMessage>> {
        fetched_messages(untagged)
    }

    fn requires_selection(&self) -> bool {
        true
    }
}

/// `APPEND folder (flags) "date" {size}`.
///
/// Yields the UID from an `[APPENDUID validity uid]` code when the server
/// sends one. A `[TRYCREATE]` failure creates the folder and retries once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Append {
    folder: Folder,
    message: Bytes,
    flags: Vec<String>,
    date: Option<DateTime<FixedOffset>>,
}

impl Append {
    /// Appends `message` to `folder`.
    pub fn new(folder: Folder, message: impl Into<Bytes>) -> Self {
        Self {
            folder,
            message: message.into(),
            flags: Vec::new(),
            date: None,
        }
    }

    /// Flags to set on the appended message.
    #[must_use]
    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Internal date; defaults to the current local time.
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    fn attempt<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<Option<u64>> {
        let completion = transport.send(&self.encode()?)?;
        check_response(&completion, &self.context())?;
        self.decode(&completion, transport.untagged())
    }
}

impl Command for Append {
    type Output = Option<u64>;

    fn name(&self) -> &'static str {
        "APPEND"
    }

    fn encode(&self) -> Result<Request> {
        let date = self
            .date
            .unwrap_or_else(|| Local::now().fixed_offset());
        let mut request = Request::new("APPEND").raw(self.folder.imap_name());
        if !self.flags.is_empty() {
            request = request.raw(format!("({})", self.flags.join(" ")));
        }
        Ok(request
            .raw(format!("\"{}\"", date.format("%d-%b-%Y %H:%M:%S %z")))
            .literal(self.message.clone()))
    }

    fn decode(&self, completion: &Completion, _untagged: &mut UntaggedResponses) -> Result<Option<u64>> {
        Ok(bracketed_code(completion.text.as_bytes())
            .filter(|(code, _)| code == "APPENDUID")
            .and_then(|(_, data)| {
                String::from_utf8_lossy(&data)
                    .split_whitespace()
                    .next_back()?
                    .parse()
                    .ok()
            }))
    }

    fn context(&self) -> String {
        format!("Could not append message to {}.", self.folder.name())
    }

    fn run<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<Option<u64>> {
        match self.attempt(transport) {
            Err(Error::Protocol {
                code: ResponseCode::TryCreate,
                ..
            }) => {
                info!(folder = %self.folder.name(), "Creating missing folder before retrying APPEND");
                Create::new(self.folder.name(), None)?.run(transport)?;
                self.attempt(transport).map_err(|err| match err {
                    Error::Protocol {
                        code: ResponseCode::TryCreate,
                        message,
                    } => Error::Protocol {
                        code: ResponseCode::TryCreate,
                        message: format!("{message} Folder could not be created."),
                    },
                    other => other,
                })
            }
            result => result,
        }
    }
}

/// Replaces a stored message: appends the new version, then hard-deletes
/// the old UID.
///
/// Fails when the server reports the new copy under the old UID, since
/// deleting it would lose the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMessage {
    append: Append,
    old_uid: u64,
}

impl UpdateMessage {
    /// Replaces the message `old_uid` with `append`.
    #[must_use]
    pub const fn new(append: Append, old_uid: u64) -> Self {
        Self { append, old_uid }
    }
}

impl Command for UpdateMessage {
    type Output = Option<u64>;

    fn name(&self) -> &'static str {
        "APPEND"
    }

    fn encode(&self) -> Result<Request> {
        self.append.encode()
    }

    fn decode(&self, completion: &Completion, untagged: &mut UntaggedResponses) -> Result<Option<u64>> {
        self.append.decode(completion, untagged)
    }

    fn context(&self) -> String {
        self.append.context()
    }

    fn requires_selection(&self) -> bool {
        true
    }

    fn run<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<Option<u64>> {
        if self.old_uid == 0 {
            return Err(Error::InvalidArgument(
                "Message does not have previous UID".to_string(),
            ));
        }
        let new_uid = self.append.run(transport)?;
        if new_uid == Some(self.old_uid) {
            return Err(Error::IllegalState(format!(
                "Message new UID {} is the same as old one",
                self.old_uid
            )));
        }
        DeleteMessage::new(self.old_uid).run(transport)?;
        Ok(new_uid)
    }
}

/// `UID STORE uids +FLAGS (\Deleted)` followed by `EXPUNGE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMessage {
    uids: IdSet,
}

impl DeleteMessage {
    /// Deletes the messages with `uids`.
    pub fn new(uids: impl Into<IdSet>) -> Self {
        Self { uids: uids.into() }
    }
}

impl Command for DeleteMessage {
    type Output = ();

    fn name(&self) -> &'static str {
        "UID"
    }

    fn encode(&self) -> Result<Request> {
        let uids = expand(self.uids.clone())?;
        if uids.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "No message UIDs to delete in {:?}",
                self.uids.to_string()
            )));
        }
        Ok(Request::new("UID STORE")
            .raw(uids)
            .raw("+FLAGS")
            .raw(r"(\Deleted)"))
    }

    fn decode(&self, _completion: &Completion, untagged: &mut UntaggedResponses) -> Result<()> {
        untagged.take("FETCH");
        Ok(())
    }

    fn context(&self) -> String {
        format!("Could not delete messages {}.", self.uids)
    }

    fn requires_selection(&self) -> bool {
        true
    }

    fn run<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        let completion = transport.send(&self.encode()?)?;
        check_response(&completion, &self.context())?;
        self.decode(&completion, transport.untagged())?;
        Expunge.run(transport).map(|_| ())
    }
}

/// `EXPUNGE`.
///
/// Yields the sequence numbers the server reported as expunged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Expunge;

impl Command for Expunge {
    type Output = Vec<u64>;

    fn name(&self) -> &'static str {
        "EXPUNGE"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("EXPUNGE"))
    }

    fn decode(&self, _completion: &Completion, untagged: &mut UntaggedResponses) -> Result<Vec<u64>> {
        Ok(untagged
            .take("EXPUNGE")
            .iter()
            .filter_map(|line| line.text().trim().parse().ok())
            .collect())
    }

    fn requires_selection(&self) -> bool {
        true
    }
}
