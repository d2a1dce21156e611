//! Folder commands: LIST, SELECT/EXAMINE, CREATE, RENAME, DELETE and the
//! ways out of the selected state.

use std::collections::BTreeMap;

use super::{Command, Request, untagged_flags, untagged_number};
use crate::connection::Completion;
use crate::parser::UntaggedResponses;
use crate::types::{Folder, MailboxStats, build_folder_name, escape_name};
use crate::{Error, Result};

/// `LIST directory pattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List {
    directory: String,
    pattern: String,
}

impl List {
    /// Lists folders under `directory` matching `pattern`.
    pub fn new(directory: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            pattern: pattern.into(),
        }
    }
}

impl Default for List {
    /// Every folder: `LIST "" *`.
    fn default() -> Self {
        Self::new("", "*")
    }
}

impl Command for List {
    type Output = Vec<Folder>;

    fn name(&self) -> &'static str {
        "LIST"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("LIST")
            .astring(self.directory.as_str())
            .raw(escape_name(&self.pattern)))
    }

    fn decode(&self, _completion: &Completion, untagged: &mut UntaggedResponses) -> Result<Vec<Folder>> {
        untagged
            .take("LIST")
            .iter()
            .map(Folder::from_list_line)
            .collect()
    }

    fn context(&self) -> String {
        format!(
            "Could not get folder list with search pattern directory={:?} pattern={}.",
            self.directory, self.pattern
        )
    }
}

/// `EXAMINE folder`: opens a folder read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Examine {
    folder: String,
}

impl Examine {
    /// Examines `folder`.
    #[must_use]
    pub fn new(folder: &Folder) -> Self {
        Self {
            folder: folder.imap_name(),
        }
    }
}

impl Command for Examine {
    type Output = MailboxStats;

    fn name(&self) -> &'static str {
        "EXAMINE"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("EXAMINE").raw(self.folder.as_str()))
    }

    fn decode(&self, _completion: &Completion, untagged: &mut UntaggedResponses) -> Result<MailboxStats> {
        mailbox_stats(untagged)
    }

    fn context(&self) -> String {
        format!("Could not select folder {}.", self.folder)
    }
}

/// `SELECT folder`: opens a folder read-write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    folder: String,
}

impl Select {
    /// Selects `folder`.
    #[must_use]
    pub fn new(folder: &Folder) -> Self {
        Self {
            folder: folder.imap_name(),
        }
    }
}

impl Command for Select {
    type Output = MailboxStats;

    fn name(&self) -> &'static str {
        "SELECT"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("SELECT").raw(self.folder.as_str()))
    }

    fn decode(&self, _completion: &Completion, untagged: &mut UntaggedResponses) -> Result<MailboxStats> {
        mailbox_stats(untagged)
    }

    fn context(&self) -> String {
        format!("Could not select folder {}.", self.folder)
    }
}

fn mailbox_stats(untagged: &mut UntaggedResponses) -> Result<MailboxStats> {
    Ok(MailboxStats {
        exists: untagged_number(untagged, "EXISTS"),
        recent: untagged_number(untagged, "RECENT"),
        unseen: untagged_number(untagged, "UNSEEN"),
        uid_validity: untagged_number(untagged, "UIDVALIDITY"),
        uid_next: untagged_number(untagged, "UIDNEXT"),
        flags: untagged_flags(untagged, "FLAGS")?,
        permanent_flags: untagged_flags(untagged, "PERMANENTFLAGS")?,
    })
}

/// `UNSELECT` (RFC 3691): leaves the folder without expunging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Unselect;

impl Command for Unselect {
    type Output = ();

    fn name(&self) -> &'static str {
        "UNSELECT"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("UNSELECT"))
    }

    fn decode(&self, _completion: &Completion, _untagged: &mut UntaggedResponses) -> Result<()> {
        Ok(())
    }

    fn context(&self) -> String {
        "Could not un select folder.".to_string()
    }

    fn requires_selection(&self) -> bool {
        true
    }
}

/// `CLOSE`: leaves the folder, expunging deleted messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Close;

impl Command for Close {
    type Output = ();

    fn name(&self) -> &'static str {
        "CLOSE"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("CLOSE"))
    }

    fn decode(&self, _completion: &Completion, _untagged: &mut UntaggedResponses) -> Result<()> {
        Ok(())
    }

    fn requires_selection(&self) -> bool {
        true
    }
}

fn not_editable(name: &str) -> Error {
    Error::InvalidArgument(format!("Folder {name} is not editable"))
}

/// Unescaped full name of `name` under `parent`, with the delimiter used.
fn join_name(name: &str, parent: Option<&Folder>) -> (String, Option<String>) {
    match parent {
        Some(parent) => (
            format!("{}{}{name}", parent.name(), parent.delimiter().unwrap_or_default()),
            parent.delimiter().map(str::to_string),
        ),
        None => (name.to_string(), None),
    }
}

/// `CREATE name`, optionally below a parent folder.
///
/// Yields the wire name of the new folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Create {
    target: Folder,
    wire_name: String,
}

impl Create {
    /// Prepares creation of `name` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty name or a target that
    /// could not be edited afterwards, such as INBOX.
    pub fn new(name: &str, parent: Option<&Folder>) -> Result<Self> {
        let (full_name, delimiter) = join_name(name, parent);
        let target = Folder::new(full_name, delimiter, BTreeMap::new())?;
        if !target.editable() {
            return Err(not_editable(target.name()));
        }
        Ok(Self {
            target,
            wire_name: build_folder_name(name, parent),
        })
    }

    /// The folder this command creates.
    #[must_use]
    pub const fn target(&self) -> &Folder {
        &self.target
    }
}

impl Command for Create {
    type Output = String;

    fn name(&self) -> &'static str {
        "CREATE"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("CREATE").raw(self.wire_name.as_str()))
    }

    fn decode(&self, _completion: &Completion, _untagged: &mut UntaggedResponses) -> Result<String> {
        Ok(self.wire_name.clone())
    }

    fn context(&self) -> String {
        format!("Could not create mailbox {}.", self.wire_name)
    }
}

/// `RENAME old new`.
///
/// Yields the wire name of the renamed folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    old_name: String,
    new_name: String,
    target_name: String,
}

impl Rename {
    /// Prepares renaming `folder` to `name` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `folder` is not editable.
    pub fn new(folder: &Folder, name: &str, parent: Option<&Folder>) -> Result<Self> {
        if !folder.editable() {
            return Err(not_editable(folder.name()));
        }
        Ok(Self {
            old_name: folder.imap_name(),
            new_name: build_folder_name(name, parent),
            target_name: join_name(name, parent).0,
        })
    }

    /// Unescaped name the folder will have after the rename.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }
}

impl Command for Rename {
    type Output = String;

    fn name(&self) -> &'static str {
        "RENAME"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("RENAME")
            .raw(self.old_name.as_str())
            .raw(self.new_name.as_str()))
    }

    fn decode(&self, _completion: &Completion, _untagged: &mut UntaggedResponses) -> Result<String> {
        Ok(self.new_name.clone())
    }

    fn context(&self) -> String {
        format!(
            "Could not rename mailbox from {} to {}.",
            self.old_name, self.new_name
        )
    }
}

/// `DELETE folder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    folder: String,
}

impl Delete {
    /// Prepares deletion of `folder`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `folder` is not editable.
    pub fn new(folder: &Folder) -> Result<Self> {
        if !folder.editable() {
            return Err(not_editable(folder.name()));
        }
        Ok(Self {
            folder: folder.imap_name(),
        })
    }
}

impl Command for Delete {
    type Output = ();

    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("DELETE").raw(self.folder.as_str()))
    }

    fn decode(&self, _completion: &Completion, _untagged: &mut UntaggedResponses) -> Result<()> {
        Ok(())
    }

    fn context(&self) -> String {
        format!("Could not delete mailbox {}.", self.folder)
    }
}
