//! Folder (mailbox) entity built from LIST responses.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::parser::{ResponseLine, Token, tokenize};
use crate::{Error, Result};

/// Mailbox statistics reported by SELECT/EXAMINE.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MailboxStats {
    /// Number of messages in the mailbox.
    pub exists: Option<u64>,
    /// Number of recent messages.
    pub recent: Option<u64>,
    /// UNSEEN value from the response code.
    pub unseen: Option<u64>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<u64>,
    /// Next UID to be assigned.
    pub uid_next: Option<u64>,
    /// Flags defined for this mailbox.
    pub flags: Vec<String>,
    /// Flags that can be stored permanently.
    pub permanent_flags: Vec<String>,
}

/// A folder as listed by the server.
///
/// Attributes keep their name without the leading backslash; vendor
/// attributes of the form `X-Name=value` are split at the first `=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    name: String,
    delimiter: Option<String>,
    attributes: BTreeMap<String, String>,
    stats: MailboxStats,
}

impl Folder {
    /// Creates a folder with no attributes.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is empty or contains CR, LF or NUL.
    pub fn new(
        name: impl Into<String>,
        delimiter: Option<String>,
        attributes: BTreeMap<String, String>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "Folder name can not be empty".to_string(),
            ));
        }
        if name.contains(['\r', '\n', '\0']) {
            return Err(Error::InvalidArgument(format!(
                "Folder name {name:?} contains a line break"
            )));
        }
        Ok(Self {
            name,
            delimiter,
            attributes,
            stats: MailboxStats::default(),
        })
    }

    /// Builds a folder from the data of an untagged LIST response:
    /// `(\HasNoChildren) "/" "Sent Items"`.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the line does not have the three LIST
    /// fields.
    pub fn from_list_line(line: &ResponseLine) -> Result<Self> {
        let tokens = tokenize(&line.data, line.literals.iter().cloned())?;
        let [flags, delimiter, name] = tokens.as_slice() else {
            return Err(Error::parse(
                0,
                format!(
                    "Could not parse LIST line: {}",
                    String::from_utf8_lossy(&line.data)
                ),
            ));
        };

        let attributes = flags
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(Token::to_text)
            .map(|flag| {
                let flag = flag.strip_prefix('\\').unwrap_or(&flag);
                match flag.split_once('=') {
                    Some((key, value)) => (key.to_string(), value.to_string()),
                    None => (flag.to_string(), String::new()),
                }
            })
            .collect();

        let name = name
            .to_text()
            .ok_or_else(|| Error::parse(0, "LIST line without folder name"))?;
        Self::new(name, delimiter.to_text(), attributes)
    }

    /// Folder name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hierarchy delimiter, if the server has one.
    #[must_use]
    pub fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    /// Returns an attribute value, ignoring case in the name.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All attributes.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Statistics from the last SELECT/EXAMINE.
    #[must_use]
    pub const fn stats(&self) -> &MailboxStats {
        &self.stats
    }

    /// Replaces the statistics.
    pub fn set_stats(&mut self, stats: MailboxStats) {
        self.stats = stats;
    }

    /// False when the server marks the folder `\Noselect` or `\NonExistent`.
    #[must_use]
    pub fn selectable(&self) -> bool {
        self.attribute("Noselect").is_none() && self.attribute("NonExistent").is_none()
    }

    /// True for INBOX and folders flagged `X-SpecialFolder`.
    #[must_use]
    pub fn special_folder(&self) -> bool {
        self.attribute("X-SpecialFolder").is_some() || self.name.eq_ignore_ascii_case("INBOX")
    }

    /// Whether the folder may be renamed or deleted.
    #[must_use]
    pub fn editable(&self) -> bool {
        self.selectable() && !self.special_folder()
    }

    /// Stable reference: `X-DirectRef` when present, otherwise a UUIDv5 of
    /// the name in the URL namespace.
    #[must_use]
    pub fn direct_ref(&self) -> String {
        self.attribute("X-DirectRef").map_or_else(
            || {
                Uuid::new_v5(&Uuid::NAMESPACE_URL, self.name.as_bytes())
                    .simple()
                    .to_string()
            },
            str::to_string,
        )
    }

    /// Vendor folder class.
    #[must_use]
    pub fn folder_class(&self) -> Option<&str> {
        self.attribute("X-FolderClass")
    }

    /// Vendor modification timestamp.
    #[must_use]
    pub fn modified(&self) -> Option<&str> {
        self.attribute("X-ModDate")
    }

    /// Unseen count from stats, falling back to `X-Unseen-Msgs`.
    #[must_use]
    pub fn unseen(&self) -> u64 {
        self.stats
            .unseen
            .or_else(|| self.attribute("X-Unseen-Msgs")?.parse().ok())
            .unwrap_or(0)
    }

    /// Message count from stats, falling back to `X-Total-Msgs`.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.stats
            .exists
            .or_else(|| self.attribute("X-Total-Msgs")?.parse().ok())
            .unwrap_or(0)
    }

    /// Parent folder derived from the name and delimiter.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let delimiter = self.delimiter.as_deref().filter(|d| !d.is_empty())?;
        let (parent, _) = self.name.rsplit_once(delimiter)?;
        Self::new(parent, self.delimiter.clone(), BTreeMap::new()).ok()
    }

    /// Name as it goes on the wire.
    #[must_use]
    pub fn imap_name(&self) -> String {
        escape_name(&self.name)
    }
}

/// Quotes a folder name when it contains whitespace, `,`, `/` or `"`.
#[must_use]
pub fn escape_name(name: &str) -> String {
    let special = name
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ',' | '/' | '"'));
    if !special {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for c in name.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Joins `name` under `parent` with the parent's delimiter and escapes it.
#[must_use]
pub fn build_folder_name(name: &str, parent: Option<&Folder>) -> String {
    match parent {
        Some(parent) => escape_name(&format!(
            "{}{}{name}",
            parent.name(),
            parent.delimiter().unwrap_or_default()
        )),
        None => escape_name(name),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn folder(raw: &'static [u8]) -> Folder {
        Folder::from_list_line(&ResponseLine::new(Bytes::from_static(raw))).unwrap()
    }

    #[test]
    fn test_from_list_line() {
        let f = folder(br#"(\HasNoChildren X-DirectRef=abc X-Total-Msgs=12 X-Unseen-Msgs=3) "/" "Sent Items""#);
        assert_eq!(f.name(), "Sent Items");
        assert_eq!(f.delimiter(), Some("/"));
        assert_eq!(f.attribute("hasnochildren"), Some(""));
        assert_eq!(f.direct_ref(), "abc");
        assert_eq!(f.total(), 12);
        assert_eq!(f.unseen(), 3);
        assert!(f.selectable());
        assert!(f.editable());
        assert_eq!(f.imap_name(), "\"Sent Items\"");
    }

    #[test]
    fn test_literal_name_and_nil_delimiter() {
        let line = ResponseLine {
            data: Bytes::from_static(b"() NIL {4}"),
            literals: vec![Bytes::from_static(b"Todo")],
        };
        let f = Folder::from_list_line(&line).unwrap();
        assert_eq!(f.name(), "Todo");
        assert_eq!(f.delimiter(), None);
        assert!(f.parent().is_none());
    }

    #[test]
    fn test_noselect_and_special() {
        let f = folder(br#"(\NoSelect \HasChildren) "." "Public Folders""#);
        assert!(!f.selectable());
        assert!(!f.editable());

        let inbox = folder(br#"(\HasNoChildren) "/" INBOX"#);
        assert!(inbox.special_folder());
        assert!(!inbox.editable());

        let special = folder(br#"(X-SpecialFolder=Sent) "/" Sent"#);
        assert!(special.special_folder());
    }

    #[test]
    fn test_stats_override_vendor_counts() {
        let mut f = folder(br#"(X-Total-Msgs=12) "/" Work"#);
        f.set_stats(MailboxStats {
            exists: Some(40),
            unseen: Some(2),
            ..MailboxStats::default()
        });
        assert_eq!(f.total(), 40);
        assert_eq!(f.unseen(), 2);
    }

    #[test]
    fn test_direct_ref_is_deterministic() {
        let a = folder(br#"() "/" Projects"#);
        let b = folder(br#"(\Marked) "/" Projects"#);
        assert_eq!(a.direct_ref(), b.direct_ref());
        assert_eq!(a.direct_ref().len(), 32);
        assert_ne!(a.direct_ref(), folder(br#"() "/" Other"#).direct_ref());
    }

    #[test]
    fn test_parent() {
        let f = folder(br#"() "/" "Work/2024/Q1""#);
        let parent = f.parent().unwrap();
        assert_eq!(parent.name(), "Work/2024");
        assert_eq!(parent.parent().unwrap().name(), "Work");
        assert!(parent.parent().unwrap().parent().is_none());
    }

    #[test]
    fn test_name_with_line_break_rejected() {
        assert!(matches!(
            Folder::new("Inbox\r\nA1 DELETE INBOX", None, BTreeMap::new()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Folder::new("nul\0", None, BTreeMap::new()).is_err());
    }

    #[test]
    fn test_escape_name() {
        assert_eq!(escape_name("Archive"), "Archive");
        assert_eq!(escape_name("My Folder"), "\"My Folder\"");
        assert_eq!(escape_name("a,b"), "\"a,b\"");
        assert_eq!(escape_name("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(escape_name("back\\slash"), "back\\slash");
    }

    #[test]
    fn test_build_folder_name() {
        let parent = folder(br#"() "." Projects"#);
        assert_eq!(build_folder_name("Rust", Some(&parent)), "Projects.Rust");
        assert_eq!(build_folder_name("New Stuff", None), "\"New Stuff\"");
    }

    #[test]
    fn test_malformed_list_line() {
        let line = ResponseLine::new(Bytes::from_static(b"(\\Noselect) \"/\""));
        assert!(Folder::from_list_line(&line).is_err());
        let line = ResponseLine::new(Bytes::from_static(b"() \"/\" \"\""));
        assert!(Folder::from_list_line(&line).is_err());
    }
}
