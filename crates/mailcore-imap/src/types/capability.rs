//! Negotiated server capabilities.

use std::collections::BTreeSet;

/// Commands every IMAP4rev1 server implements.
pub const IMAP4REV1_COMMANDS: &[&str] = &[
    "CAPABILITY",
    "LOGOUT",
    "LOGIN",
    "DELETE",
    "RENAME",
    "CREATE",
    "EXAMINE",
    "SELECT",
    "NOOP",
    "SUBSCRIBE",
    "UNSUBSCRIBE",
    "LIST",
    "LSUB",
    "APPEND",
    "CHECK",
    "CLOSE",
    "EXPUNGE",
    "SEARCH",
    "FETCH",
    "PARTIAL",
    "STORE",
    "COPY",
    "UID",
];

/// Set of uppercase capability names.
///
/// The set only grows: merging never removes a name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capabilities(BTreeSet<String>);

impl Capabilities {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Unions `names` into the set.
    ///
    /// `IMAP4rev1` implies the base command set, and the Scalix marker
    /// `X-SCALIX-1` implies the `X-SCALIX-ID` command.
    pub fn merge<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() {
                self.0.insert(name.to_ascii_uppercase());
            }
        }
        if self.0.contains("IMAP4REV1") {
            self.0
                .extend(IMAP4REV1_COMMANDS.iter().map(|c| (*c).to_string()));
        }
        if self.0.contains("X-SCALIX-1") {
            self.0.insert("X-SCALIX-ID".to_string());
        }
    }

    /// Unions another set into this one.
    pub fn extend_from(&mut self, other: &Self) {
        self.merge(other.iter());
    }

    /// Returns true if `name` is present, ignoring case.
    #[must_use]
    pub fn supports(&self, name: &str) -> bool {
        self.0.contains(&name.to_ascii_uppercase())
    }

    /// Iterates over the names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing has been negotiated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Capabilities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut caps = Self::new();
        caps.merge(iter);
        caps
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_uppercases() {
        let caps: Capabilities = ["idle", "Namespace", ""].into_iter().collect();
        assert_eq!(caps.len(), 2);
        assert!(caps.supports("IDLE"));
        assert!(caps.supports("namespace"));
    }

    #[test]
    fn test_imap4rev1_implies_core_commands() {
        let caps: Capabilities = ["IMAP4rev1"].into_iter().collect();
        for command in IMAP4REV1_COMMANDS {
            assert!(caps.supports(command), "{command} missing");
        }
        assert!(!caps.supports("UNSELECT"));
        assert!(!caps.supports("ID"));
    }

    #[test]
    fn test_scalix_marker() {
        let caps: Capabilities = ["X-SCALIX-1"].into_iter().collect();
        assert!(caps.supports("X-SCALIX-ID"));
        assert!(!caps.supports("LOGIN"));
    }

    #[test]
    fn test_merge_only_grows() {
        let mut caps: Capabilities = ["IMAP4REV1", "ID"].into_iter().collect();
        let before = caps.len();
        caps.merge(["UNSELECT"]);
        assert_eq!(caps.len(), before + 1);
        caps.extend_from(&["ID"].into_iter().collect());
        assert_eq!(caps.len(), before + 1);
        assert!(caps.supports("ID"));
    }
}
