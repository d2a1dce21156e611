//! SEARCH criteria builder.

use chrono::NaiveDate;

use super::{IdSet, QueryRange};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Criterion {
    Key(String),
    Uid(IdSet),
}

/// Builds SEARCH criteria.
///
/// Criteria are ANDed in insertion order. String arguments are quoted and
/// escaped; [`SearchQuery::not`] and [`SearchQuery::or`] take raw keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchQuery {
    range: Option<QueryRange>,
    criteria: Vec<Criterion>,
}

macro_rules! flag_criteria {
    ($($(#[$doc:meta])* $method:ident => $key:literal),* $(,)?) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $method(self) -> Self {
                self.key($key)
            }
        )*
    };
}

macro_rules! string_criteria {
    ($($method:ident => $key:literal),* $(,)?) => {
        $(
            #[doc = concat!("Adds `", $key, " \"value\"`.")]
            #[must_use]
            pub fn $method(self, value: &str) -> Self {
                self.key(format!(concat!($key, " {}"), quote(value)))
            }
        )*
    };
}

macro_rules! date_criteria {
    ($($method:ident => $key:literal),* $(,)?) => {
        $(
            #[doc = concat!("Adds `", $key, " dd-Mon-yyyy`.")]
            #[must_use]
            pub fn $method(self, date: NaiveDate) -> Self {
                self.key(format!(concat!($key, " {}"), date.format("%d-%b-%Y")))
            }
        )*
    };
}

impl SearchQuery {
    /// Creates a query that searches the whole mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query restricted to a sequence or UID set, or neither.
    ///
    /// # Errors
    ///
    /// Returns an error when both sets are given.
    pub fn within(sequence: Option<IdSet>, uids: Option<IdSet>) -> Result<Self> {
        Ok(Self {
            range: QueryRange::optional(sequence, uids)?,
            criteria: Vec::new(),
        })
    }

    /// Returns true when the query is restricted to UIDs.
    #[must_use]
    pub const fn is_uid(&self) -> bool {
        matches!(self.range, Some(QueryRange::Uids(_)))
    }

    fn key(mut self, key: impl Into<String>) -> Self {
        self.criteria.push(Criterion::Key(key.into()));
        self
    }

    flag_criteria! {
        /// Adds ALL.
        all => "ALL",
        /// Adds ANSWERED.
        answered => "ANSWERED",
        /// Adds DELETED.
        deleted => "DELETED",
        /// Adds DRAFT.
        draft => "DRAFT",
        /// Adds FLAGGED.
        flagged => "FLAGGED",
        /// Adds NEW.
        new_messages => "NEW",
        /// Adds OLD.
        old => "OLD",
        /// Adds RECENT.
        recent => "RECENT",
        /// Adds SEEN.
        seen => "SEEN",
        /// Adds UNANSWERED.
        unanswered => "UNANSWERED",
        /// Adds UNDELETED.
        undeleted => "UNDELETED",
        /// Adds UNDRAFT.
        undraft => "UNDRAFT",
        /// Adds UNFLAGGED.
        unflagged => "UNFLAGGED",
        /// Adds UNSEEN.
        unseen => "UNSEEN",
    }

    string_criteria! {
        bcc => "BCC",
        body => "BODY",
        cc => "CC",
        from => "FROM",
        subject => "SUBJECT",
        text => "TEXT",
        to => "TO",
    }

    date_criteria! {
        before => "BEFORE",
        on => "ON",
        since => "SINCE",
        sent_before => "SENTBEFORE",
        sent_on => "SENTON",
        sent_since => "SENTSINCE",
    }

    /// Adds `HEADER "field" "value"`.
    #[must_use]
    pub fn header(self, field: &str, value: &str) -> Self {
        self.key(format!("HEADER {} {}", quote(field), quote(value)))
    }

    /// Adds `KEYWORD flag`.
    #[must_use]
    pub fn keyword(self, flag: &str) -> Self {
        self.key(format!("KEYWORD {flag}"))
    }

    /// Adds `UNKEYWORD flag`.
    #[must_use]
    pub fn unkeyword(self, flag: &str) -> Self {
        self.key(format!("UNKEYWORD {flag}"))
    }

    /// Adds `LARGER n`.
    #[must_use]
    pub fn larger(self, size: u64) -> Self {
        self.key(format!("LARGER {size}"))
    }

    /// Adds `SMALLER n`.
    #[must_use]
    pub fn smaller(self, size: u64) -> Self {
        self.key(format!("SMALLER {size}"))
    }

    /// Adds `NOT key`; the key is passed through unchanged.
    #[must_use]
    pub fn not(self, key: &str) -> Self {
        self.key(format!("NOT {key}"))
    }

    /// Adds `OR a b`; both keys are passed through unchanged.
    #[must_use]
    pub fn or(self, first: &str, second: &str) -> Self {
        self.key(format!("OR {first} {second}"))
    }

    /// Adds `UID set`.
    #[must_use]
    pub fn uid(mut self, ids: impl Into<IdSet>) -> Self {
        self.criteria.push(Criterion::Uid(ids.into()));
        self
    }

    /// Adds a raw criterion.
    #[must_use]
    pub fn raw(self, criterion: impl Into<String>) -> Self {
        self.key(criterion)
    }

    /// Renders `(range, criteria)`.
    ///
    /// A UID restriction becomes a leading `UID set` criterion and leaves the
    /// range empty. The criteria are empty when nothing was added.
    ///
    /// # Errors
    ///
    /// Returns an error if a message set is malformed.
    pub fn build(&self) -> Result<(String, String)> {
        let mut parts = Vec::with_capacity(self.criteria.len() + 1);
        let range = match &self.range {
            Some(range) if range.is_uid() => {
                parts.push(format!("UID {}", range.render()?));
                String::new()
            }
            Some(range) => range.render()?,
            None => String::new(),
        };
        for criterion in &self.criteria {
            match criterion {
                Criterion::Key(key) => parts.push(key.clone()),
                Criterion::Uid(ids) => {
                    let rendered = QueryRange::Uids(ids.clone()).render()?;
                    parts.push(format!("UID {rendered}"));
                }
            }
        }
        Ok((range, parts.join(" ")))
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
