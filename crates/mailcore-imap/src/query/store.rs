//! STORE argument builder.

use super::{IdSet, QueryRange};
use crate::{Error, Result};

/// How STORE applies the flag list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    /// `FLAGS`: replace the flag set.
    Replace,
    /// `+FLAGS`: add flags.
    Add,
    /// `-FLAGS`: remove flags.
    Remove,
}

impl StoreOperation {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "FLAGS",
            Self::Add => "+FLAGS",
            Self::Remove => "-FLAGS",
        }
    }
}

/// Builds the arguments of a STORE command.
///
/// The last of [`replace`](Self::replace), [`add`](Self::add) and
/// [`remove`](Self::remove) wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreQuery {
    range: QueryRange,
    operation: StoreOperation,
    flags: Vec<String>,
    silent: bool,
}

impl StoreQuery {
    /// Creates a query from optional sequence and UID sets.
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly one set is given.
    pub fn new(sequence: Option<IdSet>, uids: Option<IdSet>) -> Result<Self> {
        QueryRange::new(sequence, uids).map(Self::with_range)
    }

    /// Creates a query over UIDs.
    pub fn uids(ids: impl Into<IdSet>) -> Self {
        Self::with_range(QueryRange::Uids(ids.into()))
    }

    /// Creates a query over sequence numbers.
    pub fn sequence(ids: impl Into<IdSet>) -> Self {
        Self::with_range(QueryRange::Sequence(ids.into()))
    }

    const fn with_range(range: QueryRange) -> Self {
        Self {
            range,
            operation: StoreOperation::Replace,
            flags: Vec::new(),
            silent: false,
        }
    }

    /// Returns true when the query addresses UIDs.
    #[must_use]
    pub const fn is_uid(&self) -> bool {
        self.range.is_uid()
    }

    /// Replaces the flags of the messages.
    #[must_use]
    pub fn replace<I, S>(self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(StoreOperation::Replace, flags)
    }

    /// Adds flags to the messages.
    #[must_use]
    pub fn add<I, S>(self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(StoreOperation::Add, flags)
    }

    /// Removes flags from the messages.
    #[must_use]
    pub fn remove<I, S>(self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(StoreOperation::Remove, flags)
    }

    fn set<I, S>(mut self, operation: StoreOperation, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operation = operation;
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Suppresses the untagged FETCH echo.
    #[must_use]
    pub const fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Renders `(range, item, "(FLAG ...)")`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when no flags were given or the
    /// message set is malformed.
    pub fn build(&self) -> Result<(String, String, String)> {
        if self.flags.is_empty() {
            return Err(Error::InvalidArgument(
                "Please specify flags to replace, add or remove.".to_string(),
            ));
        }
        let mut item = self.operation.as_str().to_string();
        if self.silent {
            item.push_str(".SILENT");
        }
        Ok((
            self.range.render()?,
            item,
            format!("({})", self.flags.join(" ")),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_silent() {
        let query = StoreQuery::sequence(1u32).remove([r"\SEEN"]).silent(true);
        assert_eq!(
            query.build().unwrap(),
            ("1".to_string(), "-FLAGS.SILENT".to_string(), r"(\SEEN)".to_string())
        );
    }

    #[test]
    fn test_last_operation_wins() {
        let query = StoreQuery::uids(vec![4u32, 5])
            .add([r"\Flagged"])
            .replace([r"\Seen", r"\Answered"]);
        assert!(query.is_uid());
        assert_eq!(
            query.build().unwrap(),
            ("4:5".to_string(), "FLAGS".to_string(), r"(\Seen \Answered)".to_string())
        );
    }

    #[test]
    fn test_requires_flags() {
        let query = StoreQuery::uids(1u32).silent(true);
        assert!(matches!(query.build(), Err(Error::InvalidArgument(_))));
        let query = StoreQuery::uids(1u32).add(Vec::<String>::new());
        assert!(query.build().is_err());
    }

    #[test]
    fn test_range_required() {
        assert!(StoreQuery::new(None, None).is_err());
        let query = StoreQuery::new(Some("3".into()), None).unwrap().add(["$Work"]);
        assert_eq!(query.build().unwrap().1, "+FLAGS");
        let query = StoreQuery::sequence(0u32).add([r"\Seen"]);
        assert!(matches!(query.build(), Err(Error::InvalidArgument(_))));
    }
}
