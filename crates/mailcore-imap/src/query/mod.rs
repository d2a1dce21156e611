//! Builders for FETCH, SEARCH and STORE arguments.
//!
//! Each builder targets either sequence numbers or UIDs, never both, and
//! renders wire-exact argument strings.

pub mod fetch;
pub mod search;
pub mod sequence;
pub mod store;

pub use fetch::FetchQuery;
pub use search::SearchQuery;
pub use sequence::{IdSet, compress, expand, parse_set};
pub use store::{StoreOperation, StoreQuery};

use crate::{Error, Result};

/// Which messages a query addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRange {
    /// Message sequence numbers.
    Sequence(IdSet),
    /// Unique identifiers.
    Uids(IdSet),
}

impl QueryRange {
    /// Picks the range from optional sequence and UID sets.
    ///
    /// Empty sets count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless exactly one set is given.
    pub fn new(sequence: Option<IdSet>, uids: Option<IdSet>) -> Result<Self> {
        Self::optional(sequence, uids)?.ok_or_else(|| {
            Error::InvalidArgument("Please specify sequence or uid range.".to_string())
        })
    }

    /// Like [`QueryRange::new`] but also accepts neither set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when both sets are given.
    pub fn optional(sequence: Option<IdSet>, uids: Option<IdSet>) -> Result<Option<Self>> {
        let sequence = sequence.filter(|s| !s.is_empty());
        let uids = uids.filter(|s| !s.is_empty());
        match (sequence, uids) {
            (Some(_), Some(_)) => Err(Error::InvalidArgument(
                "You can specify only sequence or uid range, not both.".to_string(),
            )),
            (Some(seq), None) => Ok(Some(Self::Sequence(seq))),
            (None, Some(uids)) => Ok(Some(Self::Uids(uids))),
            (None, None) => Ok(None),
        }
    }

    /// Returns true for UID ranges.
    #[must_use]
    pub const fn is_uid(&self) -> bool {
        matches!(self, Self::Uids(_))
    }

    /// The underlying id set.
    #[must_use]
    pub const fn ids(&self) -> &IdSet {
        match self {
            Self::Sequence(ids) | Self::Uids(ids) => ids,
        }
    }

    /// Renders the message set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for malformed ids, and for sets
    /// that render empty (no ids, or only 0).
    pub fn render(&self) -> Result<String> {
        let rendered = expand(self.ids().clone())?;
        if rendered.is_empty() {
            return Err(Error::InvalidArgument(
                "Please specify sequence or uid range.".to_string(),
            ));
        }
        Ok(rendered)
    }
}

/// Pushes `item` unless an equal item is already present.
fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_range() {
        assert!(QueryRange::new(Some("1".into()), Some("2".into())).is_err());
        assert!(QueryRange::new(None, None).is_err());
        assert!(QueryRange::new(Some("".into()), None).is_err());
        let range = QueryRange::new(None, Some("4,5,6".into())).unwrap();
        assert!(range.is_uid());
        assert_eq!(range.render().unwrap(), "4:6");
    }

    #[test]
    fn test_optional_range() {
        assert_eq!(QueryRange::optional(None, None).unwrap(), None);
        assert!(QueryRange::optional(Some(1u32.into()), Some(2u32.into())).is_err());
        let range = QueryRange::optional(Some(1u32.into()), None).unwrap().unwrap();
        assert!(!range.is_uid());
    }

    #[test]
    fn test_empty_message_set_rejected() {
        let range = QueryRange::Uids(IdSet::from(Vec::<u32>::new()));
        assert!(matches!(range.render(), Err(Error::InvalidArgument(_))));
        let range = QueryRange::Sequence(0u32.into());
        assert!(matches!(range.render(), Err(Error::InvalidArgument(_))));
    }
}
