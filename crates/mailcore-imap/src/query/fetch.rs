//! FETCH argument builder.

use super::{IdSet, QueryRange, push_unique};
use crate::Result;

/// Builds the item list of a FETCH command.
///
/// UID is always requested first. Header fields added through
/// [`FetchQuery::header_field`] are coalesced into one
/// `BODY[HEADER.FIELDS (...)]` item at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchQuery {
    range: QueryRange,
    items: Vec<String>,
    header_fields: Vec<String>,
    peek: bool,
}

impl FetchQuery {
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

    /// Creates a query over an existing range.
    #[must_use]
    pub fn with_range(range: QueryRange) -> Self {
        Self {
            range,
            items: vec!["UID".to_string()],
            header_fields: Vec::new(),
            peek: false,
        }
    }

    /// `FLAGS INTERNALDATE RFC822.SIZE ENVELOPE`.
    pub fn all(ids: impl Into<IdSet>, uid: bool) -> Self {
        Self::fast(ids, uid).envelope()
    }

    /// `FLAGS INTERNALDATE RFC822.SIZE`.
    pub fn fast(ids: impl Into<IdSet>, uid: bool) -> Self {
        let query = if uid {
            Self::uids(ids)
        } else {
            Self::sequence(ids)
        };
        query.flags().rfc822_size().internal_date()
    }

    /// `FLAGS INTERNALDATE RFC822.SIZE ENVELOPE BODY`.
    pub fn full(ids: impl Into<IdSet>, uid: bool) -> Self {
        Self::all(ids, uid).item("BODY")
    }

    /// The addressed messages.
    #[must_use]
    pub const fn range(&self) -> &QueryRange {
        &self.range
    }

    /// Returns true when the query addresses UIDs.
    #[must_use]
    pub const fn is_uid(&self) -> bool {
        self.range.is_uid()
    }

    /// Adds a raw item.
    #[must_use]
    pub fn item(mut self, item: impl Into<String>) -> Self {
        push_unique(&mut self.items, item.into());
        self
    }

    /// Makes later body items use `BODY.PEEK`, which leaves `\Seen` alone.
    #[must_use]
    pub const fn peek(mut self, peek: bool) -> Self {
        self.peek = peek;
        self
    }

    /// Adds ENVELOPE.
    #[must_use]
    pub fn envelope(self) -> Self {
        self.item("ENVELOPE")
    }

    /// Adds FLAGS.
    #[must_use]
    pub fn flags(self) -> Self {
        self.item("FLAGS")
    }

    /// Adds INTERNALDATE.
    #[must_use]
    pub fn internal_date(self) -> Self {
        self.item("INTERNALDATE")
    }

    /// Adds RFC822.
    #[must_use]
    pub fn rfc822(self) -> Self {
        self.item("RFC822")
    }

    /// Adds RFC822.HEADER.
    #[must_use]
    pub fn rfc822_header(self) -> Self {
        self.item("RFC822.HEADER")
    }

    /// Adds RFC822.SIZE.
    #[must_use]
    pub fn rfc822_size(self) -> Self {
        self.item("RFC822.SIZE")
    }

    /// Adds RFC822.TEXT.
    #[must_use]
    pub fn rfc822_text(self) -> Self {
        self.item("RFC822.TEXT")
    }

    /// Adds BODYSTRUCTURE.
    #[must_use]
    pub fn body_structure(self) -> Self {
        self.item("BODYSTRUCTURE")
    }

    /// Adds `BODY[section]`, or `BODY.PEEK[section]` when peeking.
    #[must_use]
    pub fn body(self, section: &str) -> Self {
        let peek = self.peek;
        self.item(body_item(peek, section, 0, 0))
    }

    /// Adds `BODY.PEEK[section]` regardless of the peek setting.
    #[must_use]
    pub fn body_peek(self, section: &str) -> Self {
        self.item(body_item(true, section, 0, 0))
    }

    /// Adds a partial body item `BODY[section]<start.size>`.
    #[must_use]
    pub fn body_partial(self, section: &str, start: u64, size: u64) -> Self {
        let peek = self.peek;
        self.item(body_item(peek, section, start, size))
    }

    /// Adds the message header, `BODY[HEADER]`.
    #[must_use]
    pub fn header(self) -> Self {
        self.body("HEADER")
    }

    /// Requests one header field; all fields share one item.
    ///
    /// The shared item is rendered by [`FetchQuery::build`] and uses the
    /// peek mode in effect at that point, not when the field was added.
    #[must_use]
    pub fn header_field(mut self, name: impl Into<String>) -> Self {
        push_unique(&mut self.header_fields, name.into());
        self
    }

    /// Renders `(range, "(ITEM ITEM ...)")`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message set is malformed.
    pub fn build(&self) -> Result<(String, String)> {
        let mut items = self.items.clone();
        if !self.header_fields.is_empty() {
            let section = format!("HEADER.FIELDS ({})", self.header_fields.join(" "));
            items.push(body_item(self.peek, &section, 0, 0));
        }
        Ok((self.range.render()?, format!("({})", items.join(" "))))
    }
}

fn body_item(peek: bool, section: &str, start: u64, size: u64) -> String {
    let name = if peek { "BODY.PEEK" } else { "BODY" };
    if size > 0 {
        format!("{name}[{section}]<{start}.{size}>")
    } else {
        format!("{name}[{section}]")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_always_first() {
        let (range, items) = FetchQuery::uids(vec![3u32, 1, 2]).build().unwrap();
        assert_eq!(range, "1:3");
        assert_eq!(items, "(UID)");
    }

    #[test]
    fn test_empty_message_set() {
        assert!(FetchQuery::uids(Vec::<u32>::new()).build().is_err());
        assert!(FetchQuery::sequence(vec![0u32]).build().is_err());
        assert!(FetchQuery::fast(Vec::<u64>::new(), true).build().is_err());
    }

    #[test]
    fn test_items_in_order_without_duplicates() {
        let query = FetchQuery::sequence("1:*")
            .envelope()
            .flags()
            .envelope()
            .body_structure()
            .item("UID");
        assert_eq!(
            query.build().unwrap().1,
            "(UID ENVELOPE FLAGS BODYSTRUCTURE)"
        );
        assert!(!query.is_uid());
    }

    #[test]
    fn test_body_items() {
        let query = FetchQuery::uids(7u32)
            .body("")
            .peek(true)
            .body("1.2")
            .body_partial("TEXT", 0, 1024)
            .header();
        assert_eq!(
            query.build().unwrap().1,
            "(UID BODY[] BODY.PEEK[1.2] BODY.PEEK[TEXT]<0.1024> BODY.PEEK[HEADER])"
        );
        let query = FetchQuery::uids(7u32).body_peek("2").body_partial("", 100, 0);
        assert_eq!(query.build().unwrap().1, "(UID BODY.PEEK[2] BODY[])");
    }

    #[test]
    fn test_header_fields_batch() {
        let query = FetchQuery::uids(1u32)
            .flags()
            .header_field("SUBJECT")
            .header_field("FROM")
            .header_field("SUBJECT")
            .peek(true);
        assert_eq!(
            query.build().unwrap().1,
            "(UID FLAGS BODY.PEEK[HEADER.FIELDS (SUBJECT FROM)])"
        );
        let query = query.peek(false);
        assert_eq!(
            query.build().unwrap().1,
            "(UID FLAGS BODY[HEADER.FIELDS (SUBJECT FROM)])"
        );
    }

    #[test]
    fn test_presets() {
        assert_eq!(
            FetchQuery::fast("1", false).build().unwrap().1,
            "(UID FLAGS RFC822.SIZE INTERNALDATE)"
        );
        assert_eq!(
            FetchQuery::all("1", false).build().unwrap().1,
            "(UID FLAGS RFC822.SIZE INTERNALDATE ENVELOPE)"
        );
        let full = FetchQuery::full("1", true);
        assert!(full.is_uid());
        assert_eq!(
            full.build().unwrap().1,
            "(UID FLAGS RFC822.SIZE INTERNALDATE ENVELOPE BODY)"
        );
    }

    #[test]
    fn test_range_validation() {
        assert!(FetchQuery::new(Some("1".into()), Some("1".into())).is_err());
        assert!(FetchQuery::new(None, None).is_err());
        assert!(FetchQuery::uids("x").build().is_err());
        let query = FetchQuery::new(Some("2,1".into()), None).unwrap();
        assert_eq!(query.build().unwrap().0, "1:2");
    }
}
