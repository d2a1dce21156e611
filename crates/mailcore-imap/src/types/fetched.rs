//! Per-message accumulator for FETCH response items.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use mail_parser::{Message, MessageParser};

use super::{BodyStructure, Envelope};
use crate::parser::Token;

/// Data of one `BODY[section]<origin>` item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodySection {
    /// Section content; `None` when the server sent NIL.
    pub data: Option<Bytes>,
    /// Origin octet of a partial fetch.
    pub origin: Option<u64>,
}

/// Typed value of one FETCH item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchValue {
    /// Numeric item such as UID.
    Number(u64),
    /// Message flags.
    Flags(Vec<String>),
    /// Envelope.
    Envelope(Box<Envelope>),
    /// INTERNALDATE, raw and parsed.
    InternalDate {
        /// Date as sent by the server.
        raw: String,
        /// Parsed timestamp.
        parsed: Option<DateTime<FixedOffset>>,
    },
    /// RFC822, RFC822.HEADER or RFC822.TEXT content.
    Bytes(Option<Bytes>),
    /// RFC822.SIZE.
    Size(u64),
    /// BODY sections keyed by section specifier (`""` for the whole message).
    Body(BTreeMap<String, BodySection>),
    /// BODYSTRUCTURE, or BODY without a section.
    BodyStructure(Box<BodyStructure>),
    /// Item with no dedicated rule, kept as tokens.
    Extension(Token),
}

/// One message from a FETCH response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchedMessage {
    seq: u64,
    items: BTreeMap<String, FetchValue>,
}

impl FetchedMessage {
    /// Creates an empty message for the given sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self {
            seq,
            items: BTreeMap::new(),
        }
    }

    /// Stores an item. BODY section maps are merged into the existing
    /// map, so only an identical section is replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: FetchValue) {
        let name = name.into();
        match value {
            FetchValue::Body(sections) => {
                if let Some(FetchValue::Body(existing)) = self.items.get_mut(&name) {
                    existing.extend(sections);
                } else {
                    self.items.insert(name, FetchValue::Body(sections));
                }
            }
            value => {
                self.items.insert(name, value);
            }
        }
    }

    /// Message sequence number.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns an item by its uppercase name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FetchValue> {
        self.items.get(name)
    }

    /// All items.
    #[must_use]
    pub const fn items(&self) -> &BTreeMap<String, FetchValue> {
        &self.items
    }

    /// Message UID.
    #[must_use]
    pub fn uid(&self) -> Option<u64> {
        match self.get("UID")? {
            FetchValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Message flags; empty when not fetched.
    #[must_use]
    pub fn flags(&self) -> &[String] {
        match self.get("FLAGS") {
            Some(FetchValue::Flags(flags)) => flags,
            _ => &[],
        }
    }

    /// Returns true if the message carries `flag`, ignoring case.
    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags().iter().any(|f| f.eq_ignore_ascii_case(flag))
    }

    /// Envelope.
    #[must_use]
    pub fn envelope(&self) -> Option<&Envelope> {
        match self.get("ENVELOPE")? {
            FetchValue::Envelope(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Body structure.
    #[must_use]
    pub fn body_structure(&self) -> Option<&BodyStructure> {
        match self.get("BODYSTRUCTURE")? {
            FetchValue::BodyStructure(body) => Some(body),
            _ => None,
        }
    }

    /// Parsed INTERNALDATE.
    #[must_use]
    pub fn internal_date(&self) -> Option<DateTime<FixedOffset>> {
        match self.get("INTERNALDATE")? {
            FetchValue::InternalDate { parsed, .. } => *parsed,
            _ => None,
        }
    }

    /// RFC822.SIZE.
    #[must_use]
    pub fn rfc822_size(&self) -> Option<u64> {
        match self.get("RFC822.SIZE")? {
            FetchValue::Size(n) => Some(*n),
            _ => None,
        }
    }

    /// Full message from RFC822.
    #[must_use]
    pub fn rfc822(&self) -> Option<&Bytes> {
        self.bytes_item("RFC822")
    }

    /// Header from RFC822.HEADER.
    #[must_use]
    pub fn rfc822_header(&self) -> Option<&Bytes> {
        self.bytes_item("RFC822.HEADER")
    }

    /// Body text from RFC822.TEXT.
    #[must_use]
    pub fn rfc822_text(&self) -> Option<&Bytes> {
        self.bytes_item("RFC822.TEXT")
    }

    /// A fetched body section, e.g. `""`, `"1.2"` or `"HEADER"`.
    #[must_use]
    pub fn body_section(&self, section: &str) -> Option<&BodySection> {
        match self.get("BODY")? {
            FetchValue::Body(sections) => sections.get(section),
            _ => None,
        }
    }

    /// Parsed MIME view of the whole message.
    ///
    /// Taken from RFC822, else RFC822.HEADER joined with RFC822.TEXT, else
    /// `BODY[]`.
    #[must_use]
    pub fn email(&self) -> Option<Message<'static>> {
        if let Some(raw) = self.rfc822() {
            return parse_message(raw);
        }
        if let (Some(header), Some(text)) = (self.rfc822_header(), self.rfc822_text()) {
            let mut raw = Vec::with_capacity(header.len() + text.len());
            raw.extend_from_slice(header);
            raw.extend_from_slice(text);
            return parse_message(&raw);
        }
        self.section_data("").and_then(|raw| parse_message(raw))
    }

    /// Parsed header block from `BODY[HEADER]` or RFC822.HEADER.
    #[must_use]
    pub fn email_header(&self) -> Option<Message<'static>> {
        self.section_data("HEADER")
            .or_else(|| self.rfc822_header())
            .and_then(|raw| parse_message(raw))
    }

    fn section_data(&self, section: &str) -> Option<&Bytes> {
        self.body_section(section)?.data.as_ref()
    }

    /// Raw tokens of an item without a dedicated rule.
    #[must_use]
    pub fn extension(&self, name: &str) -> Option<&Token> {
        match self.get(name)? {
            FetchValue::Extension(token) => Some(token),
            _ => None,
        }
    }

    fn bytes_item(&self, name: &str) -> Option<&Bytes> {
        match self.get(name)? {
            FetchValue::Bytes(data) => data.as_ref(),
            _ => None,
        }
    }
}

fn parse_message(raw: &[u8]) -> Option<Message<'static>> {
    if raw.is_empty() {
        return None;
    }
    MessageParser::default().parse(raw).map(Message::into_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn section(data: &'static [u8]) -> FetchValue {
        let mut map = BTreeMap::new();
        map.insert(
            "1".to_string(),
            BodySection {
                data: Some(Bytes::from_static(data)),
                origin: None,
            },
        );
        FetchValue::Body(map)
    }

    #[test]
    fn test_body_sections_merge() {
        let mut msg = FetchedMessage::new(4);
        let mut two = BTreeMap::new();
        two.insert(
            "2".to_string(),
            BodySection {
                data: Some(Bytes::from_static(b"second")),
                origin: Some(0),
            },
        );
        msg.insert("BODY", FetchValue::Body(two));
        msg.insert("BODY", section(b"first"));
        msg.insert("BODY", section(b"first again"));

        assert_eq!(
            msg.body_section("2").unwrap().data.as_deref(),
            Some(&b"second"[..])
        );
        assert_eq!(msg.body_section("2").unwrap().origin, Some(0));
        assert_eq!(
            msg.body_section("1").unwrap().data.as_deref(),
            Some(&b"first again"[..])
        );
        assert!(msg.body_section("3").is_none());
    }

    #[test]
    fn test_scalar_items_overwrite() {
        let mut msg = FetchedMessage::new(1);
        msg.insert("UID", FetchValue::Number(10));
        msg.insert("UID", FetchValue::Number(11));
        msg.insert(
            "FLAGS",
            FetchValue::Flags(vec!["\\Seen".to_string(), "$Work".to_string()]),
        );
        assert_eq!(msg.uid(), Some(11));
        assert_eq!(msg.seq(), 1);
        assert!(msg.has_flag("\\SEEN"));
        assert!(!msg.has_flag("\\Deleted"));
        assert!(msg.envelope().is_none());
        assert!(msg.rfc822().is_none());
    }

    const MESSAGE: &[u8] = b"From: Jane Doe <jane@example.com>\r\n\
Subject: =?UTF-8?Q?Gr=C3=BC=C3=9Fe?=\r\n\
Message-ID: <42@example.com>\r\n\
\r\n\
See you tomorrow.\r\n";

    #[test]
    fn test_email_from_rfc822() {
        let mut msg = FetchedMessage::new(1);
        msg.insert("RFC822", FetchValue::Bytes(Some(Bytes::from_static(MESSAGE))));
        let email = msg.email().unwrap();
        assert_eq!(email.subject(), Some("Grüße"));
        assert_eq!(email.message_id(), Some("42@example.com"));
        let from = email.from().and_then(|a| a.first()).and_then(|a| a.address());
        assert_eq!(from, Some("jane@example.com"));
        assert!(email.body_text(0).unwrap().contains("See you tomorrow."));
    }

    #[test]
    fn test_email_from_split_rfc822_and_body_sections() {
        let (header, text) = MESSAGE.split_at(MESSAGE.len() - 19);
        let mut msg = FetchedMessage::new(2);
        msg.insert("RFC822.HEADER", FetchValue::Bytes(Some(Bytes::copy_from_slice(header))));
        assert!(msg.email().is_none());
        msg.insert("RFC822.TEXT", FetchValue::Bytes(Some(Bytes::copy_from_slice(text))));
        assert_eq!(msg.email().unwrap().message_id(), Some("42@example.com"));

        let mut msg = FetchedMessage::new(3);
        let mut sections = BTreeMap::new();
        sections.insert(
            "HEADER".to_string(),
            BodySection {
                data: Some(Bytes::copy_from_slice(header)),
                origin: None,
            },
        );
        msg.insert("BODY", FetchValue::Body(sections));
        assert!(msg.email().is_none());
        assert_eq!(msg.email_header().unwrap().subject(), Some("Grüße"));
        assert!(FetchedMessage::new(4).email_header().is_none());
    }
}
