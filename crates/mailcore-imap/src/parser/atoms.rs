//! FETCH item registry.
//!
//! Maps the name of each FETCH response item to the rule that turns its
//! token into a typed [`FetchValue`]. Unknown names fall through to the
//! extension rule and keep their raw token, so a new server extension never
//! breaks parsing.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDateTime};

use super::tokenizer::{Token, tokenize};
use super::untagged::ResponseLine;
use crate::types::{BodySection, BodyStructure, Envelope, FetchValue, FetchedMessage};
use crate::{Error, Result};

/// Name and modifiers of a FETCH item as it appeared in the response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtomMeta {
    /// Uppercase item name without section or range, e.g. `BODY`.
    pub name: String,
    /// Text between `[` and `]`, if brackets were present.
    pub section: Option<String>,
    /// Text between `<` and `>`, if present.
    pub transferred: Option<String>,
}

impl AtomMeta {
    /// Splits a raw item name at its first `[` or `<`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let Some(split) = raw.find(['[', '<']) else {
            return Self {
                name: raw.to_ascii_uppercase(),
                ..Self::default()
            };
        };
        let (name, rest) = raw.split_at(split);

        let (section, after) = match rest.strip_prefix('[') {
            Some(inner) => match inner.find(']') {
                Some(end) => (Some(inner[..end].to_string()), &inner[end + 1..]),
                None => (Some(inner.to_string()), ""),
            },
            None => (None, rest),
        };
        let transferred = after
            .strip_prefix('<')
            .and_then(|inner| inner.find('>').map(|end| inner[..end].to_string()));

        Self {
            name: name.to_ascii_uppercase(),
            section,
            transferred,
        }
    }

    /// Starting octet of a partial fetch.
    #[must_use]
    pub fn origin(&self) -> Option<u64> {
        let transferred = self.transferred.as_deref()?;
        transferred.split('.').next()?.parse().ok()
    }
}

/// Converts one item value.
pub type AtomRule = fn(&AtomMeta, &Token) -> Result<FetchValue>;

const ATOM_RULES: &[(&str, AtomRule)] = &[
    ("UID", number),
    ("FLAGS", flags),
    ("ENVELOPE", envelope),
    ("INTERNALDATE", internal_date),
    ("RFC822", bytes_value),
    ("RFC822.HEADER", bytes_value),
    ("RFC822.SIZE", size),
    ("RFC822.TEXT", bytes_value),
    ("BODY", body),
    ("BODY.PEEK", body),
    ("BODYSTRUCTURE", body_structure),
];

/// Rule used for every name without an entry of its own.
const EXTENSION_RULE: AtomRule = extension;

/// Returns the rule registered for an uppercase item name.
#[must_use]
pub fn rule_for(name: &str) -> AtomRule {
    ATOM_RULES
        .iter()
        .find(|(known, _)| *known == name)
        .map_or(EXTENSION_RULE, |(_, rule)| *rule)
}

/// Maps one `name value` pair to the key it is stored under and its value.
///
/// A bare `BODY` (no section) carries the non-extensible body structure and
/// is stored under `BODYSTRUCTURE`. Both `BODY[...]` and `BODY.PEEK[...]`
/// are stored under `BODY`.
///
/// # Errors
///
/// Returns a parse error if the value does not fit the item's rule.
pub fn map_atom(raw_name: &str, value: &Token) -> Result<(String, FetchValue)> {
    let meta = AtomMeta::parse(raw_name);
    let is_body = matches!(meta.name.as_str(), "BODY" | "BODY.PEEK");

    if is_body && meta.section.is_none() {
        return Ok(("BODYSTRUCTURE".to_string(), body_structure(&meta, value)?));
    }
    let key = if is_body {
        "BODY".to_string()
    } else {
        meta.name.clone()
    };
    let value = rule_for(&meta.name)(&meta, value)?;
    Ok((key, value))
}

/// Parses the data of an untagged FETCH response: `<seq> (<name> <value> ...)`.
///
/// # Errors
///
/// Returns a parse error on tokenizer failures, a missing sequence number,
/// a missing item list, or a name without a value.
pub fn parse_fetch_response(line: &ResponseLine) -> Result<FetchedMessage> {
    let tokens = tokenize(&line.data, line.literals.iter().cloned())?;
    let mut tokens = tokens.iter();

    let seq = tokens
        .next()
        .and_then(Token::as_number)
        .ok_or_else(|| Error::parse(0, "FETCH response without sequence number"))?;
    let items = tokens
        .next()
        .and_then(Token::as_list)
        .ok_or_else(|| Error::parse(0, "FETCH response without item list"))?;

    let mut message = FetchedMessage::new(seq);
    let mut pairs = items.iter();
    while let Some(name) = pairs.next() {
        let name = name
            .text()
            .ok_or_else(|| Error::parse(0, format!("Invalid FETCH item name {name:?}")))?;
        let value = pairs
            .next()
            .ok_or_else(|| Error::parse(0, format!("FETCH item {name} without value")))?;
        let (key, value) = map_atom(&name, value)?;
        message.insert(key, value);
    }
    Ok(message)
}

fn number(meta: &AtomMeta, value: &Token) -> Result<FetchValue> {
    value
        .as_number()
        .map(FetchValue::Number)
        .ok_or_else(|| Error::parse(0, format!("{} expects a number, got {value:?}", meta.name)))
}

fn size(meta: &AtomMeta, value: &Token) -> Result<FetchValue> {
    value
        .as_number()
        .map(FetchValue::Size)
        .ok_or_else(|| Error::parse(0, format!("{} expects a number, got {value:?}", meta.name)))
}

fn flags(_meta: &AtomMeta, value: &Token) -> Result<FetchValue> {
    match value {
        Token::Nil => Ok(FetchValue::Flags(Vec::new())),
        Token::List(items) => Ok(FetchValue::Flags(
            items.iter().filter_map(Token::to_text).collect(),
        )),
        other => Err(Error::parse(0, format!("FLAGS expects a list, got {other:?}"))),
    }
}

fn envelope(_meta: &AtomMeta, value: &Token) -> Result<FetchValue> {
    Envelope::from_token(value).map(|e| FetchValue::Envelope(Box::new(e)))
}

fn internal_date(_meta: &AtomMeta, value: &Token) -> Result<FetchValue> {
    let raw = value.to_text().unwrap_or_default();
    let parsed = parse_internal_date(&raw);
    Ok(FetchValue::InternalDate { raw, parsed })
}

fn bytes_value(_meta: &AtomMeta, value: &Token) -> Result<FetchValue> {
    Ok(FetchValue::Bytes(value.to_bytes()))
}

fn body(meta: &AtomMeta, value: &Token) -> Result<FetchValue> {
    let mut sections = BTreeMap::new();
    sections.insert(
        meta.section.clone().unwrap_or_default(),
        BodySection {
            data: value.to_bytes(),
            origin: meta.origin(),
        },
    );
    Ok(FetchValue::Body(sections))
}

fn body_structure(_meta: &AtomMeta, value: &Token) -> Result<FetchValue> {
    BodyStructure::from_token(value).map(|b| FetchValue::BodyStructure(Box::new(b)))
}

fn extension(_meta: &AtomMeta, value: &Token) -> Result<FetchValue> {
    Ok(FetchValue::Extension(value.clone()))
}

/// Parses `dd-Mon-yyyy hh:mm:ss +zzzz`, tolerating a missing zone (UTC) and
/// RFC 2822 dates some servers send instead.
fn parse_internal_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%d-%b-%Y %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc().fixed_offset())
        })
        .or_else(|| DateTime::parse_from_rfc2822(raw).ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn line(data: &'static [u8], literals: &[&'static [u8]]) -> ResponseLine {
        ResponseLine {
            data: Bytes::from_static(data),
            literals: literals.iter().map(|l| Bytes::from_static(l)).collect(),
        }
    }

    #[test]
    fn test_atom_meta() {
        let meta = AtomMeta::parse("body.peek[HEADER.FIELDS (SUBJECT)]<0.1024>");
        assert_eq!(meta.name, "BODY.PEEK");
        assert_eq!(meta.section.as_deref(), Some("HEADER.FIELDS (SUBJECT)"));
        assert_eq!(meta.transferred.as_deref(), Some("0.1024"));
        assert_eq!(meta.origin(), Some(0));

        let meta = AtomMeta::parse("BODY[]<512>");
        assert_eq!(meta.section.as_deref(), Some(""));
        assert_eq!(meta.origin(), Some(512));

        let meta = AtomMeta::parse("RFC822.SIZE");
        assert_eq!(meta.name, "RFC822.SIZE");
        assert!(meta.section.is_none());
        assert!(meta.transferred.is_none());
    }

    #[test]
    fn test_registry_lookup() {
        let meta = AtomMeta::default();
        let value = Token::Number(5);
        assert_eq!(rule_for("UID")(&meta, &value).unwrap(), FetchValue::Number(5));
        assert_eq!(rule_for("RFC822.SIZE")(&meta, &value).unwrap(), FetchValue::Size(5));
        assert_eq!(
            rule_for("X-GM-MSGID")(&meta, &value).unwrap(),
            FetchValue::Extension(Token::Number(5))
        );
        assert!(rule_for("ENVELOPE")(&meta, &value).is_err());
    }

    #[test]
    fn test_parse_full_response() {
        let msg = parse_fetch_response(&line(
            br#"1 (UID 387 INTERNALDATE "11-Nov-2015 08:37:14 -0500" BODYSTRUCTURE ("text" "plain" ("charset" "US-ASCII") NIL NIL "quoted-printable" 388 20 NIL ("inline" NIL) NIL) RFC822.SIZE 812 FLAGS (\Seen) ENVELOPE ("Wed, 11 Nov 2015 08:37:14 -0500" "PHONEHOME \" dfdf" ((NIL NIL "MAIL-SYSTEM" "test.example.com")) NIL NIL NIL NIL NIL NIL "<id@MHS>"))"#,
            &[],
        ))
        .unwrap();
        assert_eq!(msg.seq(), 1);
        assert_eq!(msg.uid(), Some(387));
        assert_eq!(msg.rfc822_size(), Some(812));
        assert_eq!(msg.flags(), ["\\Seen".to_string()]);
        assert_eq!(
            msg.envelope().unwrap().subject.as_deref(),
            Some("PHONEHOME \" dfdf")
        );
        assert_eq!(
            msg.internal_date().unwrap().to_rfc3339(),
            "2015-11-11T08:37:14-05:00"
        );
        let body = msg.body_structure().unwrap();
        assert_eq!(body.content_type(), "text/plain");
    }

    #[test]
    fn test_literal_envelope_subject() {
        let msg = parse_fetch_response(&line(
            b"1 (UID 702 ENVELOPE (\"Tue, 6 Oct 2015 12:51:12 -0400\" {11} NIL NIL NIL NIL NIL NIL NIL \"<x@y>\"))",
            &[b"works (ok) "],
        ))
        .unwrap();
        assert_eq!(
            msg.envelope().unwrap().subject.as_deref(),
            Some("works (ok) ")
        );
    }

    #[test]
    fn test_body_sections_accumulate() {
        let msg = parse_fetch_response(&line(
            b"7 (UID 9 BODY[1] {3} BODY[2]<0> {2} BODY[HEADER] NIL)",
            &[b"one", b"tw"],
        ))
        .unwrap();
        assert_eq!(
            msg.body_section("1").unwrap().data.as_deref(),
            Some(&b"one"[..])
        );
        let second = msg.body_section("2").unwrap();
        assert_eq!(second.data.as_deref(), Some(&b"tw"[..]));
        assert_eq!(second.origin, Some(0));
        assert!(msg.body_section("HEADER").unwrap().data.is_none());
    }

    #[test]
    fn test_bare_body_is_structure() {
        let msg = parse_fetch_response(&line(
            br#"2 (BODY ("TEXT" "PLAIN" NIL NIL NIL "7BIT" 10 1))"#,
            &[],
        ))
        .unwrap();
        assert!(msg.body_structure().is_some());
        assert!(msg.get("BODY").is_none());
    }

    #[test]
    fn test_unknown_items_pass_through() {
        let msg = parse_fetch_response(&line(
            b"3 (X-GM-LABELS (\\Inbox Work) MODSEQ (12345) UID 4)",
            &[],
        ))
        .unwrap();
        assert_eq!(
            msg.extension("X-GM-LABELS"),
            Some(&Token::List(vec![Token::atom("\\Inbox"), Token::atom("Work")]))
        );
        assert_eq!(
            msg.extension("MODSEQ"),
            Some(&Token::List(vec![Token::Number(12345)]))
        );
        assert_eq!(msg.uid(), Some(4));
    }

    #[test]
    fn test_rfc822_items() {
        let msg = parse_fetch_response(&line(
            b"4 (RFC822.HEADER {4} RFC822.TEXT {4} RFC822 NIL)",
            &[b"H: x", b"body"],
        ))
        .unwrap();
        assert_eq!(msg.rfc822_header().unwrap().as_ref(), b"H: x");
        assert_eq!(msg.rfc822_text().unwrap().as_ref(), b"body");
        assert!(msg.rfc822().is_none());
    }

    #[test]
    fn test_internal_date_variants() {
        assert!(parse_internal_date(" 7-Feb-1994 21:52:25 -0800").is_some());
        assert_eq!(
            parse_internal_date("11-Nov-2015 08:37:14").unwrap().to_rfc3339(),
            "2015-11-11T08:37:14+00:00"
        );
        assert!(parse_internal_date("Mon, 7 Feb 1994 21:52:25 -0800").is_some());
        assert!(parse_internal_date("garbage").is_none());
    }

    #[test]
    fn test_malformed_responses() {
        assert!(parse_fetch_response(&line(b"(UID 1)", &[])).is_err());
        assert!(parse_fetch_response(&line(b"1 UID", &[])).is_err());
        assert!(parse_fetch_response(&line(b"1 (UID)", &[])).is_err());
        assert!(parse_fetch_response(&line(b"1 (UID abc)", &[])).is_err());
        assert!(parse_fetch_response(&line(b"1 (FLAGS \\Seen)", &[])).is_err());
    }
}
