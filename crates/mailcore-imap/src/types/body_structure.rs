//! MIME body structure tree built from `FETCH BODYSTRUCTURE`.
//!
//! Every part carries its IMAP part specifier (`mime_id`) so callers can
//! request individual sections with `BODY[<mime_id>]`:
//!
//! - a single-part message is part `"1"`;
//! - children of the top-level multipart are `"1"`, `"2"`, ...;
//! - deeper children are `"<parent>.<n>"`;
//! - a multipart container keeps the id of its slot in the parent, which is
//!   `""` for the top-level container.

use std::collections::BTreeMap;

use super::Envelope;
use crate::encoding::decode_header_value;
use crate::parser::Token;
use crate::{Error, Result};

/// Content-Disposition of a part.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Disposition {
    /// Disposition type, e.g. `attachment` or `inline`.
    pub kind: String,
    /// Disposition parameters with lowercase keys.
    pub params: BTreeMap<String, String>,
}

/// A non-multipart body part.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimplePart {
    /// Main MIME type as sent by the server.
    pub main_type: String,
    /// MIME subtype as sent by the server.
    pub subtype: String,
    /// Content-Type parameters except `charset` and `name`.
    pub attributes: BTreeMap<String, String>,
    /// IMAP part specifier.
    pub mime_id: String,
    /// Content-ID.
    pub content_id: Option<String>,
    /// Content-Description.
    pub description: Option<String>,
    /// Content-Transfer-Encoding.
    pub encoding: Option<String>,
    /// Size in bytes of the encoded body.
    pub size: u64,
    /// Charset parameter.
    pub charset: Option<String>,
    /// Name parameter, RFC 2047 decoded.
    pub name: Option<String>,
    /// Line count, present for TEXT parts.
    pub line_count: Option<u64>,
    /// Content-MD5.
    pub md5: Option<String>,
    /// Content-Disposition.
    pub disposition: Option<Disposition>,
    /// Content-Language values.
    pub language: Vec<String>,
    /// Content-Location.
    pub location: Option<String>,
    /// Disposition `filename` parameter, RFC 2047 decoded.
    pub filename: Option<String>,
}

/// A multipart container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultipartPart {
    /// Multipart subtype, e.g. `MIXED`.
    pub subtype: String,
    /// Boundary parameter.
    pub boundary: Option<String>,
    /// Content-Type parameters except `boundary`.
    pub attributes: BTreeMap<String, String>,
    /// Content-Disposition.
    pub disposition: Option<Disposition>,
    /// Content-Language values.
    pub language: Vec<String>,
    /// Content-Location.
    pub location: Option<String>,
    /// IMAP part specifier of the container.
    pub mime_id: String,
    /// Child parts, never empty.
    pub children: Vec<BodyStructure>,
}

/// A `MESSAGE/RFC822` part with its encapsulated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    /// Fields shared with simple parts.
    pub part: SimplePart,
    /// Envelope of the encapsulated message.
    pub envelope: Box<Envelope>,
    /// Structure of the encapsulated message.
    pub body: Box<BodyStructure>,
    /// Line count of the encapsulated message.
    pub line_count: Option<u64>,
}

/// Recursive MIME structure of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyStructure {
    /// Single leaf part.
    Simple(SimplePart),
    /// Multipart container.
    Multipart(MultipartPart),
    /// Encapsulated message.
    Message(MessagePart),
}

impl BodyStructure {
    /// Builds the tree from the BODYSTRUCTURE token list.
    ///
    /// # Errors
    ///
    /// Returns a parse error when a required field is missing or has the
    /// wrong shape.
    pub fn from_token(token: &Token) -> Result<Self> {
        walk(token, "", false)
    }

    /// Returns the IMAP part specifier.
    #[must_use]
    pub fn mime_id(&self) -> &str {
        match self {
            Self::Simple(part) => &part.mime_id,
            Self::Message(msg) => &msg.part.mime_id,
            Self::Multipart(multi) => &multi.mime_id,
        }
    }

    /// Returns the lowercase `type/subtype`.
    #[must_use]
    pub fn content_type(&self) -> String {
        match self {
            Self::Simple(part) | Self::Message(MessagePart { part, .. }) => {
                format!("{}/{}", part.main_type, part.subtype).to_ascii_lowercase()
            }
            Self::Multipart(multi) => format!("multipart/{}", multi.subtype).to_ascii_lowercase(),
        }
    }

    /// Returns true for multipart containers.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }

    /// Returns the direct children: the parts of a multipart, or the
    /// encapsulated body of a message part.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match self {
            Self::Multipart(multi) => &multi.children,
            Self::Message(msg) => std::slice::from_ref(msg.body.as_ref()),
            Self::Simple(_) => &[],
        }
    }

    /// Returns every part in depth-first order, starting with `self`.
    #[must_use]
    pub fn parts(&self) -> Vec<&Self> {
        let mut out = vec![self];
        for child in self.children() {
            out.extend(child.parts());
        }
        out
    }

    /// Finds the first part with the given IMAP part specifier.
    #[must_use]
    pub fn find_by_mime_id(&self, mime_id: &str) -> Option<&Self> {
        if self.mime_id() == mime_id {
            return Some(self);
        }
        self.children()
            .iter()
            .find_map(|child| child.find_by_mime_id(mime_id))
    }
}

fn walk(token: &Token, id: &str, nested: bool) -> Result<BodyStructure> {
    let items = token
        .as_list()
        .ok_or_else(|| Error::parse(0, format!("Expected body structure list, got {token:?}")))?;
    match items.first() {
        Some(Token::List(_)) => walk_multipart(items, id, nested),
        Some(_) => walk_simple(items, id, nested),
        None => Err(Error::parse(0, "Empty body structure")),
    }
}

fn walk_multipart(items: &[Token], id: &str, nested: bool) -> Result<BodyStructure> {
    let split = items
        .iter()
        .position(|item| item.as_list().is_none())
        .unwrap_or(items.len());
    let (parts, rest) = items.split_at(split);

    let children = parts
        .iter()
        .enumerate()
        .map(|(pos, child)| {
            let child_id = if nested {
                format!("{id}.{}", pos + 1)
            } else {
                (pos + 1).to_string()
            };
            walk(child, &child_id, true)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rest = rest.iter();
    let subtype = required_text(rest.next(), "multipart subtype")?;
    let mut attributes = params(rest.next());
    let boundary = attributes.remove("boundary");

    Ok(BodyStructure::Multipart(MultipartPart {
        subtype,
        boundary,
        attributes,
        disposition: disposition(rest.next()),
        language: language(rest.next()),
        location: rest.next().and_then(Token::to_text),
        mime_id: id.to_string(),
        children,
    }))
}

fn walk_simple(items: &[Token], id: &str, nested: bool) -> Result<BodyStructure> {
    let mime_id = if id.is_empty() && !nested {
        "1".to_string()
    } else {
        id.to_string()
    };

    let mut rest = items.iter();
    let main_type = required_text(rest.next(), "media type")?;
    let subtype = required_text(rest.next(), "media subtype")?;
    let mut attributes = params(rest.next());
    let charset = attributes.remove("charset");
    let name = attributes
        .remove("name")
        .map(|value| decode_header_value(value.as_bytes()));

    let mut part = SimplePart {
        content_id: rest.next().and_then(Token::to_text),
        description: rest.next().and_then(Token::to_text),
        encoding: rest.next().and_then(Token::to_text),
        size: rest.next().and_then(Token::as_number).unwrap_or(0),
        main_type,
        subtype,
        attributes,
        mime_id,
        charset,
        name,
        ..SimplePart::default()
    };

    let is_message = part.main_type.eq_ignore_ascii_case("message")
        && part.subtype.eq_ignore_ascii_case("rfc822");
    let mut message = None;
    if is_message {
        let envelope = rest
            .next()
            .ok_or_else(|| Error::parse(0, "MESSAGE/RFC822 part without envelope"))?;
        let body = rest
            .next()
            .ok_or_else(|| Error::parse(0, "MESSAGE/RFC822 part without body"))?;
        message = Some((
            Envelope::from_token(envelope)?,
            walk(body, &part.mime_id, true)?,
            rest.next().and_then(Token::as_number),
        ));
    } else if part.main_type.eq_ignore_ascii_case("text") {
        part.line_count = rest.next().and_then(Token::as_number);
    }

    // Some servers omit MD5 and put the disposition list in its slot.
    match rest.next() {
        Some(list @ Token::List(_)) => part.disposition = disposition(Some(list)),
        other => {
            part.md5 = other.and_then(Token::to_text);
            part.disposition = disposition(rest.next());
        }
    }
    part.language = language(rest.next());
    part.location = rest.next().and_then(Token::to_text);
    part.filename = part
        .disposition
        .as_ref()
        .and_then(|d| d.params.get("filename"))
        .map(|value| decode_header_value(value.as_bytes()));

    Ok(match message {
        Some((envelope, body, line_count)) => BodyStructure::Message(MessagePart {
            part,
            envelope: Box::new(envelope),
            body: Box::new(body),
            line_count,
        }),
        None => BodyStructure::Simple(part),
    })
}

fn required_text(token: Option<&Token>, what: &str) -> Result<String> {
    token
        .and_then(Token::to_text)
        .ok_or_else(|| Error::parse(0, format!("Missing {what} in body structure")))
}

/// Turns `("KEY" "value" ...)` into a map with lowercase keys.
fn params(token: Option<&Token>) -> BTreeMap<String, String> {
    let Some(items) = token.and_then(Token::as_list) else {
        return BTreeMap::new();
    };
    items
        .chunks_exact(2)
        .filter_map(|pair| {
            let key = pair[0].to_text()?.to_ascii_lowercase();
            Some((key, pair[1].to_text().unwrap_or_default()))
        })
        .collect()
}

fn disposition(token: Option<&Token>) -> Option<Disposition> {
    let items = token?.as_list()?;
    Some(Disposition {
        kind: items.first()?.to_text()?,
        params: params(items.get(1)),
    })
}

fn language(token: Option<&Token>) -> Vec<String> {
    match token {
        Some(Token::List(items)) => items.iter().filter_map(Token::to_text).collect(),
        Some(other) => other.to_text().into_iter().collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::parser::tokenize;

    fn build(raw: &[u8]) -> BodyStructure {
        let tokens = tokenize(raw, Vec::new()).unwrap();
        BodyStructure::from_token(&tokens[0]).unwrap()
    }

    fn ids(body: &BodyStructure) -> Vec<String> {
        body.parts().iter().map(|p| p.mime_id().to_string()).collect()
    }

    #[test]
    fn test_single_part() {
        let body = build(br#"("TEXT" "PLAIN" ("CHARSET" "US-ASCII") NIL NIL "7BIT" 3028 92)"#);
        let BodyStructure::Simple(part) = &body else {
            panic!("expected simple part");
        };
        assert_eq!(part.mime_id, "1");
        assert_eq!(part.charset.as_deref(), Some("US-ASCII"));
        assert!(part.attributes.is_empty());
        assert_eq!(part.encoding.as_deref(), Some("7BIT"));
        assert_eq!(part.size, 3028);
        assert_eq!(part.line_count, Some(92));
        assert_eq!(body.content_type(), "text/plain");
    }

    #[test]
    fn test_multipart_ids() {
        let body = build(
            br#"(("TEXT" "PLAIN" ("CHARSET" "UTF-8") NIL NIL "7BIT" 10 1 NIL NIL NIL NIL)(("TEXT" "HTML" NIL NIL NIL "7BIT" 20 2)("IMAGE" "PNG" ("NAME" "a.png") "<img1>" NIL "BASE64" 300) "RELATED" ("BOUNDARY" "inner")) "MIXED" ("BOUNDARY" "outer") NIL NIL NIL)"#,
        );
        assert_eq!(ids(&body), vec!["", "1", "2", "2.1", "2.2"]);
        let BodyStructure::Multipart(root) = &body else {
            panic!("expected multipart");
        };
        assert_eq!(root.subtype, "MIXED");
        assert_eq!(root.boundary.as_deref(), Some("outer"));
        assert_eq!(root.children.len(), 2);

        let Some(BodyStructure::Simple(image)) = body.find_by_mime_id("2.2") else {
            panic!("missing image part");
        };
        assert_eq!(image.name.as_deref(), Some("a.png"));
        assert_eq!(image.content_id.as_deref(), Some("<img1>"));
        assert_eq!(image.line_count, None);
        assert!(body.find_by_mime_id("3").is_none());
        assert!(body.find_by_mime_id("2.3").is_none());
    }

    #[test]
    fn test_attachment_disposition_and_filename() {
        let body = build(
            br#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 5 1)("APPLICATION" "PDF" ("NAME" "=?utf-8?q?r=C3=A9sum=C3=A9.pdf?=") NIL NIL "BASE64" 1200 NIL ("ATTACHMENT" ("FILENAME" "=?utf-8?q?r=C3=A9sum=C3=A9.pdf?=")) ("EN" "DE") "http://x") "MIXED")"#,
        );
        let Some(BodyStructure::Simple(pdf)) = body.find_by_mime_id("2") else {
            panic!("missing pdf");
        };
        let disposition = pdf.disposition.as_ref().unwrap();
        assert_eq!(disposition.kind, "ATTACHMENT");
        assert!(disposition.params.contains_key("filename"));
        assert_eq!(pdf.filename.as_deref(), Some("r\u{e9}sum\u{e9}.pdf"));
        assert_eq!(pdf.name.as_deref(), Some("r\u{e9}sum\u{e9}.pdf"));
        assert_eq!(pdf.md5, None);
        assert_eq!(pdf.language, vec!["EN", "DE"]);
        assert_eq!(pdf.location.as_deref(), Some("http://x"));
    }

    #[test]
    fn test_disposition_in_md5_slot() {
        let body = build(
            br#"("APPLICATION" "OCTET-STREAM" NIL NIL NIL "BASE64" 42 ("attachment" ("filename" "data.bin")) "fr")"#,
        );
        let BodyStructure::Simple(part) = &body else {
            panic!("expected simple part");
        };
        assert_eq!(part.md5, None);
        assert_eq!(part.disposition.as_ref().unwrap().kind, "attachment");
        assert_eq!(part.filename.as_deref(), Some("data.bin"));
        assert_eq!(part.language, vec!["fr"]);
    }

    #[test]
    fn test_message_rfc822() {
        let body = build(
            br#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 5 1)("MESSAGE" "RFC822" NIL NIL NIL "7BIT" 900 (NIL "inner subject" NIL NIL NIL NIL NIL NIL NIL NIL) (("TEXT" "PLAIN" NIL NIL NIL "7BIT" 10 1)("TEXT" "HTML" NIL NIL NIL "7BIT" 20 1) "ALTERNATIVE") 30) "MIXED")"#,
        );
        assert_eq!(ids(&body), vec!["", "1", "2", "2", "2.1", "2.2"]);
        let Some(BodyStructure::Message(message)) = body.find_by_mime_id("2") else {
            panic!("expected message part");
        };
        assert_eq!(message.envelope.subject.as_deref(), Some("inner subject"));
        assert_eq!(message.line_count, Some(30));
        assert!(message.body.is_multipart());
        assert_eq!(
            body.find_by_mime_id("2.2").unwrap().content_type(),
            "text/html"
        );
    }

    #[test]
    fn test_top_level_message_part() {
        let body = build(
            br#"("MESSAGE" "RFC822" NIL NIL NIL "7BIT" 100 (NIL NIL NIL NIL NIL NIL NIL NIL NIL NIL) ("TEXT" "PLAIN" NIL NIL NIL "7BIT" 10 1) 5)"#,
        );
        assert_eq!(body.mime_id(), "1");
        assert_eq!(body.children()[0].mime_id(), "1");
    }

    #[test]
    fn test_malformed_structure() {
        let tokens = tokenize(br#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 5 1))"#, Vec::new()).unwrap();
        assert!(BodyStructure::from_token(&tokens[0]).is_err());
        assert!(BodyStructure::from_token(&Token::Nil).is_err());
        let tokens = tokenize(b"()", Vec::new()).unwrap();
        assert!(BodyStructure::from_token(&tokens[0]).is_err());
    }
}
