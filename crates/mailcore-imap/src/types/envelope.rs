//! Message envelope and address types.

use chrono::{DateTime, FixedOffset};

use crate::encoding::decode_header_value;
use crate::parser::Token;
use crate::{Error, Result};

/// Message envelope as reported by `FETCH ENVELOPE`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Date header, verbatim.
    pub date: Option<String>,
    /// Date header parsed as RFC 2822, when it parses.
    pub parsed_date: Option<DateTime<FixedOffset>>,
    /// Subject header, RFC 2047 decoded.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

impl Envelope {
    /// Builds an envelope from its parenthesized token list.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the token is not a list or an address
    /// entry is malformed.
    pub fn from_token(token: &Token) -> Result<Self> {
        let items = token
            .as_list()
            .ok_or_else(|| Error::parse(0, format!("Expected envelope list, got {token:?}")))?;
        let field = |i: usize| items.get(i).and_then(Token::to_text);
        let addresses = |i: usize| items.get(i).map_or_else(|| Ok(Vec::new()), address_list);

        let date = field(0);
        let parsed_date = date.as_deref().and_then(parse_rfc2822);
        let subject = items
            .get(1)
            .and_then(Token::as_bytes)
            .map(decode_header_value);

        Ok(Self {
            date,
            parsed_date,
            subject,
            from: addresses(2)?,
            sender: addresses(3)?,
            reply_to: addresses(4)?,
            to: addresses(5)?,
            cc: addresses(6)?,
            bcc: addresses(7)?,
            in_reply_to: field(8),
            message_id: field(9),
        })
    }
}

/// Email address from an envelope.
///
/// RFC 3501 group syntax is encoded in-band: a group starts with an entry
/// whose host is NIL and whose mailbox is the group name, and ends with an
/// entry where both are NIL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    /// Display name, RFC 2047 decoded.
    pub name: Option<String>,
    /// Source route (obsolete).
    pub adl: Option<String>,
    /// Mailbox name (local part), or the group name.
    pub mailbox: Option<String>,
    /// Host name (domain part).
    pub host: Option<String>,
}

impl Address {
    /// Returns the full email address.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }

    /// Returns true if this entry opens a group.
    #[must_use]
    pub const fn is_group_start(&self) -> bool {
        self.host.is_none() && self.mailbox.is_some()
    }

    /// Returns true if this entry closes a group.
    #[must_use]
    pub const fn is_group_end(&self) -> bool {
        self.host.is_none() && self.mailbox.is_none()
    }

    fn from_token(token: &Token) -> Result<Self> {
        let items = token
            .as_list()
            .ok_or_else(|| Error::parse(0, format!("Expected address, got {token:?}")))?;
        let field = |i: usize| items.get(i).and_then(Token::to_text);
        Ok(Self {
            name: items
                .first()
                .and_then(Token::as_bytes)
                .map(decode_header_value),
            adl: field(1),
            mailbox: field(2),
            host: field(3),
        })
    }
}

fn address_list(token: &Token) -> Result<Vec<Address>> {
    match token {
        Token::Nil => Ok(Vec::new()),
        Token::List(entries) => entries.iter().map(Address::from_token).collect(),
        other => Err(Error::parse(0, format!("Expected address list, got {other:?}"))),
    }
}

/// Parses an RFC 2822 date, tolerating a trailing comment such as `(UTC)`.
fn parse_rfc2822(raw: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    DateTime::parse_from_rfc2822(trimmed).ok().or_else(|| {
        let (head, _) = trimmed.rsplit_once(" (")?;
        DateTime::parse_from_rfc2822(head.trim_end()).ok()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::parser::tokenize;

    fn envelope(raw: &[u8]) -> Envelope {
        let tokens = tokenize(raw, Vec::new()).unwrap();
        Envelope::from_token(&tokens[0]).unwrap()
    }

    #[test]
    fn test_full_envelope() {
        let env = envelope(
            br#"("Tue, 2 Jan 2024 10:30:00 +0100 (CET)" "=?utf-8?q?Gr=C3=BC=C3=9Fe?=" (("=?utf-8?b?SsO2cmc=?=" NIL "joerg" "example.org")) NIL NIL (("Ann" NIL "ann" "example.com") (NIL NIL "bob" "example.com")) NIL NIL "<a@b>" "<c@d>")"#,
        );
        assert_eq!(env.subject.as_deref(), Some("Gr\u{fc}\u{df}e"));
        assert_eq!(env.from[0].name.as_deref(), Some("J\u{f6}rg"));
        assert_eq!(env.from[0].email().as_deref(), Some("joerg@example.org"));
        assert!(env.sender.is_empty());
        assert_eq!(env.to.len(), 2);
        assert_eq!(env.to[1].name, None);
        assert_eq!(env.in_reply_to.as_deref(), Some("<a@b>"));
        assert_eq!(env.message_id.as_deref(), Some("<c@d>"));
        let parsed = env.parsed_date.unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-02T10:30:00+01:00");
    }

    #[test]
    fn test_group_syntax() {
        let env = envelope(
            br#"(NIL NIL NIL NIL NIL ((NIL NIL "team" NIL) (NIL NIL "x" "y.org") (NIL NIL NIL NIL)) NIL NIL NIL NIL)"#,
        );
        assert!(env.to[0].is_group_start());
        assert!(!env.to[1].is_group_start());
        assert!(!env.to[1].is_group_end());
        assert!(env.to[2].is_group_end());
        assert!(env.date.is_none());
        assert!(env.parsed_date.is_none());
    }

    #[test]
    fn test_unparseable_date_kept_raw() {
        let env = envelope(br#"("yesterday" NIL NIL NIL NIL NIL NIL NIL NIL NIL)"#);
        assert_eq!(env.date.as_deref(), Some("yesterday"));
        assert!(env.parsed_date.is_none());
    }

    #[test]
    fn test_not_a_list() {
        assert!(Envelope::from_token(&Token::Nil).is_err());
        let tokens = tokenize(br#"(NIL NIL "oops" NIL NIL NIL NIL NIL NIL NIL)"#, Vec::new()).unwrap();
        assert!(Envelope::from_token(&tokens[0]).is_err());
    }
}
