//! Token tree produced by the response tokenizer.

use std::borrow::Cow;

use bytes::Bytes;

/// One node of a tokenized response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `NIL` in any case, or an empty atom.
    Nil,
    /// An all-digit atom.
    Number(u64),
    /// Any other bare atom, including bracketed section specifiers.
    Atom(Bytes),
    /// A quoted string with `\"` and `\\` unescaped.
    Quoted(Bytes),
    /// Literal data announced with `{n}`.
    Literal(Bytes),
    /// Parenthesized list.
    List(Vec<Self>),
}

impl Token {
    /// Builds an atom from static text. Mostly useful in tests.
    #[must_use]
    pub const fn atom(text: &'static str) -> Self {
        Self::Atom(Bytes::from_static(text.as_bytes()))
    }

    /// Builds a quoted string from static text.
    #[must_use]
    pub const fn quoted(text: &'static str) -> Self {
        Self::Quoted(Bytes::from_static(text.as_bytes()))
    }

    /// Returns the raw bytes of a string-like token.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Atom(b) | Self::Quoted(b) | Self::Literal(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the owned byte buffer of a string-like token.
    #[must_use]
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            Self::Atom(b) | Self::Quoted(b) | Self::Literal(b) => Some(b.clone()),
            Self::Number(n) => Some(Bytes::from(n.to_string())),
            _ => None,
        }
    }

    /// Returns the token as text, replacing invalid UTF-8.
    ///
    /// Numbers render as their digits; `Nil` and lists have no text.
    #[must_use]
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Atom(b) | Self::Quoted(b) | Self::Literal(b) => {
                Some(String::from_utf8_lossy(b))
            }
            Self::Number(n) => Some(Cow::Owned(n.to_string())),
            _ => None,
        }
    }

    /// Returns the token as owned text.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        self.text().map(Cow::into_owned)
    }

    /// Returns the numeric value, accepting digits sent as a string.
    #[must_use]
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Atom(b) | Self::Quoted(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            _ => None,
        }
    }

    /// Returns true for `NIL`.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns the children of a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true if this is an atom equal to `name`, ignoring case.
    #[must_use]
    pub fn is_atom(&self, name: &str) -> bool {
        matches!(self, Self::Atom(b) if b.eq_ignore_ascii_case(name.as_bytes()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(Token::Number(7).text().unwrap(), "7");
        assert_eq!(Token::quoted("42").as_number(), Some(42));
        assert_eq!(Token::atom("abc").as_number(), None);
        assert!(Token::Nil.text().is_none());
        assert!(Token::atom("FLAGS").is_atom("flags"));
        assert!(!Token::quoted("FLAGS").is_atom("FLAGS"));
        assert_eq!(Token::List(vec![Token::Nil]).as_list().unwrap().len(), 1);
    }
}
