//! Error types for the IMAP engine.

use std::fmt;

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Response parsing error.
    #[error("Parse error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// The server did not negotiate the command.
    #[error("Command {0} is not supported by the server")]
    UnsupportedCommand(String),

    /// Command issued outside an entered scope, after close, or without
    /// the folder selection it needs.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Login was rejected.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// RFC 5530 code reported with the failure, if any.
        code: Option<ResponseCode>,
        /// Server text.
        message: String,
    },

    /// Login redirected to another server.
    #[error("Referral to {url}: {message}")]
    Referral {
        /// IMAP URL of the server to authenticate against.
        url: String,
        /// Human-readable server text.
        message: String,
    },

    /// Too many referral redirects while connecting.
    #[error("Giving up after {0} referral redirects")]
    ReferralLimit(u32),

    /// The server answered NO or BAD.
    #[error("{code}: {message}")]
    Protocol {
        /// Classified response code.
        code: ResponseCode,
        /// Command context and server text.
        message: String,
    },

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A requested object does not exist on the server.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),
}

impl Error {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Returns the classified response code carried by this error.
    #[must_use]
    pub const fn response_code(&self) -> Option<ResponseCode> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            Self::Authentication { code, .. } => *code,
            _ => None,
        }
    }

    /// Returns true for login failures, referrals included.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::Referral { .. })
    }

    /// Returns true if the connection can no longer be used.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::Bye(_)
        )
    }
}

/// Response codes from RFC 5530 plus TRYCREATE.
///
/// Unknown or absent codes classify as [`ResponseCode::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// UNAVAILABLE: temporary failure, try again later.
    Unavailable,
    /// AUTHENTICATIONFAILED: credentials rejected.
    AuthenticationFailed,
    /// AUTHORIZATIONFAILED: authenticated but not authorized.
    AuthorizationFailed,
    /// EXPIRED: credentials expired.
    Expired,
    /// PRIVACYREQUIRED: operation needs an encrypted connection.
    PrivacyRequired,
    /// CONTACTADMIN: user should contact the administrator.
    ContactAdmin,
    /// NOPERM: missing access rights.
    NoPerm,
    /// INUSE: resource locked by someone else.
    InUse,
    /// EXPUNGEISSUED: message expunged by another session.
    ExpungeIssued,
    /// CORRUPTION: server detected corruption.
    Corruption,
    /// SERVERBUG: internal server error.
    ServerBug,
    /// CLIENTBUG: the client misbehaved.
    ClientBug,
    /// CANNOT: operation violates an invariant.
    Cannot,
    /// LIMIT: a server limit was hit.
    Limit,
    /// OVERQUOTA: quota exceeded.
    OverQuota,
    /// ALREADYEXISTS: target already exists.
    AlreadyExists,
    /// NONEXISTENT: target does not exist.
    NonExistent,
    /// TRYCREATE: destination mailbox is missing but may be created.
    TryCreate,
    /// Anything else.
    Generic,
}

const RESPONSE_CODES: &[(&str, ResponseCode)] = &[
    ("UNAVAILABLE", ResponseCode::Unavailable),
    ("AUTHENTICATIONFAILED", ResponseCode::AuthenticationFailed),
    ("AUTHORIZATIONFAILED", ResponseCode::AuthorizationFailed),
    ("EXPIRED", ResponseCode::Expired),
    ("PRIVACYREQUIRED", ResponseCode::PrivacyRequired),
    ("CONTACTADMIN", ResponseCode::ContactAdmin),
    ("NOPERM", ResponseCode::NoPerm),
    ("INUSE", ResponseCode::InUse),
    ("EXPUNGEISSUED", ResponseCode::ExpungeIssued),
    ("CORRUPTION", ResponseCode::Corruption),
    ("SERVERBUG", ResponseCode::ServerBug),
    ("CLIENTBUG", ResponseCode::ClientBug),
    ("CANNOT", ResponseCode::Cannot),
    ("LIMIT", ResponseCode::Limit),
    ("OVERQUOTA", ResponseCode::OverQuota),
    ("ALREADYEXISTS", ResponseCode::AlreadyExists),
    ("NONEXISTENT", ResponseCode::NonExistent),
    ("TRYCREATE", ResponseCode::TryCreate),
];

impl ResponseCode {
    /// Looks up a bracketed response code atom, case-insensitively.
    #[must_use]
    pub fn from_atom(atom: &str) -> Self {
        RESPONSE_CODES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(atom))
            .map_or(Self::Generic, |(_, code)| *code)
    }

    /// Returns the wire name, or `None` for [`ResponseCode::Generic`].
    #[must_use]
    pub fn as_str(self) -> Option<&'static str> {
        RESPONSE_CODES
            .iter()
            .find(|(_, code)| *code == self)
            .map(|(name, _)| *name)
    }

    /// Returns true for codes that describe a login problem.
    #[must_use]
    pub const fn is_authentication(self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::AuthorizationFailed | Self::Expired
        )
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("Protocol error"))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_code_lookup() {
        assert_eq!(ResponseCode::from_atom("ALREADYEXISTS"), ResponseCode::AlreadyExists);
        assert_eq!(ResponseCode::from_atom("overquota"), ResponseCode::OverQuota);
        assert_eq!(ResponseCode::from_atom("TRYCREATE"), ResponseCode::TryCreate);
        assert_eq!(ResponseCode::from_atom("UIDNEXT"), ResponseCode::Generic);
        assert_eq!(ResponseCode::from_atom(""), ResponseCode::Generic);
    }

    #[test]
    fn test_code_names_round_trip() {
        for (name, code) in RESPONSE_CODES {
            assert_eq!(code.as_str(), Some(*name));
        }
        assert_eq!(ResponseCode::Generic.as_str(), None);
    }

    #[test]
    fn test_error_classification() {
        let referral = Error::Referral {
            url: "imap://a;AUTH=PLAIN@b/".into(),
            message: "moved".into(),
        };
        assert!(referral.is_authentication());
        assert!(!referral.is_fatal());

        let protocol = Error::Protocol {
            code: ResponseCode::InUse,
            message: "locked".into(),
        };
        assert_eq!(protocol.response_code(), Some(ResponseCode::InUse));
        assert!(Error::Bye("later".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = Error::Protocol {
            code: ResponseCode::NonExistent,
            message: "no such mailbox".into(),
        };
        assert_eq!(err.to_string(), "NONEXISTENT: no such mailbox");
        let err = Error::Protocol {
            code: ResponseCode::Generic,
            message: "failed".into(),
        };
        assert_eq!(err.to_string(), "Protocol error: failed");
    }
}
