//! Server identification (ID) and NAMESPACE data.

use std::collections::BTreeMap;

use crate::parser::Token;
use crate::{Error, Result};

/// Information about the logged-in user reported through ID.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInfo {
    /// `auth-id`.
    pub auth_id: Option<String>,
    /// `display-name`.
    pub display_name: Option<String>,
    /// `mail-address`.
    pub mail_address: Option<String>,
    /// `global-unique-id`.
    pub global_unique_id: Option<String>,
}

/// Server details from the ID handshake plus the connection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerInfo {
    /// Server `name`.
    pub imap_name: Option<String>,
    /// Server `version`.
    pub imap_version: Option<String>,
    /// Host the session is connected to.
    pub host: String,
    /// Port the session is connected to.
    pub port: u16,
    /// `os`.
    pub os: Option<String>,
    /// `date`.
    pub date: Option<String>,
    /// `os-version`.
    pub os_version: Option<String>,
    /// User details.
    pub user_info: UserInfo,
}

impl ServerInfo {
    /// Builds server info from the ID key/value map.
    #[must_use]
    pub fn from_id(data: &BTreeMap<String, String>, host: &str, port: u16) -> Self {
        let get = |key: &str| data.get(key).cloned();
        Self {
            imap_name: get("name"),
            imap_version: get("version"),
            host: host.to_string(),
            port,
            os: get("os"),
            date: get("date"),
            os_version: get("os-version"),
            user_info: UserInfo {
                auth_id: get("auth-id"),
                display_name: get("display-name"),
                mail_address: get("mail-address"),
                global_unique_id: get("global-unique-id"),
            },
        }
    }
}

/// Turns a `("key" "value" ...)` list into a map with lowercase keys.
///
/// NIL yields an empty map; NIL values are skipped.
#[must_use]
pub fn string_pairs(token: &Token) -> BTreeMap<String, String> {
    token
        .as_list()
        .unwrap_or_default()
        .chunks_exact(2)
        .filter_map(|pair| {
            Some((pair[0].to_text()?.to_ascii_lowercase(), pair[1].to_text()?))
        })
        .collect()
}

/// One namespace entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Folder name prefix.
    pub prefix: String,
    /// Hierarchy separator.
    pub separator: Option<String>,
}

/// NAMESPACE response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Namespaces {
    /// Personal namespaces.
    pub private: Vec<Namespace>,
    /// Other users' namespaces.
    pub other_users: Vec<Namespace>,
    /// Shared namespaces.
    pub public_folders: Vec<Namespace>,
}

impl Namespaces {
    /// Builds namespaces from the three top-level tokens of the response.
    ///
    /// # Errors
    ///
    /// Returns a parse error if fewer than three groups are present.
    pub fn from_tokens(tokens: &[Token]) -> Result<Self> {
        let [private, other_users, public_folders, ..] = tokens else {
            return Err(Error::parse(0, "NAMESPACE response needs three groups"));
        };
        Ok(Self {
            private: namespace_list(private),
            other_users: namespace_list(other_users),
            public_folders: namespace_list(public_folders),
        })
    }
}

fn namespace_list(token: &Token) -> Vec<Namespace> {
    token
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| {
            let entry = entry.as_list()?;
            Some(Namespace {
                prefix: entry.first()?.to_text()?,
                separator: entry.get(1).and_then(Token::to_text),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::parser::tokenize;

    #[test]
    fn test_server_info_from_id() {
        let tokens = tokenize(
            br#"("name" "Scalix" "version" "12.0" "os" "Linux" "Auth-ID" "jane" "display-name" "Jane Doe" "date" NIL)"#,
            Vec::new(),
        )
        .unwrap();
        let pairs = string_pairs(&tokens[0]);
        assert_eq!(pairs.get("auth-id").map(String::as_str), Some("jane"));
        assert!(!pairs.contains_key("date"));

        let info = ServerInfo::from_id(&pairs, "mail.example.com", 143);
        assert_eq!(info.imap_name.as_deref(), Some("Scalix"));
        assert_eq!(info.imap_version.as_deref(), Some("12.0"));
        assert_eq!(info.os.as_deref(), Some("Linux"));
        assert_eq!(info.port, 143);
        assert_eq!(info.user_info.display_name.as_deref(), Some("Jane Doe"));
        assert_eq!(info.user_info.mail_address, None);
    }

    #[test]
    fn test_string_pairs_nil() {
        assert!(string_pairs(&Token::Nil).is_empty());
    }

    #[test]
    fn test_namespaces() {
        let tokens = tokenize(
            br##"(("" "/")) (("~" "/")("#users." ".")) NIL"##,
            Vec::new(),
        )
        .unwrap();
        let ns = Namespaces::from_tokens(&tokens).unwrap();
        assert_eq!(ns.private.len(), 1);
        assert_eq!(ns.private[0].prefix, "");
        assert_eq!(ns.private[0].separator.as_deref(), Some("/"));
        assert_eq!(ns.other_users[1].prefix, "#users.");
        assert!(ns.public_folders.is_empty());
        assert!(Namespaces::from_tokens(&tokens[..2]).is_err());
    }
}
