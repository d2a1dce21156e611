//! Login, identification and capability commands.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{Command, Request, check_response, reported_capabilities};
use crate::connection::{Completion, Credentials, Status, Transport};
use crate::parser::{UntaggedResponses, bracketed_code, tokenize};
use crate::types::{Capabilities, Namespaces, ServerInfo, string_pairs};
use crate::{Error, ResponseCode, Result};

static REFERRAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\[REFERRAL\s(?P<url>.*)\]\s(?P<message>.*)").ok());

/// Raises [`Error::Referral`] when the completion text carries a
/// `[REFERRAL url]` code.
fn check_referral(text: &str) -> Result<()> {
    let Some(caps) = REFERRAL.as_ref().and_then(|re| re.captures(text)) else {
        return Ok(());
    };
    Err(Error::Referral {
        url: caps["url"].to_string(),
        message: caps["message"].to_string(),
    })
}

/// `LOGIN user password`.
///
/// Yields the capabilities the server reported alongside the login.
#[derive(Debug, Clone)]
pub struct Login {
    credentials: Credentials,
}

impl Login {
    /// Creates a login with the given credentials.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl Command for Login {
    type Output = Capabilities;

    fn name(&self) -> &'static str {
        "LOGIN"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("LOGIN")
            .astring(self.credentials.username())
            .astring(self.credentials.password()))
    }

    fn decode(
        &self,
        completion: &Completion,
        untagged: &mut UntaggedResponses,
    ) -> Result<Capabilities> {
        Ok(reported_capabilities(completion, untagged)
            .into_iter()
            .collect())
    }

    fn run<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<Capabilities> {
        let completion = transport.send(&self.encode()?)?;
        check_referral(&completion.text)?;
        if completion.status != Status::Ok {
            let code = bracketed_code(completion.text.as_bytes())
                .map(|(name, _)| ResponseCode::from_atom(&name))
                .filter(|code| *code != ResponseCode::Generic);
            return Err(Error::Authentication {
                code,
                message: completion.text,
            });
        }
        self.decode(&completion, transport.untagged())
    }
}

/// `ID ("name" "<client>" "version" "<version>")` (RFC 2971).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id {
    client_name: String,
    client_version: String,
}

impl Id {
    /// Identifies the client with `name` and `version`.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client_name: name.into(),
            client_version: version.into(),
        }
    }
}

impl Command for Id {
    type Output = ServerInfo;

    fn name(&self) -> &'static str {
        "ID"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("ID").raw(format!(
            r#"("name" "{}" "version" "{}")"#,
            self.client_name, self.client_version
        )))
    }

    fn decode(
        &self,
        _completion: &Completion,
        untagged: &mut UntaggedResponses,
    ) -> Result<ServerInfo> {
        Ok(ServerInfo::from_id(&pairs_from(untagged, "ID")?, "", 0))
    }

    fn context(&self) -> String {
        "Could not determine server info.".to_string()
    }

    fn run<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<ServerInfo> {
        let completion = transport.send(&self.encode()?)?;
        check_response(&completion, &self.context())?;
        let mut info = self.decode(&completion, transport.untagged())?;
        info.host = transport.host().to_string();
        info.port = transport.port();
        Ok(info)
    }
}

/// Scalix flavour of ID that also reports the sender address book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XScalixId {
    client_name: String,
    client_version: String,
}

impl XScalixId {
    /// Identifies the client with `name` and `version`.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client_name: name.into(),
            client_version: version.into(),
        }
    }
}

impl Command for XScalixId {
    type Output = BTreeMap<String, String>;

    fn name(&self) -> &'static str {
        "X-SCALIX-ID"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("X-SCALIX-ID").raw(format!(
            r#"("name" "{}" "version" "{}" all-sender-ia "")"#,
            self.client_name, self.client_version
        )))
    }

    fn decode(
        &self,
        _completion: &Completion,
        untagged: &mut UntaggedResponses,
    ) -> Result<BTreeMap<String, String>> {
        pairs_from(untagged, "X-SCALIX-ID")
    }
}

/// `NAMESPACE` (RFC 2342).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Namespace;

impl Command for Namespace {
    type Output = Namespaces;

    fn name(&self) -> &'static str {
        "NAMESPACE"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("NAMESPACE"))
    }

    fn decode(&self, _completion: &Completion, untagged: &mut UntaggedResponses) -> Result<Namespaces> {
        let line = untagged
            .take_last("NAMESPACE")
            .ok_or_else(|| Error::parse(0, "Server did not send a NAMESPACE response"))?;
        let tokens = tokenize(&line.data, line.literals)?;
        Namespaces::from_tokens(&tokens)
    }
}

/// `CAPABILITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capability;

impl Command for Capability {
    type Output = Capabilities;

    fn name(&self) -> &'static str {
        "CAPABILITY"
    }

    fn encode(&self) -> Result<Request> {
        Ok(Request::new("CAPABILITY"))
    }

    fn decode(
        &self,
        completion: &Completion,
        untagged: &mut UntaggedResponses,
    ) -> Result<Capabilities> {
        Ok(reported_capabilities(completion, untagged)
            .into_iter()
            .collect())
    }
}

/// Key/value pairs of the last untagged `name` response; empty for NIL.
fn pairs_from(untagged: &mut UntaggedResponses, name: &str) -> Result<BTreeMap<String, String>> {
    let Some(line) = untagged.take_last(name) else {
        return Ok(BTreeMap::new());
    };
    let tokens = tokenize(&line.data, line.literals)?;
    Ok(tokens.first().map(string_pairs).unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::command::Arg;
    use crate::testing::ScriptedTransport;

    fn login() -> Login {
        Login::new(Credentials::new("jane@example.com", "s3cret pass"))
    }

    #[test]
    fn test_login_encodes_astrings() {
        let request = login().encode().unwrap();
        assert_eq!(
            request.args(),
            &[
                Arg::Astring("jane@example.com".to_string()),
                Arg::Astring("s3cret pass".to_string())
            ]
        );
    }

    #[test]
    fn test_login_returns_reported_capabilities() {
        let mut transport = ScriptedTransport::new(&[]).reply(
            Status::Ok,
            "[CAPABILITY IMAP4rev1 ID UNSELECT] Logged in",
            &[],
        );
        let caps = login().run(&mut transport).unwrap();
        assert!(caps.supports("ID"));
        assert!(caps.supports("UNSELECT"));
        assert!(caps.supports("FETCH"));
    }

    #[test]
    fn test_login_failure_is_authentication_error() {
        let mut transport = ScriptedTransport::new(&[]).reply(
            Status::No,
            "[AUTHENTICATIONFAILED] Authentication failed.",
            &[],
        );
        match login().run(&mut transport).unwrap_err() {
            Error::Authentication { code, message } => {
                assert_eq!(code, Some(ResponseCode::AuthenticationFailed));
                assert!(message.contains("Authentication failed"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let mut transport = ScriptedTransport::new(&[]).reply(
            Status::No,
            "LOGIN failure, user name or password rejected",
            &[],
        );
        let err = login().run(&mut transport).unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(err.response_code(), None);
    }

    #[test]
    fn test_login_referral_on_success_and_failure() {
        for status in [Status::Ok, Status::No] {
            let mut transport = ScriptedTransport::new(&[]).reply(
                status,
                "[REFERRAL imap://jane@example.com;AUTH=PLAIN@10.0.0.2/] This server is down, try another one.",
                &[],
            );
            match login().run(&mut transport).unwrap_err() {
                Error::Referral { url, message } => {
                    assert_eq!(url, "imap://jane@example.com;AUTH=PLAIN@10.0.0.2/");
                    assert_eq!(message, "This server is down, try another one.");
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_id_returns_server_info() {
        let mut transport = ScriptedTransport::new(&["ID"]).ok(&[
            r#"ID ("name" "Dovecot" "version" "2.3" "os" NIL)"#,
        ]);
        let id = Id::new("mailcore", "0.1.0");
        let request = id.encode().unwrap();
        assert_eq!(
            request.args(),
            &[Arg::Raw(r#"("name" "mailcore" "version" "0.1.0")"#.to_string())]
        );
        let info = id.run(&mut transport).unwrap();
        assert_eq!(info.imap_name.as_deref(), Some("Dovecot"));
        assert_eq!(info.imap_version.as_deref(), Some("2.3"));
        assert_eq!(info.os, None);
        assert_eq!(info.host, "imap.example.com");
        assert_eq!(info.port, 143);
    }

    #[test]
    fn test_id_nil_response() {
        let mut transport = ScriptedTransport::new(&["ID"]).ok(&["ID NIL"]);
        let info = Id::new("mailcore", "0.1.0").run(&mut transport).unwrap();
        assert_eq!(info.imap_name, None);
    }

    #[test]
    fn test_scalix_id() {
        let command = XScalixId::new("mailcore", "0.1.0");
        assert_eq!(
            command.encode().unwrap().args(),
            &[Arg::Raw(
                r#"("name" "mailcore" "version" "0.1.0" all-sender-ia "")"#.to_string()
            )]
        );
        let mut transport = ScriptedTransport::new(&["X-SCALIX-1"]).ok(&[
            r#"X-SCALIX-ID ("name" "Scalix" "all-sender-ia" "jane@example.com")"#,
        ]);
        let pairs = command.run(&mut transport).unwrap();
        assert_eq!(pairs.get("name").map(String::as_str), Some("Scalix"));
        assert_eq!(
            pairs.get("all-sender-ia").map(String::as_str),
            Some("jane@example.com")
        );
    }

    #[test]
    fn test_namespace() {
        let mut transport = ScriptedTransport::new(&["NAMESPACE"]).ok(&[
            r#"NAMESPACE (("" "/")) (("Other Users/" "/")) NIL"#,
        ]);
        let namespaces = Namespace.run(&mut transport).unwrap();
        assert_eq!(namespaces.private[0].prefix, "");
        assert_eq!(namespaces.private[0].separator.as_deref(), Some("/"));
        assert_eq!(namespaces.other_users[0].prefix, "Other Users/");
        assert!(namespaces.public_folders.is_empty());

        let mut transport = ScriptedTransport::new(&[]).ok(&[]);
        assert!(matches!(
            Namespace.run(&mut transport),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_capability() {
        let mut transport =
            ScriptedTransport::new(&[]).ok(&["CAPABILITY IMAP4rev1 X-SCALIX-1 AUTH=PLAIN"]);
        let caps = Capability.run(&mut transport).unwrap();
        assert!(caps.supports("X-SCALIX-ID"));
        assert!(caps.supports("auth=plain"));
    }
}
