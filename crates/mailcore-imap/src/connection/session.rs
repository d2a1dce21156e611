//! High-level IMAP session.
//!
//! [`ConnectionSession`] owns one logged-in connection together with the
//! negotiated capabilities. Every command goes through [`ConnectionSession::execute`],
//! which refuses to touch the wire unless:
//!
//! - the server advertised the command,
//! - the calling thread has entered the session (see [`ConnectionSession::enter`]),
//! - the session is still open,
//! - a folder is selected, for commands that need one.
//!
//! All operations take `&self`, so a session can be shared between threads
//! by reference or through an `Arc`. Entering is what serializes them: a
//! thread that has not entered is refused, and a second thread calling
//! `enter` blocks until the first one leaves.
//!
//! ## Example
//!
//! ```no_run
//! use mailcore_imap::connection::{Config, ConnectionSession, Credentials};
//! use mailcore_imap::query::FetchQuery;
//!
//! # fn main() -> mailcore_imap::Result<()> {
//! let config = Config::new("imap.example.com");
//! let session = ConnectionSession::connect(config, Credentials::new("jane", "secret"))?;
//!
//! let _entered = session.enter()?;
//! let inbox = session.folder_by_name("INBOX")?;
//! let messages = session.messages(&inbox, &FetchQuery::fast("1:10", false), false)?;
//! # drop(messages);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use regex::Regex;
use tracing::{info, warn};

use super::client::{Connector, StreamTransport, TcpConnector};
use super::lock::{Entered, EntryLock};
use super::stream::ImapStream;
use super::{Config, Credentials, Transport};
use crate::command::{
    Append, Close, Command, Create, Delete, DeleteMessage, Examine, Expunge, Fetch, Id, List,
    Login, Namespace, Rename, Search, Select, Store, Unselect, UpdateMessage, XScalixId,
};
use crate::query::{FetchQuery, IdSet, SearchQuery, StoreQuery};
use crate::types::{Capabilities, FetchedMessage, Folder, MailboxStats, Namespaces, ServerInfo};
use crate::{Error, Result};

static IMAP_URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?P<protocol>.+?)://(?P<username>.+?);(?P<auth>.+?)@(?P<host>.*)").ok()
});

/// Host and optional port named by a referral URL.
fn referral_target(url: &str) -> Option<(String, Option<u16>)> {
    let caps = IMAP_URL.as_ref()?.captures(url)?;
    let host = caps["host"].trim_end_matches('/');
    let host = host.split_once('/').map_or(host, |(host, _)| host);
    if host.is_empty() {
        return None;
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() => match port.parse() {
            Ok(port) => Some((name.to_string(), Some(port))),
            Err(_) => Some((host.to_string(), None)),
        },
        _ => Some((host.to_string(), None)),
    }
}

/// Connection state touched by commands.
///
/// Only locked for the duration of one command, or of one bookkeeping
/// update between commands.
struct SessionState<T> {
    transport: T,
    selected: Option<Folder>,
    opened: bool,
}

impl<T: Transport> SessionState<T> {
    fn close(&mut self) -> Result<()> {
        if !self.opened {
            return Ok(());
        }
        self.opened = false;
        self.selected = None;
        let result = self.transport.shutdown();
        info!(host = self.transport.host(), "session closed");
        result
    }
}

/// A logged-in IMAP connection.
pub struct ConnectionSession<T: Transport> {
    state: Mutex<SessionState<T>>,
    capabilities: Capabilities,
    server_info: Option<ServerInfo>,
    lock: Arc<EntryLock>,
    client_name: String,
    client_version: String,
    host: String,
    port: u16,
}

impl<T: Transport> std::fmt::Debug for ConnectionSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("capabilities", &self.capabilities)
            .field("entered", &self.lock.depth())
            .finish_non_exhaustive()
    }
}

impl ConnectionSession<StreamTransport<ImapStream>> {
    /// Connects over TCP and logs in.
    ///
    /// # Errors
    ///
    /// See [`ConnectionSession::open`].
    pub fn connect(config: Config, credentials: Credentials) -> Result<Self> {
        let connector = TcpConnector::new(config);
        let config = connector.config().clone();
        Self::open(&connector, &config, &credentials)
    }
}

impl<T: Transport> ConnectionSession<T> {
    /// Connects through `connector`, logs in and identifies the client.
    ///
    /// A `[REFERRAL]` login answer reconnects to the referred host, at most
    /// `config.max_referrals` times.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] when the login is rejected,
    /// [`Error::ReferralLimit`] when referrals keep coming, and connection
    /// errors from the connector.
    pub fn open<C>(connector: &C, config: &Config, credentials: &Credentials) -> Result<Self>
    where
        C: Connector<Transport = T>,
    {
        let mut host = config.host.clone();
        let mut port = config.port;
        let mut attempts = 0u32;

        loop {
            let transport = connector.connect(&host, port)?;
            match Self::establish(transport, config, credentials) {
                Err(Error::Referral { url, message }) => {
                    attempts += 1;
                    if attempts > config.max_referrals {
                        return Err(Error::ReferralLimit(config.max_referrals));
                    }
                    let Some((next_host, next_port)) = referral_target(&url) else {
                        return Err(Error::Referral { url, message });
                    };
                    host = next_host;
                    port = next_port.unwrap_or(port);
                    info!(attempt = attempts, host = %host, port, "following login referral");
                }
                other => return other,
            }
        }
    }

    fn establish(mut transport: T, config: &Config, credentials: &Credentials) -> Result<Self> {
        let mut capabilities = transport.capabilities().clone();
        let handshake = Login::new(credentials.clone())
            .run(&mut transport)
            .and_then(|login_caps| {
                capabilities.extend_from(&login_caps);
                info!(host = transport.host(), "logged in");
                if capabilities.supports("ID") {
                    Id::new(config.client_name.as_str(), config.client_version.as_str())
                        .run(&mut transport)
                        .map(Some)
                } else {
                    Ok(None)
                }
            });

        let server_info = match handshake {
            Ok(info) => info,
            Err(err) => {
                if !err.is_fatal()
                    && let Err(logout) = transport.shutdown()
                {
                    warn!(error = %logout, "logout after failed login failed");
                }
                return Err(err);
            }
        };
        transport.untagged().drain();

        Ok(Self {
            host: transport.host().to_string(),
            port: transport.port(),
            state: Mutex::new(SessionState {
                transport,
                selected: None,
                opened: true,
            }),
            capabilities,
            server_info,
            lock: Arc::new(EntryLock::new()),
            client_name: config.client_name.clone(),
            client_version: config.client_version.clone(),
        })
    }

    fn state(&self) -> Result<MutexGuard<'_, SessionState<T>>> {
        self.state
            .lock()
            .map_err(|_| Error::IllegalState("Session state poisoned".to_string()))
    }

    fn set_selected(&self, folder: Option<Folder>) -> Result<()> {
        self.state()?.selected = folder;
        Ok(())
    }

    /// Enters the session on the current thread.
    ///
    /// Commands are only accepted while the returned guard is alive. Entries
    /// nest; other threads block until the outermost guard drops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the lock was poisoned.
    pub fn enter(&self) -> Result<Entered> {
        EntryLock::enter(&self.lock)
    }

    /// Returns true if the current thread has entered the session.
    #[must_use]
    pub fn is_entered(&self) -> bool {
        self.lock.is_held_by_current_thread()
    }

    /// Runs `command` after the capability, entry, open and selection checks.
    ///
    /// Untagged responses the command leaves behind are logged and dropped.
    /// A BYE or I/O failure closes the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCommand`] or [`Error::IllegalState`] when
    /// a check fails, and the command's own error otherwise.
    pub fn execute<C: Command>(&self, command: &C) -> Result<C::Output> {
        let name = command.name();
        if !self.supports(name) {
            return Err(Error::UnsupportedCommand(name.to_string()));
        }
        if !self.is_entered() {
            return Err(Error::IllegalState("Working outside context".to_string()));
        }
        let mut state = self.state()?;
        if !state.opened {
            return Err(Error::IllegalState(
                "Connection was closed. Please recreate.".to_string(),
            ));
        }
        if command.requires_selection() && state.selected.is_none() {
            return Err(Error::IllegalState(format!(
                "{name} requires a selected folder"
            )));
        }

        let result = command.run(&mut state.transport);

        let leftovers = state.transport.untagged().drain();
        if !leftovers.is_empty() {
            let names: Vec<&str> = leftovers.iter().map(|(name, _)| name.as_str()).collect();
            warn!(command = name, ?names, "untagged responses left unconsumed");
        }
        if let Err(err) = &result
            && err.is_fatal()
        {
            warn!(command = name, error = %err, "connection lost");
            state.opened = false;
            state.selected = None;
        }
        result
    }

    /// Returns true if the server supports `name`, ignoring case.
    #[must_use]
    pub fn supports(&self, name: &str) -> bool {
        self.capabilities.supports(name)
    }

    /// Negotiated capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Server details from the ID handshake, when the server supports ID.
    #[must_use]
    pub const fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Currently selected folder.
    #[must_use]
    pub fn selected(&self) -> Option<Folder> {
        self.state().ok()?.selected.clone()
    }

    /// Returns true until the session is closed or the connection is lost.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().is_ok_and(|state| state.opened)
    }

    /// Calls `f` with the underlying transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the session state was poisoned.
    pub fn with_transport<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        Ok(f(&self.state()?.transport))
    }

    /// Lists every folder, optionally with EXAMINE statistics.
    ///
    /// # Errors
    ///
    /// Returns command errors from LIST or EXAMINE.
    pub fn folders(&self, with_stats: bool) -> Result<Vec<Folder>> {
        let folders = self.execute(&List::default())?;
        if !with_stats {
            return Ok(folders);
        }
        folders
            .into_iter()
            .map(|folder| self.update_folder_info(folder))
            .collect()
    }

    /// Statistics of `folder` via EXAMINE; UNSELECTs afterwards when possible.
    ///
    /// # Errors
    ///
    /// Returns command errors from EXAMINE or UNSELECT.
    pub fn folder_stats(&self, folder: &Folder) -> Result<MailboxStats> {
        let stats = self.open_folder(&Examine::new(folder), folder)?;
        if self.supports("UNSELECT") {
            self.execute(&Unselect)?;
            self.set_selected(None)?;
        }
        Ok(stats)
    }

    /// Fills in the statistics of a selectable folder.
    ///
    /// # Errors
    ///
    /// Returns command errors from [`ConnectionSession::folder_stats`].
    pub fn update_folder_info(&self, mut folder: Folder) -> Result<Folder> {
        if folder.selectable() {
            let stats = self.folder_stats(&folder)?;
            folder.set_stats(stats);
        }
        Ok(folder)
    }

    /// Looks a folder up by its unescaped name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty name and
    /// [`Error::NotFound`] when the server lists nothing.
    pub fn folder_by_name(&self, name: &str) -> Result<Folder> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("Folder name is empty".to_string()));
        }
        self.execute(&List::new("", name))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("Folder {name} not found")))
    }

    /// Returns true if the server lists a folder called `name`.
    ///
    /// # Errors
    ///
    /// Returns command errors other than [`Error::NotFound`].
    pub fn folder_exists(&self, name: &str) -> Result<bool> {
        match self.folder_by_name(name) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Creates `name` below `parent` and returns the listed folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for names that may not be created,
    /// and command errors from CREATE or LIST.
    pub fn create_folder(&self, name: &str, parent: Option<&Folder>) -> Result<Folder> {
        let command = Create::new(name, parent)?;
        self.execute(&command)?;
        self.folder_by_name(command.target().name())
    }

    /// Renames `folder` to `name` below `parent` and returns the listed folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for folders that may not be
    /// renamed, and command errors from RENAME or LIST.
    pub fn rename_folder(
        &self,
        folder: &Folder,
        name: &str,
        parent: Option<&Folder>,
    ) -> Result<Folder> {
        let command = Rename::new(folder, name, parent)?;
        self.execute(&command)?;
        {
            let mut state = self.state()?;
            if state.selected.as_ref().is_some_and(|s| s.name() == folder.name()) {
                state.selected = None;
            }
        }
        self.folder_by_name(command.target_name())
    }

    /// Deletes `folder`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for folders that may not be
    /// deleted, and command errors from DELETE.
    pub fn delete_folder(&self, folder: &Folder) -> Result<()> {
        self.execute(&Delete::new(folder)?)
    }

    /// Selects `folder` read-write.
    ///
    /// # Errors
    ///
    /// Returns command errors from SELECT; the selection is cleared on
    /// failure.
    pub fn select_folder(&self, folder: &Folder) -> Result<MailboxStats> {
        self.open_folder(&Select::new(folder), folder)
    }

    fn open_folder<C>(&self, command: &C, folder: &Folder) -> Result<MailboxStats>
    where
        C: Command<Output = MailboxStats>,
    {
        match self.execute(command) {
            Ok(stats) => {
                self.set_selected(Some(folder.clone()))?;
                Ok(stats)
            }
            Err(err) => {
                // A failed SELECT/EXAMINE leaves no folder selected.
                self.set_selected(None)?;
                Err(err)
            }
        }
    }

    /// Leaves the selected folder with UNSELECT, or CLOSE when the server
    /// lacks UNSELECT. Does nothing when no folder is selected.
    ///
    /// # Errors
    ///
    /// Returns command errors from UNSELECT or CLOSE.
    pub fn release_folder(&self) -> Result<()> {
        if self.state()?.selected.is_none() {
            return Ok(());
        }
        if self.supports("UNSELECT") {
            self.execute(&Unselect)?;
        } else {
            self.execute(&Close)?;
        }
        self.set_selected(None)
    }

    /// Selects `folder` and fetches `query` from it.
    ///
    /// With `stay == false` the folder is unselected afterwards when the
    /// server supports UNSELECT.
    ///
    /// # Errors
    ///
    /// Returns command errors from SELECT, FETCH or UNSELECT.
    pub fn messages(
        &self,
        folder: &Folder,
        query: &FetchQuery,
        stay: bool,
    ) -> Result<Vec<FetchedMessage>> {
        self.select_folder(folder)?;
        let messages = self.fetch(query)?;
        if !stay && self.supports("UNSELECT") {
            self.execute(&Unselect)?;
            self.set_selected(None)?;
        }
        Ok(messages)
    }

    /// FETCH (or UID FETCH) in the selected folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] without a selected folder, and
    /// command errors.
    pub fn fetch(&self, query: &FetchQuery) -> Result<Vec<FetchedMessage>> {
        self.execute(&Fetch::new(query.clone()))
    }

    /// SEARCH in the selected folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] without a selected folder, and
    /// command errors.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<u64>> {
        self.execute(&Search::new(query.clone()))
    }

    /// STORE (or UID STORE) in the selected folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] without a selected folder, and
    /// command errors.
    pub fn store(&self, query: &StoreQuery) -> Result<Vec<FetchedMessage>> {
        self.execute(&Store::new(query.clone()))
    }

    /// Appends `message` to `folder`, creating the folder on TRYCREATE.
    ///
    /// Returns the new UID when the server reports APPENDUID.
    ///
    /// # Errors
    ///
    /// Returns command errors from APPEND or CREATE.
    pub fn append_message(
        &self,
        folder: &Folder,
        message: impl Into<Bytes>,
        flags: &[&str],
    ) -> Result<Option<u64>> {
        let append = Append::new(folder.clone(), message).flags(flags.iter().copied());
        self.execute(&append)
    }

    /// Replaces message `old_uid` in the selected folder with `message`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `old_uid` is 0,
    /// [`Error::IllegalState`] when the server reuses `old_uid`, and
    /// command errors from APPEND, STORE or EXPUNGE.
    pub fn update_message(
        &self,
        folder: &Folder,
        message: impl Into<Bytes>,
        flags: &[&str],
        old_uid: u64,
    ) -> Result<Option<u64>> {
        let append = Append::new(folder.clone(), message).flags(flags.iter().copied());
        self.execute(&UpdateMessage::new(append, old_uid))
    }

    /// Flags `uids` as deleted in the selected folder and expunges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] without a selected folder, and
    /// command errors.
    pub fn delete_messages(&self, uids: impl Into<IdSet>) -> Result<()> {
        self.execute(&DeleteMessage::new(uids))
    }

    /// EXPUNGE; returns the expunged sequence numbers.
    ///
    /// # Errors
    ///
    /// Returns command errors.
    pub fn expunge(&self) -> Result<Vec<u64>> {
        self.execute(&Expunge)
    }

    /// NAMESPACE.
    ///
    /// # Errors
    ///
    /// Returns command errors.
    pub fn namespace(&self) -> Result<Namespaces> {
        self.execute(&Namespace)
    }

    /// Scalix user details via X-SCALIX-ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCommand`] on other servers, and command
    /// errors.
    pub fn scalix_id(&self) -> Result<std::collections::BTreeMap<String, String>> {
        let command = XScalixId::new(self.client_name.as_str(), self.client_version.as_str());
        self.execute(&command)
    }

    /// Logs out and closes the connection. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns errors from the logout exchange; the session is closed
    /// regardless.
    pub fn close(&self) -> Result<()> {
        self.state()?.close()
    }
}

impl<T: Transport> Drop for ConnectionSession<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = state.close() {
            warn!(error = %err, "failed to close session");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::cell::RefCell;
    use std::collections::{BTreeMap, VecDeque};
    use std::io;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::ResponseCode;
    use crate::connection::Status;
    use crate::testing::ScriptedTransport;

    const CAPS: &[&str] = &["IMAP4rev1", "UNSELECT", "ID", "NAMESPACE"];

    struct ScriptedConnector {
        transports: RefCell<VecDeque<ScriptedTransport>>,
        endpoints: RefCell<Vec<(String, u16)>>,
    }

    impl ScriptedConnector {
        fn new(transports: Vec<ScriptedTransport>) -> Self {
            Self {
                transports: RefCell::new(transports.into()),
                endpoints: RefCell::new(Vec::new()),
            }
        }
    }

    impl Connector for ScriptedConnector {
        type Transport = ScriptedTransport;

        fn connect(&self, host: &str, port: u16) -> Result<ScriptedTransport> {
            self.endpoints.borrow_mut().push((host.to_string(), port));
            self.transports.borrow_mut().pop_front().ok_or_else(|| {
                Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "no server"))
            })
        }
    }

    fn config() -> Config {
        Config::builder("imap.example.com")
            .port(143)
            .client("mailcore-test", "1.0")
            .build()
    }

    fn credentials() -> Credentials {
        Credentials::new("jane", "secret")
    }

    /// Session whose script continues after LOGIN and ID.
    fn session(caps: &[&str], script: impl FnOnce(ScriptedTransport) -> ScriptedTransport)
    -> ConnectionSession<ScriptedTransport> {
        let mut transport = ScriptedTransport::new(caps).ok(&[]);
        if caps.contains(&"ID") {
            transport = transport.ok(&["ID (\"name\" \"Dovecot\" \"version\" \"2.3\")"]);
        }
        let connector = ScriptedConnector::new(vec![script(transport)]);
        ConnectionSession::open(&connector, &config(), &credentials()).unwrap()
    }

    fn verbs(session: &ConnectionSession<ScriptedTransport>) -> Vec<String> {
        session
            .with_transport(|t| t.verbs().into_iter().map(String::from).collect())
            .unwrap()
    }

    fn folder(name: &str) -> Folder {
        Folder::new(name, Some("/".to_string()), BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_open_logs_in_and_identifies() {
        let session = session(CAPS, |t| t);
        assert_eq!(verbs(&session), vec!["LOGIN", "ID"]);
        let info = session.server_info().unwrap();
        assert_eq!(info.imap_name.as_deref(), Some("Dovecot"));
        assert_eq!(info.host, "imap.example.com");
        assert!(session.supports("fetch"));
        assert!(session.is_open());
    }

    #[test]
    fn test_open_without_id_capability() {
        let session = session(&["IMAP4rev1"], |t| t);
        assert_eq!(verbs(&session), vec!["LOGIN"]);
        assert!(session.server_info().is_none());
    }

    #[test]
    fn test_login_capabilities_are_merged() {
        let transport = ScriptedTransport::new(&["IMAP4rev1"])
            .reply(Status::Ok, "[CAPABILITY IMAP4rev1 X-SCALIX-1] Logged in", &[]);
        let connector = ScriptedConnector::new(vec![transport]);
        let session = ConnectionSession::open(&connector, &config(), &credentials()).unwrap();
        assert!(session.supports("X-SCALIX-ID"));
    }

    #[test]
    fn test_login_failure() {
        let transport = ScriptedTransport::new(CAPS).reply(
            Status::No,
            "[AUTHENTICATIONFAILED] Invalid credentials",
            &[],
        );
        let connector = ScriptedConnector::new(vec![transport]);
        let err = ConnectionSession::open(&connector, &config(), &credentials()).unwrap_err();
        assert!(matches!(
            err,
            Error::Authentication {
                code: Some(ResponseCode::AuthenticationFailed),
                ..
            }
        ));
    }

    #[test]
    fn test_referral_reconnects_to_referred_host() {
        let referred = ScriptedTransport::new(&["IMAP4rev1"]).reply(
            Status::No,
            "[REFERRAL imap://jane;AUTH=*@imap2.example.com:1143/] Try elsewhere",
            &[],
        );
        let target = ScriptedTransport::new(&["IMAP4rev1"]).ok(&[]);
        let connector = ScriptedConnector::new(vec![referred, target]);
        let session = ConnectionSession::open(&connector, &config(), &credentials()).unwrap();
        assert!(session.is_open());
        assert_eq!(
            *connector.endpoints.borrow(),
            vec![
                ("imap.example.com".to_string(), 143),
                ("imap2.example.com".to_string(), 1143),
            ]
        );
    }

    #[test]
    fn test_referral_limit() {
        let referral = || {
            ScriptedTransport::new(&["IMAP4rev1"]).reply(
                Status::No,
                "[REFERRAL imap://jane;AUTH=*@loop.example.com/] Again",
                &[],
            )
        };
        let config = Config::builder("imap.example.com").max_referrals(2).build();
        let connector = ScriptedConnector::new(vec![referral(), referral(), referral()]);
        let err = ConnectionSession::open(&connector, &config, &credentials()).unwrap_err();
        assert!(matches!(err, Error::ReferralLimit(2)));
        assert_eq!(connector.endpoints.borrow().len(), 3);
        assert_eq!(connector.endpoints.borrow()[2].0, "loop.example.com");
    }

    #[test]
    fn test_referral_target() {
        assert_eq!(
            referral_target("imap://user;AUTH=*@host.example.com/"),
            Some(("host.example.com".to_string(), None))
        );
        assert_eq!(
            referral_target("imap://user;AUTH=GSSAPI@10.0.0.7:993/INBOX"),
            Some(("10.0.0.7".to_string(), Some(993)))
        );
        assert_eq!(referral_target("not a url"), None);
    }

    #[test]
    fn test_command_outside_entry_never_reaches_wire() {
        let session = session(CAPS, |t| t.ok(&[]));
        let err = session.namespace().unwrap_err();
        assert!(matches!(err, Error::IllegalState(msg) if msg == "Working outside context"));
        assert_eq!(session.with_transport(ScriptedTransport::pending).unwrap(), 1);
    }

    #[test]
    fn test_unsupported_command() {
        let session = session(&["IMAP4rev1"], |t| t);
        let _entered = session.enter().unwrap();
        assert!(matches!(
            session.scalix_id(),
            Err(Error::UnsupportedCommand(name)) if name == "X-SCALIX-ID"
        ));
    }

    #[test]
    fn test_fetch_requires_selection() {
        let session = session(CAPS, |t| t);
        let _entered = session.enter().unwrap();
        let err = session.fetch(&FetchQuery::uids(1u64)).unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
        let err = session.delete_messages(5u64).unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn test_folder_by_name() {
        let session = session(CAPS, |t| {
            t.ok(&[r#"LIST (\HasNoChildren) "/" "Sent Items""#]).ok(&[])
        });
        let _entered = session.enter().unwrap();
        let sent = session.folder_by_name("Sent Items").unwrap();
        assert_eq!(sent.name(), "Sent Items");
        assert!(matches!(
            session.folder_by_name("Missing"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            session.folder_by_name(""),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_folder_exists() {
        let session = session(CAPS, |t| t.ok(&[r#"LIST () "/" Work"#]).ok(&[]));
        let _entered = session.enter().unwrap();
        assert!(session.folder_exists("Work").unwrap());
        assert!(!session.folder_exists("Play").unwrap());
    }

    #[test]
    fn test_folders_with_stats() {
        let session = session(CAPS, |t| {
            t.ok(&[
                r#"LIST (\HasNoChildren) "/" INBOX"#,
                r#"LIST (\Noselect) "/" Shared"#,
            ])
            .ok(&["4 EXISTS", "0 RECENT", "OK [UNSEEN 2] first unseen"])
            .ok(&[])
        });
        let _entered = session.enter().unwrap();
        let folders = session.folders(true).unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].total(), 4);
        assert_eq!(folders[0].unseen(), 2);
        assert_eq!(folders[1].total(), 0);
        assert_eq!(
            verbs(&session),
            vec!["LOGIN", "ID", "LIST", "EXAMINE", "UNSELECT"]
        );
        assert!(session.selected().is_none());
    }

    #[test]
    fn test_create_folder_lists_result() {
        let session = session(CAPS, |t| {
            t.ok(&[]).ok(&[r#"LIST (\HasNoChildren) "/" "Archive/2024 Q1""#])
        });
        let _entered = session.enter().unwrap();
        let parent = folder("Archive");
        let created = session.create_folder("2024 Q1", Some(&parent)).unwrap();
        assert_eq!(created.name(), "Archive/2024 Q1");
        assert_eq!(verbs(&session)[2..], ["CREATE", "LIST"]);
    }

    #[test]
    fn test_rename_and_delete_folder() {
        let session = session(CAPS, |t| {
            t.ok(&[]).ok(&[r#"LIST () "/" Projects"#]).ok(&[])
        });
        let _entered = session.enter().unwrap();
        let renamed = session
            .rename_folder(&folder("Work"), "Projects", None)
            .unwrap();
        assert_eq!(renamed.name(), "Projects");
        session.delete_folder(&renamed).unwrap();
        assert!(matches!(
            session.delete_folder(&folder("INBOX")),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(verbs(&session)[2..], ["RENAME", "LIST", "DELETE"]);
    }

    #[test]
    fn test_messages_selects_fetches_and_releases() {
        let session = session(CAPS, |t| {
            t.ok(&["2 EXISTS"])
                .ok(&[r"1 FETCH (UID 7 FLAGS (\Seen))", r"2 FETCH (UID 9 FLAGS ())"])
                .ok(&[])
        });
        let _entered = session.enter().unwrap();
        let inbox = folder("INBOX");
        let messages = session
            .messages(&inbox, &FetchQuery::uids("7:9").flags(), false)
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].uid(), Some(7));
        assert!(messages[0].has_flag(r"\Seen"));
        assert_eq!(
            verbs(&session)[2..],
            ["SELECT", "UID FETCH", "UNSELECT"]
        );
        assert!(session.selected().is_none());
    }

    #[test]
    fn test_release_folder_falls_back_to_close() {
        let session = session(&["IMAP4rev1"], |t| t.ok(&["1 EXISTS"]).ok(&[]));
        let _entered = session.enter().unwrap();
        session.release_folder().unwrap();
        session.select_folder(&folder("INBOX")).unwrap();
        assert_eq!(session.selected().as_ref().map(Folder::name), Some("INBOX"));
        session.release_folder().unwrap();
        assert!(session.selected().is_none());
        assert_eq!(verbs(&session)[1..], ["SELECT", "CLOSE"]);
    }

    #[test]
    fn test_failed_select_clears_selection() {
        let session = session(CAPS, |t| {
            t.ok(&["1 EXISTS"])
                .reply(Status::No, "[NONEXISTENT] No such mailbox", &[])
        });
        let _entered = session.enter().unwrap();
        session.select_folder(&folder("INBOX")).unwrap();
        let err = session.select_folder(&folder("Gone")).unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseCode::NonExistent));
        assert!(session.selected().is_none());
        assert!(session.is_open());
    }

    #[test]
    fn test_search_and_store_in_selected_folder() {
        let session = session(CAPS, |t| {
            t.ok(&["3 EXISTS"])
                .ok(&["SEARCH 2 3"])
                .ok(&[r"2 FETCH (UID 12 FLAGS (\Seen \Flagged))"])
        });
        let _entered = session.enter().unwrap();
        session.select_folder(&folder("INBOX")).unwrap();
        let ids = session.search(&SearchQuery::new().unseen()).unwrap();
        assert_eq!(ids, vec![2, 3]);
        let changed = session
            .store(&StoreQuery::sequence(2u64).add([r"\Flagged"]))
            .unwrap();
        assert!(changed[0].has_flag(r"\Flagged"));
    }

    #[test]
    fn test_append_message_with_trycreate() {
        let session = session(CAPS, |t| {
            t.reply(Status::No, "[TRYCREATE] Mailbox does not exist", &[])
                .ok(&[])
                .reply(Status::Ok, "[APPENDUID 38505 3955] APPEND completed", &[])
        });
        let _entered = session.enter().unwrap();
        let uid = session
            .append_message(&folder("Archive"), &b"Subject: hi\r\n\r\nbody"[..], &[r"\Seen"])
            .unwrap();
        assert_eq!(uid, Some(3955));
        assert_eq!(
            verbs(&session)[2..],
            ["APPEND", "CREATE", "APPEND"]
        );
    }

    #[test]
    fn test_update_message_replaces_old_copy() {
        let session = session(CAPS, |t| {
            t.ok(&["3 EXISTS"])
                .reply(Status::Ok, "[APPENDUID 1 20] done", &[])
                .ok(&[])
                .ok(&["3 EXPUNGE"])
        });
        let _entered = session.enter().unwrap();
        let inbox = folder("INBOX");
        session.select_folder(&inbox).unwrap();
        let uid = session
            .update_message(&inbox, &b"new"[..], &[], 12)
            .unwrap();
        assert_eq!(uid, Some(20));
        assert_eq!(
            verbs(&session)[3..],
            ["APPEND", "UID STORE", "EXPUNGE"]
        );
    }

    #[test]
    fn test_namespace() {
        let session = session(CAPS, |t| t.ok(&[r#"NAMESPACE (("" "/")) NIL NIL"#]));
        let _entered = session.enter().unwrap();
        let namespaces = session.namespace().unwrap();
        assert_eq!(namespaces.private.len(), 1);
        assert!(namespaces.public_folders.is_empty());
    }

    #[test]
    fn test_leftover_untagged_responses_are_dropped() {
        let session = session(CAPS, |t| t.ok(&["1 EXISTS"]).ok(&["5 EXISTS"]));
        let _entered = session.enter().unwrap();
        session.select_folder(&folder("INBOX")).unwrap();
        assert!(session.expunge().unwrap().is_empty());
        assert!(session.state().unwrap().transport.untagged().is_empty());
    }

    #[test]
    fn test_bye_closes_session() {
        let session = session(CAPS, |t| t.ok(&["1 EXISTS"]).bye("shutting down"));
        let _entered = session.enter().unwrap();
        session.select_folder(&folder("INBOX")).unwrap();
        assert!(matches!(session.expunge(), Err(Error::Bye(_))));
        assert!(!session.is_open());
        assert!(session.selected().is_none());
        let err = session.expunge().unwrap_err();
        assert!(matches!(err, Error::IllegalState(msg) if msg.contains("closed")));
    }

    #[test]
    fn test_transport_failure_closes_session() {
        let session = session(CAPS, ScriptedTransport::fail);
        let _entered = session.enter().unwrap();
        assert!(matches!(session.namespace(), Err(Error::Io(_))));
        assert!(!session.is_open());
        assert!(matches!(session.namespace(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_close_is_idempotent() {
        let session = session(CAPS, |t| t);
        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(session.with_transport(|t| t.shutdowns).unwrap(), 1);
        let _entered = session.enter().unwrap();
        assert!(matches!(session.expunge(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_nested_entries_keep_context() {
        let session = session(CAPS, |t| t.ok(&["2 EXISTS"]).ok(&[]).ok(&[]));
        let outer = session.enter().unwrap();
        session.select_folder(&folder("INBOX")).unwrap();
        {
            let _inner = session.enter().unwrap();
            session.expunge().unwrap();
        }
        assert!(session.is_entered());
        session.expunge().unwrap();
        drop(outer);
        assert!(!session.is_entered());
        assert_eq!(verbs(&session)[2..], ["SELECT", "EXPUNGE", "EXPUNGE"]);
    }

    #[test]
    fn test_second_thread_waits_for_entry() {
        let namespace = r#"NAMESPACE (("" "/")) NIL NIL"#;
        let session = session(CAPS, |t| t.ok(&[namespace]).ok(&[namespace]));
        let entered = session.enter().unwrap();

        thread::scope(|scope| {
            let shared = &session;
            let (tx, rx) = mpsc::channel();
            let waiter = scope.spawn(move || {
                let refused = matches!(shared.namespace(), Err(Error::IllegalState(_)));
                let _entered = shared.enter().unwrap();
                tx.send(()).unwrap();
                (refused, shared.namespace().map(|ns| ns.private.len()))
            });

            assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
            assert_eq!(session.namespace().unwrap().private.len(), 1);
            drop(entered);

            let (refused, result) = waiter.join().unwrap();
            assert!(refused);
            assert_eq!(result.unwrap(), 1);
        });
        assert_eq!(verbs(&session)[2..], ["NAMESPACE", "NAMESPACE"]);
    }
}
