//! # mailcore-imap
//!
//! A blocking IMAP4rev1 client protocol engine.
//!
//! ## Features
//!
//! - **Response tokenizer**: turns response lines with pre-extracted
//!   literals into atoms, strings, numbers, NIL and nested lists
//! - **FETCH item registry**: maps data items onto typed values, including
//!   ENVELOPE and a navigable BODYSTRUCTURE tree
//! - **Query builders**: FETCH, SEARCH and STORE arguments with compact
//!   sequence-set encoding
//! - **Typed commands**: LOGIN with referral detection, ID, LIST, SELECT,
//!   APPEND with create-on-TRYCREATE and more
//! - **Capability-gated session**: commands run only inside an entered scope,
//!   on an open connection, with a selected folder where needed
//! - **TLS via rustls**: implicit TLS or STARTTLS without OpenSSL
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailcore_imap::{Config, ConnectionSession, Credentials, FetchQuery};
//!
//! fn main() -> mailcore_imap::Result<()> {
//!     let config = Config::new("imap.example.com");
//!     let session = ConnectionSession::connect(config, Credentials::new("jane", "secret"))?;
//!
//!     let _entered = session.enter()?;
//!     for folder in session.folders(true)? {
//!         println!("{}: {} unseen of {}", folder.name(), folder.unseen(), folder.total());
//!     }
//!
//!     let inbox = session.folder_by_name("INBOX")?;
//!     let query = FetchQuery::all("1:*", false).body_structure();
//!     for message in session.messages(&inbox, &query, false)? {
//!         if let Some(envelope) = message.envelope() {
//!             println!("{:?}", envelope.subject);
//!         }
//!     }
//!
//!     session.close()
//! }
//! ```
//!
//! ## Modules
//!
//! - [`parser`]: tokenizer, FETCH item registry and untagged bookkeeping
//! - [`types`]: folders, envelopes, body structures and fetched messages
//! - [`query`]: FETCH/SEARCH/STORE builders and the sequence-set codec
//! - [`command`]: typed commands and request serialization
//! - [`connection`]: configuration, transport and the session
//! - [`encoding`]: RFC 2047 header decoding

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod encoding;
mod error;
pub mod parser;
pub mod query;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use command::Command;
pub use connection::{
    Config, ConfigBuilder, ConnectionSession, Connector, Credentials, Security, StreamTransport,
    TcpConnector, Transport,
};
pub use error::{Error, ResponseCode, Result};
pub use parser::{Token, tokenize};
pub use query::{FetchQuery, IdSet, SearchQuery, StoreQuery};
pub use types::{BodyStructure, Capabilities, Envelope, FetchedMessage, Folder, MailboxStats};
