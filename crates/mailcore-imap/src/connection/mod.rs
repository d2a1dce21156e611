//! IMAP connection management.
//!
//! This module provides connection handling for IMAP servers, including:
//! - Configuration (host, port, security mode, credentials)
//! - TLS/plaintext stream abstraction
//! - Framed I/O for IMAP protocol
//! - The [`Transport`] contract and its blocking stream implementation
//! - The reentrant entry lock
//! - The capability-gated [`ConnectionSession`]

mod client;
mod config;
mod framed;
mod lock;
mod session;
mod stream;
mod transport;

pub use client::{Connector, StreamTransport, TcpConnector};
pub use config::{Config, ConfigBuilder, Credentials, DEFAULT_MAX_REFERRALS, Security};
pub use framed::{FramedStream, RawResponse};
pub use lock::{Entered, EntryLock};
pub use session::ConnectionSession;
pub use stream::{ImapStream, connect_plain, connect_tls, tls_config};
pub use transport::{Completion, Status, Transport};
