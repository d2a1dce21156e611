//! Stream types for IMAP connections.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};

use super::Config;
use crate::{Error, Result};

/// A stream that can be either plaintext or TLS.
#[derive(Debug)]
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl ImapStream {
    /// Upgrades a plaintext stream to TLS after a successful STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] when the stream is already encrypted,
    /// and TLS errors from the handshake setup.
    pub fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => Ok(Self::Tls(Box::new(tls_stream(host, tcp)?))),
            Self::Tls(_) => Err(Error::IllegalState("Stream is already TLS".to_string())),
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl Read for ImapStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(buf),
            Self::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for ImapStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.write(buf),
            Self::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.flush(),
            Self::Tls(stream) => stream.flush(),
        }
    }
}

/// Creates a TLS client configuration with the webpki root certificates.
#[must_use]
pub fn tls_config() -> Arc<ClientConfig> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

fn tls_stream(host: &str, tcp: TcpStream) -> Result<StreamOwned<ClientConnection, TcpStream>> {
    let server_name = ServerName::try_from(host.to_string())?;
    let connection = ClientConnection::new(tls_config(), server_name)?;
    Ok(StreamOwned::new(connection, tcp))
}

/// Opens a TCP connection honouring the configured timeouts.
fn connect_tcp(config: &Config) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(tcp) => {
                tcp.set_read_timeout(Some(config.io_timeout))?;
                tcp.set_write_timeout(Some(config.io_timeout))?;
                return Ok(tcp);
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(Error::Io(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address found for {}", config.host),
        )
    })))
}

/// Connects to a server with TLS from the start.
///
/// # Errors
///
/// Returns I/O errors from the connection attempt and TLS setup errors.
pub fn connect_tls(config: &Config) -> Result<ImapStream> {
    let tcp = connect_tcp(config)?;
    Ok(ImapStream::Tls(Box::new(tls_stream(&config.host, tcp)?)))
}

/// Connects to a server without TLS (for STARTTLS or testing).
///
/// # Errors
///
/// Returns I/O errors from the connection attempt.
pub fn connect_plain(config: &Config) -> Result<ImapStream> {
    Ok(ImapStream::Plain(connect_tcp(config)?))
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
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn test_tls_config_without_alpn() {
        let config = tls_config();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn test_invalid_dns_name() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let tcp = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let err = ImapStream::Plain(tcp).upgrade_to_tls("not a host name").unwrap_err();
        assert!(matches!(err, Error::InvalidDnsName(_)));
    }

    #[test]
    fn test_connect_plain_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = Config::builder("127.0.0.1").port(port).build();
        let stream = connect_plain(&config).unwrap();
        assert!(!stream.is_tls());
    }

    #[test]
    fn test_connect_refused_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let config = Config::builder("127.0.0.1").port(port).build();
        assert!(matches!(connect_plain(&config), Err(Error::Io(_))));
    }
}
