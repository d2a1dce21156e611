//! Connection configuration types.

use std::fmt;
use std::time::Duration;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 143). **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 143).
    StartTls,
    /// TLS from the start (port 993). **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

/// Default number of login referrals followed before giving up.
pub const DEFAULT_MAX_REFERRALS: u32 = 10;

/// IMAP connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read/write timeout.
    pub io_timeout: Duration,
    /// Client name sent with ID.
    pub client_name: String,
    /// Client version sent with ID.
    pub client_version: String,
    /// Referral redirects followed during login.
    pub max_referrals: u32,
    /// Prefix of command tags.
    pub tag_prefix: String,
}

impl Config {
    /// Creates a new configuration with implicit TLS on port 993.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Copy of this configuration pointing at another endpoint.
    #[must_use]
    pub fn with_endpoint(&self, host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..self.clone()
        }
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    connect_timeout: Duration,
    io_timeout: Duration,
    client_name: String,
    client_version: String,
    max_referrals: u32,
    tag_prefix: String,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            max_referrals: DEFAULT_MAX_REFERRALS,
            tag_prefix: "A".to_string(),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the name and version announced through ID.
    #[must_use]
    pub fn client(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_name = name.into();
        self.client_version = version.into();
        self
    }

    /// Sets how many login referrals are followed.
    #[must_use]
    pub const fn max_referrals(mut self, max: u32) -> Self {
        self.max_referrals = max;
        self
    }

    /// Sets the command tag prefix.
    #[must_use]
    pub fn tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            client_name: self.client_name,
            client_version: self.client_version,
            max_referrals: self.max_referrals,
            tag_prefix: self.tag_prefix,
        }
    }
}

/// Login credentials.
///
/// `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// User name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
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
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::None.default_port(), 143);
        assert_eq!(Security::StartTls.default_port(), 143);
        assert_eq!(Security::Implicit.default_port(), 993);
    }

    #[test]
    fn test_config_new() {
        let config = Config::new("imap.example.com");
        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Implicit);
        assert_eq!(config.max_referrals, DEFAULT_MAX_REFERRALS);
        assert_eq!(config.client_name, "mailcore-imap");
        assert_eq!(config.tag_prefix, "A");
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("imap.example.com")
            .security(Security::StartTls)
            .connect_timeout(Duration::from_secs(10))
            .client("archiver", "2.1")
            .max_referrals(3)
            .tag_prefix("MC")
            .build();

        assert_eq!(config.port, 143);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.client_name, "archiver");
        assert_eq!(config.client_version, "2.1");
        assert_eq!(config.max_referrals, 3);
        assert_eq!(config.tag_prefix, "MC");
    }

    #[test]
    fn test_with_endpoint() {
        let config = Config::builder("a.example.com").port(1993).build();
        let moved = config.with_endpoint("b.example.com", 993);
        assert_eq!(moved.host, "b.example.com");
        assert_eq!(moved.port, 993);
        assert_eq!(moved.security, config.security);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("jane", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("jane"));
        assert!(!debug.contains("hunter2"));
    }
}
