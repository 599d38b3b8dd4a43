//! Client configuration.
//!
//! A [`ClientConfig`] is a frozen bag of options consumed when a connection
//! is established. Runtime-tunable values (`message_delay`, the intended
//! nick) live on the client itself, not here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one client connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Diagnostic label for this client. Not visible on the wire; carried
    /// through tracing spans.
    pub name: String,
    /// Server hostname or address.
    pub server_host: String,
    /// Server port.
    pub server_port: u16,
    /// Optional local address to bind before connecting.
    pub bind_address: Option<SocketAddr>,
    /// Whether to wrap the connection in TLS.
    pub tls: bool,
    /// Client certificate chain (PEM), for TLS client authentication.
    pub tls_cert_chain: Option<PathBuf>,
    /// Client private key (PEM).
    pub tls_key: Option<PathBuf>,
    /// Passphrase for the private key.
    pub tls_key_password: Option<String>,
    /// Nickname to register with and to maintain.
    pub nick: String,
    /// Username (ident) for the `USER` command.
    pub username: String,
    /// Real name (GECOS) for the `USER` command.
    pub realname: String,
    /// Server password, sent as `PASS` before registration when present.
    pub server_password: Option<String>,
    /// Initial delay between paced outbound lines.
    pub message_delay: Duration,
    /// Capabilities to request during negotiation. `None` requests every
    /// capability this client knows how to consume.
    pub requested_caps: Option<Vec<String>>,
    /// Window without inbound data before the connection is considered
    /// dead and recycled.
    pub reader_idle: Duration,
    /// Window without traffic in either direction before a keepalive ping.
    pub ping_idle: Duration,
    /// How long to wait for a `CAP LS` reply before giving up on
    /// negotiation.
    pub cap_timeout: Duration,
    /// Delay before a reconnect attempt after an abnormal close.
    pub reconnect_delay: Duration,
}

/// Default delay between paced outbound lines.
pub const DEFAULT_MESSAGE_DELAY: Duration = Duration::from_millis(1200);

/// Default reader-idle window.
pub const DEFAULT_READER_IDLE: Duration = Duration::from_secs(250);

/// Default all-idle window before a keepalive ping.
pub const DEFAULT_PING_IDLE: Duration = Duration::from_secs(60);

/// Default `CAP LS` reply timeout.
pub const DEFAULT_CAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default delay before reconnecting.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

impl ClientConfig {
    /// Start building a configuration for the given server and nick.
    pub fn builder(server_host: impl Into<String>, nick: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(server_host, nick)
    }

    /// The `(host, port)` pair for address resolution.
    pub fn server_addr(&self) -> (&str, u16) {
        (self.server_host.as_str(), self.server_port)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    fn new(server_host: impl Into<String>, nick: impl Into<String>) -> Self {
        let nick = nick.into();
        Self {
            config: ClientConfig {
                name: "unnamed".to_string(),
                server_host: server_host.into(),
                server_port: 6667,
                bind_address: None,
                tls: false,
                tls_cert_chain: None,
                tls_key: None,
                tls_key_password: None,
                username: nick.clone(),
                realname: nick.clone(),
                nick,
                server_password: None,
                message_delay: DEFAULT_MESSAGE_DELAY,
                requested_caps: None,
                reader_idle: DEFAULT_READER_IDLE,
                ping_idle: DEFAULT_PING_IDLE,
                cap_timeout: DEFAULT_CAP_TIMEOUT,
                reconnect_delay: DEFAULT_RECONNECT_DELAY,
            },
        }
    }

    /// Diagnostic label for logging.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Server port. Defaults to 6667.
    pub fn port(mut self, port: u16) -> Self {
        self.config.server_port = port;
        self
    }

    /// Local address to bind before connecting.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = Some(addr);
        self
    }

    /// Enable TLS.
    pub fn tls(mut self, tls: bool) -> Self {
        self.config.tls = tls;
        self
    }

    /// Client certificate chain and key for TLS client authentication.
    pub fn tls_client_cert(
        mut self,
        cert_chain: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
        key_password: Option<String>,
    ) -> Self {
        self.config.tls_cert_chain = Some(cert_chain.into());
        self.config.tls_key = Some(key.into());
        self.config.tls_key_password = key_password;
        self
    }

    /// Username (ident). Defaults to the nick.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    /// Real name. Defaults to the nick.
    pub fn realname(mut self, realname: impl Into<String>) -> Self {
        self.config.realname = realname.into();
        self
    }

    /// Server password, sent as `PASS`.
    pub fn server_password(mut self, password: impl Into<String>) -> Self {
        self.config.server_password = Some(password.into());
        self
    }

    /// Initial delay between paced outbound lines. Defaults to 1200 ms.
    pub fn message_delay(mut self, delay: Duration) -> Self {
        self.config.message_delay = delay;
        self
    }

    /// Restrict capability negotiation to this set.
    pub fn request_caps(mut self, caps: Vec<String>) -> Self {
        self.config.requested_caps = Some(caps);
        self
    }

    /// Override the reader-idle window. Defaults to 250 s.
    pub fn reader_idle(mut self, window: Duration) -> Self {
        self.config.reader_idle = window;
        self
    }

    /// Override the all-idle keepalive window. Defaults to 60 s.
    pub fn ping_idle(mut self, window: Duration) -> Self {
        self.config.ping_idle = window;
        self
    }

    /// Override the `CAP LS` reply timeout. Defaults to 10 s.
    pub fn cap_timeout(mut self, timeout: Duration) -> Self {
        self.config.cap_timeout = timeout;
        self
    }

    /// Override the reconnect delay. Defaults to 5 s.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Freeze the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
