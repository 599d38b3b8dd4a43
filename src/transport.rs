//! Socket transport.
//!
//! One TCP connection, optionally TLS-wrapped, framed into protocol lines
//! by [`LineCodec`]. The transport owns connect-time socket options: an
//! optional local bind, `TCP_NODELAY`, and kernel keepalive.

use futures_util::{SinkExt, StreamExt};
use socket2::{SockRef, TcpKeepalive};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::codec::LineCodec;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::tls::{self, TrustDecider};

/// A connected, line-framed transport.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum Transport {
    /// Plain TCP.
    Tcp {
        /// The framed stream.
        framed: Framed<TcpStream, LineCodec>,
    },
    /// TLS over TCP.
    Tls {
        /// The framed stream.
        framed: Framed<TlsStream<TcpStream>, LineCodec>,
    },
}

impl Transport {
    /// Establish a connection per the configuration.
    ///
    /// TCP failures come back as [`ClientError::Connection`]; a failed TLS
    /// handshake as [`ClientError::Tls`].
    pub async fn connect(
        config: &ClientConfig,
        decider: Arc<dyn TrustDecider>,
    ) -> Result<Self, ClientError> {
        let stream = Self::connect_plain(config).await?;
        if config.tls {
            Self::tls_upgrade(stream, config, decider).await
        } else {
            Ok(Self::tcp(stream))
        }
    }

    /// Wrap an established plain stream.
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp {
            framed: Framed::new(stream, LineCodec::new()),
        }
    }

    /// Run the TLS handshake over an established stream and wrap it.
    pub(crate) async fn tls_upgrade(
        stream: TcpStream,
        config: &ClientConfig,
        decider: Arc<dyn TrustDecider>,
    ) -> Result<Self, ClientError> {
        let connector = tls::connector(config, decider)?;
        let name = tls::server_name(&config.server_host)?;
        debug!(host = %config.server_host, "starting tls handshake");
        let tls_stream = connector
            .connect(name, stream)
            .await
            .map_err(ClientError::Tls)?;
        Ok(Self::Tls {
            framed: Framed::new(tls_stream, LineCodec::new()),
        })
    }

    /// Open the TCP connection with the configured bind address and socket
    /// options, TLS not yet applied.
    pub(crate) async fn connect_plain(config: &ClientConfig) -> Result<TcpStream, ClientError> {
        let mut addrs = lookup_host(config.server_addr())
            .await
            .map_err(ClientError::Connection)?;
        let addr = addrs.next().ok_or_else(|| {
            ClientError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no addresses for {}", config.server_host),
            ))
        })?;

        let stream = match config.bind_address {
            Some(bind) => {
                let socket = if addr.is_ipv4() {
                    TcpSocket::new_v4()
                } else {
                    TcpSocket::new_v6()
                }
                .map_err(ClientError::Connection)?;
                socket.bind(bind).map_err(ClientError::Connection)?;
                socket.connect(addr).await.map_err(ClientError::Connection)?
            }
            None => TcpStream::connect(addr)
                .await
                .map_err(ClientError::Connection)?,
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("failed to set TCP_NODELAY: {}", e);
        }
        if let Err(e) = Self::enable_keepalive(&stream) {
            warn!("failed to enable TCP keepalive: {}", e);
        }
        Ok(stream)
    }

    fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
        let sock = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(120))
            .with_interval(Duration::from_secs(30));
        sock.set_tcp_keepalive(&keepalive)
    }

    /// True when the connection is TLS-wrapped.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    /// Read the next inbound frame. `None` means the peer closed.
    pub async fn read_line(&mut self) -> Result<Option<String>, ClientError> {
        let next = match self {
            Self::Tcp { framed } => framed.next().await,
            Self::Tls { framed } => framed.next().await,
        };
        match next {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Frame and flush one outbound line.
    pub async fn write_line(&mut self, line: String) -> Result<(), ClientError> {
        let result = match self {
            Self::Tcp { framed } => framed.send(line).await,
            Self::Tls { framed } => framed.send(line).await,
        };
        result.map_err(|e| match e {
            ClientError::Io(io) => ClientError::Write(io),
            other => other,
        })
    }

    /// Close the connection, flushing nothing further.
    pub async fn close(&mut self) {
        let result = match self {
            Self::Tcp { framed } => framed.close().await,
            Self::Tls { framed } => framed.close().await,
        };
        if let Err(e) = result {
            debug!("error closing transport: {}", e);
        }
    }
}
