//! Error types for the client connection engine.
//!
//! Errors never unwind through the connection task. They are routed to the
//! exception sink, whose consumer runs user code on its own worker, and the
//! engine transitions toward `Closed` when an error ends the connection.

use std::time::Duration;

use thiserror::Error;

/// Convenience type alias for Results using [`ClientError`].
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Top-level client errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// TCP or TLS establishment failed. The reconnect supervisor decides
    /// whether a new attempt is scheduled.
    #[error("connection failed: {0}")]
    Connection(#[source] std::io::Error),

    /// The TLS handshake itself failed. Reconnect is disabled for this
    /// client, a broken handshake will not heal on retry.
    #[error("tls handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    /// A socket write failed. Treated as an abrupt close.
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    /// An inbound line could not be split into prefix, command and
    /// parameters. The connection continues.
    #[error("invalid line: {line}")]
    Protocol {
        /// The raw line as received, terminator stripped.
        line: String,
        /// The underlying tokenizer error.
        #[source]
        cause: LineParseError,
    },

    /// No inbound data within the reader-idle window. Treated as an abrupt
    /// close with reconnect.
    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),

    /// Unrecoverable TLS material error at construction time. Surfaced once,
    /// reconnect disabled.
    #[error("fatal tls configuration error: {0}")]
    Fatal(String),

    /// Other I/O error on the connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// True when a new connection attempt cannot succeed and the supervisor
    /// must not schedule one.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::Tls(_))
    }
}

/// Errors encountered when tokenizing an inbound line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LineParseError {
    /// Line was empty after terminator stripping.
    #[error("empty line")]
    EmptyLine,

    /// Command was missing or contained non-alphanumeric characters.
    #[error("invalid command")]
    InvalidCommand,

    /// Prefix marker present but no prefix body.
    #[error("invalid prefix")]
    InvalidPrefix,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::Protocol {
            line: "???".to_string(),
            cause: LineParseError::InvalidCommand,
        };
        assert_eq!(format!("{}", err), "invalid line: ???");
    }

    #[test]
    fn test_error_source_chaining() {
        let err = ClientError::Protocol {
            line: String::new(),
            cause: LineParseError::EmptyLine,
        };
        let source = std::error::Error::source(&err);
        assert!(source.is_some());
        assert_eq!(source.unwrap().to_string(), "empty line");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ClientError::Fatal("bad key".into()).is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!ClientError::Connection(io).is_fatal());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: ClientError = io.into();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
