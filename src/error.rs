//! Error types for transport and client operations.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::client::Role;

/// Errors raised while moving frames over a connection.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The TCP connection could not be established in time.
    #[error("connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Address that was dialed.
        addr: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The peer closed the stream.
    #[error("EOF")]
    Eof,

    /// Underlying socket error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A frame could not be encoded or decoded.
    #[error("malformed frame: {0}")]
    Frame(#[from] serde_json::Error),
}

impl TransportError {
    /// Returns `true` if the error means the connection is gone and a fresh
    /// one may succeed: end-of-stream, broken pipe, reset or abort.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::Eof => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            TransportError::ConnectTimeout { .. } | TransportError::Frame(_) => false,
        }
    }
}

/// Returns `true` if an `ERR` message reports end-of-stream or a broken pipe.
///
/// Servers and proxies relay transport failures as plain text, so the
/// message is matched loosely.
pub fn is_transport_fault(message: &str) -> bool {
    let message = message.trim();
    message == "EOF" || message.to_ascii_lowercase().contains("broken pipe")
}

/// Errors surfaced by [`Client`](crate::Client) operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not open a connection to the server.
    #[error("could not connect to {addr}: {source}")]
    Connect {
        /// `host:port` that was dialed.
        addr: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The server rejected the handshake.
    #[error("could not complete the handshake: {message}")]
    Handshake {
        /// Channel role the handshake was for.
        role: Role,
        /// Message returned by the server.
        message: String,
    },

    /// A transport failure that reconnecting cannot fix.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The client was closed.
    #[error("client is closed")]
    Closed,
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
