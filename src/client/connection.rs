//! Physical connections: dialing, framing and the handshake.
//!
//! A [`Connection`] wraps one TCP stream to the server. It is owned by
//! exactly one channel and is replaced wholesale on reconnect.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::client::state::{ChannelState, StateCell};
use crate::codec;
use crate::error::{ClientError, ClientResult, TransportError};
use crate::wire::{Command, Response};
use crate::HANDSHAKE_COMMAND;

/// Source of process-unique connection ids.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Server address a client dials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Purpose of a connection, announced to the server in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Synchronous command/response traffic.
    Command,
    /// Server-pushed notifications.
    Watch,
}

impl Role {
    /// Wire name sent as the second handshake argument.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Command => "command",
            Role::Watch => "watch",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open duplex stream to the server.
pub struct Connection {
    id: u64,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

impl Connection {
    /// Dials `endpoint`, giving up after `connect_timeout`.
    pub async fn open(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Self, TransportError> {
        let addr = endpoint.to_string();
        let stream = match timeout(connect_timeout, TcpStream::connect(&addr)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    addr,
                    timeout: connect_timeout,
                })
            }
        };
        // Frames are small and latency-bound.
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = stream.into_split();
        Self {
            id,
            reader: BufReader::new(reader),
            writer,
            line: String::new(),
        }
    }

    /// Process-unique id of this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sends one command frame.
    pub async fn send(&mut self, command: &Command) -> Result<(), TransportError> {
        codec::write_command(&mut self.writer, command).await
    }

    /// Waits for the next result frame.
    pub async fn receive(&mut self) -> Result<Response, TransportError> {
        codec::read_response(&mut self.reader, &mut self.line).await
    }

    /// Sends `command` and waits for its result.
    pub async fn exchange(&mut self, command: &Command) -> Result<Response, TransportError> {
        self.send(command).await?;
        self.receive().await
    }

    /// Binds this connection to `identity` in the given role.
    ///
    /// The server must answer `OK`; an `ERR` becomes
    /// [`ClientError::Handshake`] carrying the server's message.
    pub async fn handshake(&mut self, identity: &str, role: Role) -> ClientResult<()> {
        let command = Command::new(HANDSHAKE_COMMAND, [identity, role.as_str()]);
        let response = self.exchange(&command).await?;
        if response.is_err() {
            return Err(ClientError::Handshake {
                role,
                message: response.message,
            });
        }
        Ok(())
    }

    /// Shuts down the write half and drops the stream.
    pub async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("connection {}: shutdown failed: {}", self.id, e);
        }
    }
}

/// Dials and handshakes a connection for `role`, tracking progress in
/// `state`.
///
/// On failure the state is left at `Faulted` and the half-open connection
/// is dropped.
pub(crate) async fn establish(
    endpoint: &Endpoint,
    connect_timeout: Duration,
    identity: &str,
    role: Role,
    state: &StateCell,
) -> ClientResult<Connection> {
    state.set(ChannelState::Connecting);
    let mut conn = match Connection::open(endpoint, connect_timeout).await {
        Ok(conn) => conn,
        Err(source) => {
            state.set(ChannelState::Faulted);
            return Err(ClientError::Connect {
                addr: endpoint.to_string(),
                source,
            });
        }
    };

    state.set(ChannelState::Handshaking);
    if let Err(e) = conn.handshake(identity, role).await {
        state.set(ChannelState::Faulted);
        conn.close().await;
        return Err(e);
    }

    tracing::debug!(
        "connection {} to {} ready as {} for {}",
        conn.id(),
        endpoint,
        role,
        identity
    );
    state.set(ChannelState::Ready);
    Ok(conn)
}
