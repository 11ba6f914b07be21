//! The resilient client.
//!
//! A [`Client`] binds one logical identity to up to two physical
//! connections:
//!
//! - the **command channel**, used for synchronous command/response
//!   exchanges through [`Client::fire`];
//! - the **watch channel**, opened lazily by [`Client::watch`], which
//!   delivers server-pushed results through a [`WatchStream`].
//!
//! Both channels survive connection loss: an end-of-stream or broken-pipe
//! fault makes the channel dial again, repeat the handshake under the same
//! identity and carry on. Command-level `ERR` results from the server are
//! never treated as faults.
//!
//! # Example
//!
//! ```no_run
//! use dicedb_client::{Client, ClientOptions};
//!
//! # async fn example() -> Result<(), dicedb_client::ClientError> {
//! let client = Client::connect("localhost", 7379, ClientOptions::default()).await?;
//! let pong = client.fire_string("PING").await;
//! assert!(pong.is_ok());
//!
//! let watch = client.watch().await?;
//! while let Some(item) = watch.next().await {
//!     println!("{}", item?);
//! }
//! # Ok(())
//! # }
//! ```

mod command;
pub mod connection;
pub mod state;
mod watch;

pub use connection::{Connection, Endpoint, Role};
pub use state::ChannelState;
pub use watch::{WatchItem, WatchStream};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::ClientResult;
use crate::wire::{Command, Response};
use crate::CONNECT_TIMEOUT;
use command::CommandChannel;
use watch::WatchChannel;

/// Options applied when creating a [`Client`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// Logical identity to present in handshakes. A fresh UUID is generated
    /// when unset or empty.
    pub identity: Option<String>,
    /// Upper bound on consecutive reconnects for one fault chain. `None`
    /// reconnects for as long as the server keeps accepting.
    pub max_reconnects: Option<u32>,
}

impl ClientOptions {
    /// Uses `identity` instead of a generated one.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Caps consecutive reconnects per fault chain.
    pub fn with_max_reconnects(mut self, max: u32) -> Self {
        self.max_reconnects = Some(max);
        self
    }
}

/// Generates a fresh logical identity.
pub fn new_identifier() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// State shared by the client and its channels.
pub(crate) struct Shared {
    pub(crate) endpoint: Endpoint,
    pub(crate) identity: String,
    pub(crate) options: ClientOptions,
    pub(crate) connect_timeout: Duration,
    /// Serializes reconnect attempts of this client's channels.
    pub(crate) reconnect_lock: Mutex<()>,
}

/// Client for a command-execution server.
///
/// `Client` is `Send + Sync`; share it behind an `Arc` to fire from several
/// tasks. Concurrent `fire` calls are serialized on the command connection.
pub struct Client {
    shared: Arc<Shared>,
    command: CommandChannel,
    watch: Mutex<Option<WatchChannel>>,
}

impl Client {
    /// Connects to `host:port` and performs the command handshake.
    ///
    /// Dialing gives up after [`CONNECT_TIMEOUT`]. If the server answers the
    /// handshake with `ERR`, creation fails with
    /// [`ClientError::Handshake`](crate::ClientError::Handshake) carrying the
    /// server's message.
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        options: ClientOptions,
    ) -> ClientResult<Self> {
        let identity = match options.identity.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => new_identifier(),
        };
        let shared = Arc::new(Shared {
            endpoint: Endpoint::new(host, port),
            identity,
            options,
            connect_timeout: CONNECT_TIMEOUT,
            reconnect_lock: Mutex::new(()),
        });

        let command = CommandChannel::connect(Arc::clone(&shared)).await?;
        tracing::info!(
            "connected to {} as {}",
            shared.endpoint,
            shared.identity
        );

        Ok(Self {
            shared,
            command,
            watch: Mutex::new(None),
        })
    }

    /// Logical identity presented in every handshake. Stable across
    /// reconnects.
    pub fn identity(&self) -> &str {
        &self.shared.identity
    }

    /// Server address.
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// State of the command channel.
    pub fn state(&self) -> ChannelState {
        self.command.state()
    }

    /// Id of the current command connection, `None` once closed.
    ///
    /// The id changes whenever the channel reconnects.
    pub async fn connection_id(&self) -> Option<u64> {
        self.command.connection_id().await
    }

    /// Runs `command` and returns the server's result.
    ///
    /// Transport failures never escape as errors: end-of-stream and
    /// broken-pipe faults trigger a reconnect and a retry, and anything that
    /// cannot be recovered comes back as an `ERR` response whose message is
    /// the failure text.
    pub async fn fire(&self, command: &Command) -> Response {
        self.command.fire(command).await
    }

    /// Parses `text` as `NAME arg1 arg2 ...` and fires it.
    ///
    /// Blank input returns `ERR "empty command"` without contacting the
    /// server.
    pub async fn fire_string(&self, text: &str) -> Response {
        match Command::parse(text) {
            Some(command) => self.fire(&command).await,
            None => Response::err("empty command"),
        }
    }

    /// Opens the watch channel on first use and returns its stream.
    ///
    /// Later calls return a handle to the same stream without opening
    /// another connection. If opening fails, nothing is kept and a later
    /// call tries again.
    pub async fn watch(&self) -> ClientResult<WatchStream> {
        let mut slot = self.watch.lock().await;
        if let Some(channel) = slot.as_ref() {
            return Ok(channel.stream());
        }

        let channel = WatchChannel::open(Arc::clone(&self.shared)).await?;
        tracing::info!("watch channel open for {}", self.shared.identity);
        let stream = channel.stream();
        *slot = Some(channel);
        Ok(stream)
    }

    /// Closes the command connection.
    ///
    /// An established watch channel keeps running until the client is
    /// dropped. Calling `close` twice is harmless.
    pub async fn close(&self) {
        self.command.close().await;
        tracing::debug!("client {} closed", self.shared.identity);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(channel) = self.watch.get_mut().as_ref() {
            channel.abort();
        }
    }
}
