//! Resilient client for a command-execution server.
//!
//! This crate keeps a logical client session alive across physical
//! connection loss:
//!
//! - a command channel for synchronous request/response traffic, which
//!   reconnects and retries transparently on end-of-stream or broken-pipe
//!   faults;
//! - an optional watch channel that bridges server-pushed results into an
//!   ordered, unbounded in-process queue.
//!
//! Both channels present the same logical identity in their handshake, so
//! the server can tie a fresh connection back to the session it replaced.
//!
//! # Example
//!
//! ```no_run
//! use dicedb_client::{Client, ClientOptions};
//!
//! # async fn example() -> Result<(), dicedb_client::ClientError> {
//! let client = Client::connect("localhost", 7379, ClientOptions::default()).await?;
//! let response = client.fire_string("SET greeting hello").await;
//! println!("{}", response);
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

/// Client, channels and connection management.
pub mod client;

/// Newline-delimited JSON frame codec.
pub mod codec;

/// Error types.
pub mod error;

/// Tracing subscriber setup for binaries.
pub mod logging;

/// Command and result values.
pub mod wire;

pub use client::{
    new_identifier, ChannelState, Client, ClientOptions, Endpoint, Role, WatchItem, WatchStream,
};
pub use error::{is_transport_fault, ClientError, ClientResult, TransportError};
pub use wire::{Command, Response, Status};

/// Reserved command that binds a connection to an identity and role.
pub const HANDSHAKE_COMMAND: &str = "HANDSHAKE";

/// How long dialing the server may take.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Host used by the CLI when none is given.
pub const DEFAULT_HOST: &str = "localhost";

/// Port used by the CLI when none is given.
pub const DEFAULT_PORT: u16 = 7379;
