//! Command channel: the Fire protocol and the reconnect-and-retry policy.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::connection::{establish, Connection, Role};
use crate::client::state::{ChannelState, StateCell};
use crate::client::Shared;
use crate::error::{is_transport_fault, ClientResult};
use crate::wire::{Command, Response};

/// Message of the `ERR` returned by `fire` after `close`.
pub(crate) const CLOSED_MESSAGE: &str = "client is closed";

/// Outcome of one exchange on the current connection.
enum Attempt {
    /// Final answer for the caller.
    Done(Response),
    /// Transport fault on the connection with the given id.
    Faulted { response: Response, conn_id: u64 },
}

/// Owns the command connection.
///
/// The connection sits in a swappable cell: `None` once the channel is
/// closed. The cell's lock is held for one full send+receive, so concurrent
/// callers are serialized and never interleave frames.
pub(crate) struct CommandChannel {
    shared: Arc<Shared>,
    conn: Mutex<Option<Connection>>,
    state: StateCell,
}

impl CommandChannel {
    /// Dials and handshakes the command connection.
    pub(crate) async fn connect(shared: Arc<Shared>) -> ClientResult<Self> {
        let state = StateCell::new("command");
        let conn = establish(
            &shared.endpoint,
            shared.connect_timeout,
            &shared.identity,
            Role::Command,
            &state,
        )
        .await?;
        Ok(Self {
            shared,
            conn: Mutex::new(Some(conn)),
            state,
        })
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.state.get()
    }

    pub(crate) async fn connection_id(&self) -> Option<u64> {
        self.conn.lock().await.as_ref().map(Connection::id)
    }

    /// Runs `command`, reconnecting and retrying on transport faults.
    ///
    /// Every fault that is followed by a successful reconnect earns one
    /// retry. Faults chain, so a flapping server keeps the caller here until
    /// `max_reconnects` (if set) runs out.
    pub(crate) async fn fire(&self, command: &Command) -> Response {
        let mut reconnects: u32 = 0;
        loop {
            let (response, conn_id) = match self.attempt(command).await {
                Attempt::Done(response) => return response,
                Attempt::Faulted { response, conn_id } => (response, conn_id),
            };

            if let Some(max) = self.shared.options.max_reconnects {
                if reconnects >= max {
                    tracing::warn!(
                        "giving up on {} after {} reconnects: {}",
                        command.cmd,
                        reconnects,
                        response.message
                    );
                    return response;
                }
            }

            if !self.reconnect(conn_id).await {
                return response;
            }
            reconnects += 1;
        }
    }

    async fn attempt(&self, command: &Command) -> Attempt {
        let mut guard = self.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return Attempt::Done(Response::err(CLOSED_MESSAGE));
        };
        let conn_id = conn.id();

        let (response, faulted) = match conn.exchange(command).await {
            Ok(response) => {
                let faulted = response.is_err() && is_transport_fault(&response.message);
                (response, faulted)
            }
            Err(e) => {
                tracing::debug!("connection {}: {} failed: {}", conn_id, command.cmd, e);
                (Response::err(e.to_string()), e.is_recoverable())
            }
        };

        if faulted {
            self.state.set(ChannelState::Faulted);
            Attempt::Faulted { response, conn_id }
        } else {
            Attempt::Done(response)
        }
    }

    /// Replaces the connection `faulted_id` with a freshly handshaked one.
    ///
    /// Returns `true` if a retry is worthwhile: either this call installed a
    /// new connection, or another caller already replaced `faulted_id`.
    async fn reconnect(&self, faulted_id: u64) -> bool {
        let _reconnecting = self.shared.reconnect_lock.lock().await;

        match self.conn.lock().await.as_ref() {
            None => return false,
            Some(current) if current.id() != faulted_id => {
                tracing::debug!("connection {} already replaced by {}", faulted_id, current.id());
                return true;
            }
            Some(_) => {}
        }

        tracing::info!("reconnecting to {} ...", self.shared.endpoint);
        let fresh = match establish(
            &self.shared.endpoint,
            self.shared.connect_timeout,
            &self.shared.identity,
            Role::Command,
            &self.state,
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("failed to reconnect to {}: {}", self.shared.endpoint, e);
                return false;
            }
        };

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            // Closed while we were dialing.
            drop(guard);
            fresh.close().await;
            return false;
        }
        let fresh_id = fresh.id();
        let old = guard.replace(fresh);
        drop(guard);

        if let Some(old) = old {
            old.close().await;
        }
        tracing::info!("reconnected: connection {} replaced {}", fresh_id, faulted_id);
        true
    }

    /// Closes the connection. Later `fire` calls answer [`CLOSED_MESSAGE`].
    pub(crate) async fn close(&self) {
        let old = self.conn.lock().await.take();
        self.state.set(ChannelState::Closed);
        if let Some(old) = old {
            old.close().await;
        }
    }
}
