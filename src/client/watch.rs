//! Watch channel: bridges the server's push stream into an in-process queue.
//!
//! A background task owns the watch connection. It receives results one by
//! one and pushes them onto an unbounded queue, reconnecting on transport
//! faults. When the stream cannot be recovered the task delivers one final
//! `Err` item and stops, so consumers always learn why the stream ended.
//! Otherwise the task runs until the client is dropped.

use std::fmt;
use std::mem;
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::client::connection::{establish, Connection, Role};
use crate::client::state::{ChannelState, StateCell};
use crate::client::Shared;
use crate::error::{ClientError, ClientResult, TransportError};
use crate::wire::Response;

/// One element of a watch stream: a pushed result, or the terminal error
/// that ended the stream.
pub type WatchItem = Result<Response, ClientError>;

/// Handle to a client's watch queue.
///
/// Cloning the handle does not create a new stream; all clones drain the
/// same queue, and every [`Client::watch`](crate::Client::watch) call on one
/// client returns a handle to that same queue. The client keeps the queue
/// alive, so items pushed while no handle exists stay queued for the next
/// `watch` call.
#[derive(Clone)]
pub struct WatchStream {
    rx: Arc<Mutex<UnboundedReceiver<WatchItem>>>,
    state: Arc<StateCell>,
}

impl WatchStream {
    /// Waits for the next item.
    ///
    /// Items arrive in the order the server pushed them. After a terminal
    /// `Err` item the stream yields `None`.
    pub async fn next(&self) -> Option<WatchItem> {
        self.rx.lock().await.recv().await
    }

    /// Current state of the watch channel.
    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    /// Returns `true` if both handles drain the same queue.
    pub fn same_stream(&self, other: &WatchStream) -> bool {
        Arc::ptr_eq(&self.rx, &other.rx)
    }
}

impl fmt::Debug for WatchStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchStream")
            .field("state", &self.state.get())
            .finish()
    }
}

/// The established watch channel and its receive task.
pub(crate) struct WatchChannel {
    stream: WatchStream,
    task: JoinHandle<()>,
}

impl WatchChannel {
    /// Dials and handshakes the watch connection, then starts the receive
    /// task.
    pub(crate) async fn open(shared: Arc<Shared>) -> ClientResult<Self> {
        let state = Arc::new(StateCell::new("watch"));
        let conn = establish(
            &shared.endpoint,
            shared.connect_timeout,
            &shared.identity,
            Role::Watch,
            &state,
        )
        .await?;

        let (tx, rx) = unbounded_channel();
        let task = tokio::spawn(pump(conn, shared, Arc::clone(&state), tx));

        Ok(Self {
            stream: WatchStream {
                rx: Arc::new(Mutex::new(rx)),
                state,
            },
            task,
        })
    }

    pub(crate) fn stream(&self) -> WatchStream {
        self.stream.clone()
    }

    pub(crate) fn abort(&self) {
        self.task.abort();
    }
}

/// Receive loop of the watch task.
async fn pump(
    mut conn: Connection,
    shared: Arc<Shared>,
    state: Arc<StateCell>,
    tx: UnboundedSender<WatchItem>,
) {
    // Reconnects since the last delivered item.
    let mut reconnects: u32 = 0;

    loop {
        let fault = match conn.receive().await {
            Ok(response) => {
                reconnects = 0;
                // The client holds the receiver for as long as this task runs.
                let _ = tx.send(Ok(response));
                continue;
            }
            Err(e) => e,
        };

        state.set(ChannelState::Faulted);
        if !fault.is_recoverable() {
            tracing::error!("watch stream failed: {}", fault);
            let _ = tx.send(Err(ClientError::Transport(fault)));
            break;
        }
        if let Some(max) = shared.options.max_reconnects {
            if reconnects >= max {
                tracing::error!("watch stream lost after {} reconnects: {}", reconnects, fault);
                let _ = tx.send(Err(ClientError::Transport(fault)));
                break;
            }
        }

        match reconnect(&shared, &state, &fault).await {
            Ok(fresh) => {
                let old = mem::replace(&mut conn, fresh);
                old.close().await;
                reconnects += 1;
            }
            Err(e) => {
                tracing::error!("watch stream lost, reconnect failed: {}", e);
                let _ = tx.send(Err(e));
                break;
            }
        }
    }

    conn.close().await;
}

async fn reconnect(
    shared: &Shared,
    state: &StateCell,
    fault: &TransportError,
) -> ClientResult<Connection> {
    let _reconnecting = shared.reconnect_lock.lock().await;
    tracing::info!("watch: {}, reconnecting to {} ...", fault, shared.endpoint);
    establish(
        &shared.endpoint,
        shared.connect_timeout,
        &shared.identity,
        Role::Watch,
        state,
    )
    .await
}
