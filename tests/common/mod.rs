//! In-process mock server speaking the newline-delimited JSON protocol.
//!
//! Supported commands on a command connection:
//!
//! - `HANDSHAKE <identity> <role>` - `OK`, or the configured rejection
//! - `PING` - `OK PONG`
//! - `ECHO args...` - `OK` with the arguments joined by spaces
//! - `EOFMSG` - `ERR EOF`, a server-relayed end-of-stream message
//! - anything else - `ERR unknown command '<name>'`
//!
//! A connection that handshakes with role `watch` stops reading commands
//! and forwards whatever [`MockServer::push`] or [`MockServer::push_raw`]
//! sends.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use dicedb_client::{Command, Response};

/// One accepted handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub identity: String,
    pub role: String,
}

#[derive(Default)]
struct ServerState {
    accepted: AtomicUsize,
    handshakes: Mutex<Vec<Handshake>>,
    commands: Mutex<Vec<Command>>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<String>>>,
    reject_command: Mutex<Option<String>>,
    reject_watch: Mutex<Option<String>>,
}

pub struct MockServer {
    port: u16,
    state: Arc<ServerState>,
    kill_tx: broadcast::Sender<&'static str>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let port = listener.local_addr().expect("No local addr").port();
        let state = Arc::new(ServerState::default());
        let (kill_tx, _) = broadcast::channel(16);

        let accept_state = Arc::clone(&state);
        let accept_kill = kill_tx.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.accepted.fetch_add(1, Ordering::SeqCst);
                let state = Arc::clone(&accept_state);
                let kill_rx = accept_kill.subscribe();
                tokio::spawn(handle_connection(stream, state, kill_rx));
            }
        });

        Self {
            port,
            state,
            kill_tx,
            accept_task,
        }
    }

    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.state.handshakes.lock().unwrap().clone()
    }

    pub fn handshakes_for(&self, role: &str) -> Vec<Handshake> {
        self.handshakes()
            .into_iter()
            .filter(|h| h.role == role)
            .collect()
    }

    /// Non-handshake commands received, in arrival order.
    pub fn commands(&self) -> Vec<Command> {
        self.state.commands.lock().unwrap().clone()
    }

    /// Makes every later `command` handshake fail with `message`.
    pub fn reject_command_handshakes(&self, message: &str) {
        *self.state.reject_command.lock().unwrap() = Some(message.to_string());
    }

    /// Makes every later `watch` handshake fail with `message`.
    pub fn reject_watch_handshakes(&self, message: &str) {
        *self.state.reject_watch.lock().unwrap() = Some(message.to_string());
    }

    /// Lets `watch` handshakes succeed again.
    pub fn accept_watch_handshakes(&self) {
        *self.state.reject_watch.lock().unwrap() = None;
    }

    /// Sends `response` to every live watch connection.
    pub fn push(&self, response: Response) {
        let line = serde_json::to_string(&response).expect("Response serializes");
        self.push_raw(&line);
    }

    /// Sends `line` verbatim, without JSON encoding, to every live watch
    /// connection.
    pub fn push_raw(&self, line: &str) {
        self.state
            .watchers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(line.to_string()).is_ok());
    }

    /// Drops every connection that handshook with `role`, then gives the
    /// handlers and the kernel a moment to tear the sockets down.
    pub async fn sever(&self, role: &'static str) {
        if role == "watch" {
            self.state.watchers.lock().unwrap().clear();
        }
        let _ = self.kill_tx.send(role);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Polls until `count` handshakes with `role` have been seen.
    pub async fn wait_for_handshakes(&self, role: &str, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.handshakes_for(role).len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} {} handshakes",
                count,
                role
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Let the server finish writing the handshake reply.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        let _ = self.kill_tx.send("command");
        let _ = self.kill_tx.send("watch");
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(response).expect("Response serializes");
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}

fn execute(command: &Command) -> Response {
    match command.cmd.as_str() {
        "PING" => Response::ok("PONG"),
        "ECHO" => Response::ok(command.args.join(" ")),
        "EOFMSG" => Response::err("EOF"),
        other => Response::err(format!("unknown command '{}'", other)),
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<ServerState>,
    mut kill_rx: broadcast::Receiver<&'static str>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut role = "";

    // Command phase.
    loop {
        line.clear();
        let read = tokio::select! {
            read = reader.read_line(&mut line) => read,
            killed = kill_rx.recv() => {
                match killed {
                    Ok(target) if target == role => return,
                    Err(broadcast::error::RecvError::Closed) => return,
                    _ => continue,
                }
            }
        };
        match read {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command: Command = match serde_json::from_str(line.trim_end()) {
            Ok(command) => command,
            Err(_) => return,
        };

        if command.cmd == "HANDSHAKE" {
            let requested = command.args.get(1).cloned().unwrap_or_default();
            let rejection = match requested.as_str() {
                "watch" => state.reject_watch.lock().unwrap().clone(),
                _ => state.reject_command.lock().unwrap().clone(),
            };
            if let Some(message) = rejection {
                let _ = write_response(&mut writer, &Response::err(message)).await;
                return;
            }
            state.handshakes.lock().unwrap().push(Handshake {
                identity: command.args.first().cloned().unwrap_or_default(),
                role: requested.clone(),
            });
            if write_response(&mut writer, &Response::ok("OK")).await.is_err() {
                return;
            }
            if requested == "watch" {
                role = "watch";
                break;
            }
            role = "command";
            continue;
        }

        state.commands.lock().unwrap().push(command.clone());
        if write_response(&mut writer, &execute(&command)).await.is_err() {
            return;
        }
    }

    // Watch phase.
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.watchers.lock().unwrap().push(tx);
    loop {
        tokio::select! {
            pushed = rx.recv() => {
                let Some(mut line) = pushed else { return };
                line.push('\n');
                if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err() {
                    return;
                }
            }
            killed = kill_rx.recv() => {
                match killed {
                    Ok(target) if target == role => return,
                    Err(broadcast::error::RecvError::Closed) => return,
                    _ => {}
                }
            }
        }
    }
}
