//! Wire-level value types exchanged with the server.
//!
//! A [`Command`] is a name plus ordered string arguments. A [`Response`] is a
//! [`Status`] plus a message. Both serialize as flat JSON objects so the
//! codec can write them one per line.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// The command succeeded.
    Ok,
    /// The command failed; the message explains why.
    Err,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Err => write!(f, "ERR"),
        }
    }
}

/// A command sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Command name, e.g. `PING`.
    pub cmd: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Command {
    /// Creates a command from a name and its arguments.
    pub fn new<I, S>(cmd: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a space-delimited command line.
    ///
    /// Leading and trailing whitespace is trimmed; the first token is the
    /// command name and the remaining whitespace-separated tokens are its
    /// arguments. Returns `None` for blank input.
    pub fn parse(text: &str) -> Option<Self> {
        let mut tokens = text.split_whitespace();
        let cmd = tokens.next()?;
        Some(Self::new(cmd, tokens))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cmd)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// A result returned by the server, or synthesized by the client when the
/// transport fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the command succeeded.
    pub status: Status,
    /// Payload on success, error text on failure.
    #[serde(default)]
    pub message: String,
}

impl Response {
    /// Creates an `OK` response.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
        }
    }

    /// Creates an `ERR` response.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            status: Status::Err,
            message: message.into(),
        }
    }

    /// Returns `true` if the status is `OK`.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Returns `true` if the status is `ERR`.
    pub fn is_err(&self) -> bool {
        self.status == Status::Err
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{} {}", self.status, self.message)
        }
    }
}
