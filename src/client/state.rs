//! Channel lifecycle states.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a command or watch channel.
///
/// ```text
/// Disconnected -> Connecting -> Handshaking -> Ready
///                      ^                         |
///                      +------- Faulted <--------+
/// any -> Closed
/// ```
///
/// Traffic only flows in `Ready`. `Faulted` leads back to `Connecting` when
/// the reconnect policy applies, and stays put when reconnection is
/// abandoned. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// No connection has been attempted yet.
    Disconnected = 0,
    /// Dialing the server.
    Connecting = 1,
    /// Connected, waiting for the handshake result.
    Handshaking = 2,
    /// Handshake accepted; traffic may flow.
    Ready = 3,
    /// The connection failed with a transport fault.
    Faulted = 4,
    /// Shut down; no further transitions.
    Closed = 5,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Disconnected,
            1 => ChannelState::Connecting,
            2 => ChannelState::Handshaking,
            3 => ChannelState::Ready,
            4 => ChannelState::Faulted,
            _ => ChannelState::Closed,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Handshaking => "handshaking",
            ChannelState::Ready => "ready",
            ChannelState::Faulted => "faulted",
            ChannelState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Shared, lock-free holder for a channel's current state.
#[derive(Debug)]
pub(crate) struct StateCell {
    label: &'static str,
    value: AtomicU8,
}

impl StateCell {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            value: AtomicU8::new(ChannelState::Disconnected as u8),
        }
    }

    pub(crate) fn get(&self) -> ChannelState {
        ChannelState::from_u8(self.value.load(Ordering::Acquire))
    }

    /// Moves to `next`. Once `Closed`, the cell never changes again.
    pub(crate) fn set(&self, next: ChannelState) {
        let result = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ChannelState::Closed as u8).then_some(next as u8)
            });
        if let Ok(previous) = result {
            let previous = ChannelState::from_u8(previous);
            if previous != next {
                tracing::debug!("{} channel: {} -> {}", self.label, previous, next);
            }
        }
    }
}
