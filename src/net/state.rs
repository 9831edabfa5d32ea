/*!
 * Socket State Machine
 *
 * Lifecycle shared by every backend:
 * CLOSED -> BOUND -> LISTENING (server path)
 * CLOSED -> CONNECTED (client path, or a handle produced by accept)
 * any -> SHUTDOWN (terminal)
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a socket handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketState {
    Closed,
    Bound,
    Listening,
    Connected,
    Shutdown,
}

/// Operations that are gated by the lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOp {
    Bind,
    Listen,
    Accept,
    Connect,
    Send,
    Recv,
    Shutdown,
}

impl SocketOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Listen => "listen",
            Self::Accept => "accept",
            Self::Connect => "connect",
            Self::Send => "send",
            Self::Recv => "recv",
            Self::Shutdown => "shutdown",
        }
    }
}

impl SocketState {
    /// Whether `op` may be attempted from this state
    pub fn permits(self, op: SocketOp) -> bool {
        match (self, op) {
            (SocketState::Shutdown, _) => false,
            (_, SocketOp::Shutdown) => true,
            (SocketState::Closed, SocketOp::Bind | SocketOp::Connect) => true,
            (SocketState::Bound, SocketOp::Listen) => true,
            (SocketState::Listening, SocketOp::Accept) => true,
            (SocketState::Connected, SocketOp::Send | SocketOp::Recv) => true,
            _ => false,
        }
    }

    /// State reached when `op` succeeds; `None` for operations that leave it unchanged
    pub fn after(self, op: SocketOp) -> Option<SocketState> {
        if !self.permits(op) {
            return None;
        }
        match op {
            SocketOp::Bind => Some(SocketState::Bound),
            SocketOp::Listen => Some(SocketState::Listening),
            SocketOp::Connect => Some(SocketState::Connected),
            SocketOp::Shutdown => Some(SocketState::Shutdown),
            SocketOp::Accept | SocketOp::Send | SocketOp::Recv => Some(self),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Bound => "bound",
            Self::Listening => "listening",
            Self::Connected => "connected",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
