/*!
 * Core Types
 * Common types and protocol constants used across the socket layer
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque socket handle, unique among the sockets currently open in the process
pub type Handle = i32;

/// Raw backend status code (errno-compatible)
pub type RawStatus = i32;

/// IPv4 protocol family tag [LINUX-COMPAT]
pub const PF_INET: u16 = 2;

/// IPv4 address family tag, identical to `PF_INET`
pub const AF_INET: u16 = PF_INET;

/// Reliable, connection-oriented byte stream [LINUX-COMPAT]
pub const SOCK_STREAM: i32 = 1;

/// Default protocol for the requested socket type
pub const IPPROTO_IP: i32 = 0;

/// TCP protocol number
pub const IPPROTO_TCP: i32 = 6;

/// Shutdown-mode tags [LINUX-COMPAT]
pub const SHUT_RD: i32 = 0;
pub const SHUT_WR: i32 = 1;
pub const SHUT_RDWR: i32 = 2;

/// Which direction(s) of a connection to shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    Read,
    Write,
    Both,
}

impl ShutdownMode {
    /// Parse a `SHUT_*` tag
    pub fn from_raw(how: i32) -> Option<Self> {
        match how {
            SHUT_RD => Some(Self::Read),
            SHUT_WR => Some(Self::Write),
            SHUT_RDWR => Some(Self::Both),
            _ => None,
        }
    }

    /// The `SHUT_*` tag for this mode
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Read => SHUT_RD,
            Self::Write => SHUT_WR,
            Self::Both => SHUT_RDWR,
        }
    }

    pub fn includes_read(self) -> bool {
        matches!(self, Self::Read | Self::Both)
    }

    pub fn includes_write(self) -> bool {
        matches!(self, Self::Write | Self::Both)
    }
}

impl fmt::Display for ShutdownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Both => "both",
        };
        f.write_str(name)
    }
}
