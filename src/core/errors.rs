/*!
 * Error Types
 * Socket error taxonomy with thiserror, miette and serde support
 */

use super::limits::{EBADF, STATUS_FAILURE};
use super::types::{Handle, RawStatus};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Socket operation errors
///
/// Every kind carries the backend's raw status for diagnostics. No kind is
/// retried by the socket layer itself.
#[derive(Error, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum SocketError {
    #[error("could not create socket, error code {code}")]
    #[diagnostic(
        code(socket::create_failed),
        help("Check the family/type/protocol triple and the open handle limit.")
    )]
    CreateFailed { code: RawStatus },

    #[error("could not bind socket, error code {code}")]
    #[diagnostic(
        code(socket::bind_failed),
        help("The address may already be in use or not be local to this host.")
    )]
    BindFailed { code: RawStatus },

    #[error("could not listen on socket, error code {code}")]
    #[diagnostic(code(socket::listen_failed))]
    ListenFailed { code: RawStatus },

    #[error("could not accept on socket, error code {code}")]
    #[diagnostic(code(socket::accept_failed))]
    AcceptFailed { code: RawStatus },

    #[error("could not connect to socket, error code {code}")]
    #[diagnostic(
        code(socket::connect_failed),
        help("Make sure a listener is bound to the remote address.")
    )]
    ConnectFailed { code: RawStatus },

    #[error("could not send from socket, error code {code}")]
    #[diagnostic(code(socket::send_failed))]
    SendFailed { code: RawStatus },

    #[error("could not receive from socket, error code {code}")]
    #[diagnostic(code(socket::recv_failed))]
    RecvFailed { code: RawStatus },

    #[error("could not shut down socket, error code {code}")]
    #[diagnostic(code(socket::shutdown_failed))]
    ShutdownFailed { code: RawStatus },

    #[error("invalid socket handle {handle}")]
    #[diagnostic(
        code(socket::invalid_handle),
        help("The handle was never created, was already shut down, or is in the wrong state.")
    )]
    InvalidHandle { handle: Handle },
}

impl SocketError {
    /// Raw backend status carried by this error
    pub fn code(&self) -> RawStatus {
        match *self {
            Self::CreateFailed { code }
            | Self::BindFailed { code }
            | Self::ListenFailed { code }
            | Self::AcceptFailed { code }
            | Self::ConnectFailed { code }
            | Self::SendFailed { code }
            | Self::RecvFailed { code }
            | Self::ShutdownFailed { code } => code,
            Self::InvalidHandle { .. } => EBADF,
        }
    }

    /// Sentinel status reported through a C-style return value
    #[inline]
    pub fn status(&self) -> i32 {
        STATUS_FAILURE
    }
}

/// Common result type for socket operations
pub type SocketResult<T> = Result<T, SocketError>;
