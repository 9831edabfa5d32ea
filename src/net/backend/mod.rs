/*!
 * Transport Backends
 *
 * The primitive socket operations, implemented once per substrate. The handle
 * table and state machine depend only on `TransportBackend`.
 */

pub mod emulated;
#[cfg(unix)]
pub mod native;

use super::address::WireAddress;
use crate::core::limits::{EAFNOSUPPORT, EPROTONOSUPPORT, ESOCKTNOSUPPORT};
use crate::core::{RawStatus, ShutdownMode, IPPROTO_IP, IPPROTO_TCP, PF_INET, SOCK_STREAM};

pub use emulated::{EmulatedBackend, EmulatedConfig, EmulatedNetwork};
#[cfg(unix)]
pub use native::NativeBackend;

/// Backend result: a value, or the raw errno-style status
pub type BackendResult<T> = Result<T, RawStatus>;

/// Primitive operations every transport must provide
///
/// Each call is a single attempt; nothing here retries. Accept, recv and send
/// block the calling thread until they can make progress or fail.
pub trait TransportBackend: Send + Sync + 'static {
    /// Backend-private socket state stored behind a handle
    type Socket: Send + Sync + 'static;

    fn name(&self) -> &'static str;

    fn create(&self, family: u16, socket_type: i32, protocol: i32) -> BackendResult<Self::Socket>;

    fn bind(&self, socket: &Self::Socket, addr: &WireAddress) -> BackendResult<()>;

    fn listen(&self, socket: &Self::Socket, backlog: i32) -> BackendResult<()>;

    /// Block until a pending connection is available; returns it with its peer address
    fn accept(&self, socket: &Self::Socket) -> BackendResult<(Self::Socket, WireAddress)>;

    fn connect(&self, socket: &Self::Socket, addr: &WireAddress) -> BackendResult<()>;

    /// Write as much of `data` as fits; a short count is not an error
    fn send(&self, socket: &Self::Socket, data: &[u8], flags: i32) -> BackendResult<usize>;

    /// Read at least one byte, or return 0 on orderly peer shutdown
    fn recv(&self, socket: &Self::Socket, buf: &mut [u8], flags: i32) -> BackendResult<usize>;

    fn shutdown(&self, socket: &Self::Socket, how: ShutdownMode) -> BackendResult<()>;

    /// Address the socket is bound to (including backend-assigned ports)
    fn local_address(&self, socket: &Self::Socket) -> BackendResult<WireAddress>;
}

/// Only IPv4 stream sockets exist in this layer
pub(crate) fn check_stream_triple(family: u16, socket_type: i32, protocol: i32) -> BackendResult<()> {
    if family != PF_INET {
        return Err(EAFNOSUPPORT);
    }
    if socket_type != SOCK_STREAM {
        return Err(ESOCKTNOSUPPORT);
    }
    if protocol != IPPROTO_IP && protocol != IPPROTO_TCP {
        return Err(EPROTONOSUPPORT);
    }
    Ok(())
}

/// Backend used by the process-wide socket instance
#[cfg(all(unix, not(feature = "emulated")))]
pub type DefaultBackend = NativeBackend;

#[cfg(any(not(unix), feature = "emulated"))]
pub type DefaultBackend = EmulatedBackend;
