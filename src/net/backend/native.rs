/*!
 * Native Backend
 * 1:1 pass-through to the operating system's socket calls
 */

use super::{check_stream_triple, BackendResult, TransportBackend};
use crate::core::{RawStatus, ShutdownMode, IPPROTO_TCP};
use crate::net::address::WireAddress;
use nix::errno::Errno;
use nix::sys::socket::{
    self as sys, AddressFamily, Backlog, MsgFlags, SockFlag, SockProtocol, SockType, SockaddrIn,
};
use std::net::SocketAddrV4;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

#[inline]
fn status(err: Errno) -> RawStatus {
    err as RawStatus
}

/// Kernel socket owned by a handle; closed when the handle's entry is dropped
#[derive(Debug)]
pub struct NativeSocket {
    fd: OwnedFd,
}

impl NativeSocket {
    fn raw(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Backend forwarding every primitive to the kernel
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl TransportBackend for NativeBackend {
    type Socket = NativeSocket;

    fn name(&self) -> &'static str {
        "native"
    }

    fn create(&self, family: u16, socket_type: i32, protocol: i32) -> BackendResult<NativeSocket> {
        check_stream_triple(family, socket_type, protocol)?;
        let protocol = (protocol == IPPROTO_TCP).then_some(SockProtocol::Tcp);

        let fd = sys::socket(AddressFamily::Inet, SockType::Stream, SockFlag::empty(), protocol)
            .map_err(status)?;
        Ok(NativeSocket { fd })
    }

    fn bind(&self, socket: &NativeSocket, addr: &WireAddress) -> BackendResult<()> {
        let addr = SockaddrIn::from(addr.to_socket_addr()?);
        sys::bind(socket.raw(), &addr).map_err(status)
    }

    fn listen(&self, socket: &NativeSocket, backlog: i32) -> BackendResult<()> {
        let backlog = Backlog::new(backlog).map_err(status)?;
        sys::listen(&socket.fd, backlog).map_err(status)
    }

    fn accept(&self, socket: &NativeSocket) -> BackendResult<(NativeSocket, WireAddress)> {
        let raw = sys::accept(socket.raw()).map_err(status)?;
        // SAFETY: accept(2) just returned this descriptor and nothing else owns it.
        let accepted = NativeSocket {
            fd: unsafe { OwnedFd::from_raw_fd(raw) },
        };

        let peer: SockaddrIn = sys::getpeername(raw).map_err(status)?;
        Ok((accepted, WireAddress::from_socket_addr(SocketAddrV4::from(peer))))
    }

    fn connect(&self, socket: &NativeSocket, addr: &WireAddress) -> BackendResult<()> {
        let addr = SockaddrIn::from(addr.to_socket_addr()?);
        sys::connect(socket.raw(), &addr).map_err(status)
    }

    fn send(&self, socket: &NativeSocket, data: &[u8], flags: i32) -> BackendResult<usize> {
        #[allow(unused_mut)]
        let mut flags = MsgFlags::from_bits_truncate(flags);
        // Broken pipes surface as EPIPE instead of SIGPIPE.
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            flags |= MsgFlags::MSG_NOSIGNAL;
        }
        sys::send(socket.raw(), data, flags).map_err(status)
    }

    fn recv(&self, socket: &NativeSocket, buf: &mut [u8], flags: i32) -> BackendResult<usize> {
        sys::recv(socket.raw(), buf, MsgFlags::from_bits_truncate(flags)).map_err(status)
    }

    fn shutdown(&self, socket: &NativeSocket, how: ShutdownMode) -> BackendResult<()> {
        let how = match how {
            ShutdownMode::Read => sys::Shutdown::Read,
            ShutdownMode::Write => sys::Shutdown::Write,
            ShutdownMode::Both => sys::Shutdown::Both,
        };
        sys::shutdown(socket.raw(), how).map_err(status)
    }

    fn local_address(&self, socket: &NativeSocket) -> BackendResult<WireAddress> {
        let local: SockaddrIn = sys::getsockname(socket.raw()).map_err(status)?;
        Ok(WireAddress::from_socket_addr(SocketAddrV4::from(local)))
    }
}
