/*!
 * Socket API
 *
 * Berkeley-style operations over any `TransportBackend`. Addresses enter and
 * leave through the codec, handles resolve through the table, and every
 * operation is checked against the lifecycle state before the backend runs.
 */

use super::address::{decode, encode, Address};
use super::backend::{DefaultBackend, TransportBackend};
use super::state::{SocketOp, SocketState};
use super::table::{HandleTable, SocketEntry, SocketMeta, TableStats};
use crate::config::SocketLimits;
use crate::core::limits::EINVAL;
use crate::core::{Handle, ShutdownMode, SocketError, SocketResult};
use crate::monitoring::{span_socket, SocketSpan};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

fn traced<T>(span: &SocketSpan, result: SocketResult<T>) -> SocketResult<T> {
    match &result {
        Ok(_) => span.record_result(true),
        Err(e) => span.record_error(e),
    }
    result
}

/// Socket layer over one backend: the handle table plus the state machine
pub struct Sockets<B: TransportBackend> {
    backend: B,
    table: HandleTable<B::Socket>,
}

impl<B: TransportBackend> Sockets<B> {
    pub fn new(backend: B) -> Self {
        Self::with_limits(backend, SocketLimits::default())
    }

    pub fn with_limits(backend: B, limits: SocketLimits) -> Self {
        info!(
            backend = backend.name(),
            max_open_handles = limits.max_open_handles,
            "socket layer initialized"
        );
        Self {
            backend,
            table: HandleTable::with_capacity_limit(limits.max_open_handles),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stats(&self) -> TableStats {
        self.table.stats()
    }

    pub fn open_handles(&self) -> usize {
        self.table.len()
    }

    pub fn is_open(&self, handle: Handle) -> bool {
        self.table.contains(handle)
    }

    /// Resolve a handle and check that `op` is allowed in its current state
    fn entry_for(&self, handle: Handle, op: SocketOp) -> SocketResult<Arc<SocketEntry<B::Socket>>> {
        let entry = self.table.lookup(handle)?;
        let state = entry.state();
        if !state.permits(op) {
            debug!(handle, state = %state, operation = op.name(), "operation not permitted in state");
            return Err(SocketError::InvalidHandle { handle });
        }
        Ok(entry)
    }

    /// Commit a transition, unless another caller moved the handle meanwhile
    fn advance(&self, entry: &SocketEntry<B::Socket>, from: SocketState, op: SocketOp, f: impl FnOnce(&mut SocketMeta)) -> SocketResult<()> {
        entry.update(|meta| {
            if meta.state != from {
                return Err(SocketError::InvalidHandle {
                    handle: entry.handle(),
                });
            }
            if let Some(next) = meta.state.after(op) {
                meta.state = next;
            }
            f(meta);
            Ok(())
        })
    }

    fn local_of(&self, socket: &B::Socket) -> Option<Address> {
        self.backend
            .local_address(socket)
            .ok()
            .and_then(|wire| decode(&wire).ok())
    }

    /// Create a new socket in the CLOSED state
    pub fn socket(&self, family: u16, socket_type: i32, protocol: i32) -> SocketResult<Handle> {
        let span = span_socket("socket", None);
        let _guard = span.enter();

        let result = self
            .backend
            .create(family, socket_type, protocol)
            .map_err(|code| SocketError::CreateFailed { code })
            .and_then(|socket| self.table.insert(socket, SocketMeta::closed()));

        if let Ok(handle) = result {
            span.record_new_handle(handle);
            debug!(handle, family, socket_type, protocol, "socket created");
        }
        traced(&span, result)
    }

    pub fn bind(&self, handle: Handle, addr: &Address) -> SocketResult<()> {
        let span = span_socket("bind", Some(handle));
        let _guard = span.enter();
        span.record_address(addr);

        let result = (|| {
            let entry = self.entry_for(handle, SocketOp::Bind)?;
            self.backend
                .bind(entry.socket(), &encode(addr))
                .map_err(|code| SocketError::BindFailed { code })?;

            let local = self.local_of(entry.socket()).unwrap_or(*addr);
            self.advance(&entry, SocketState::Closed, SocketOp::Bind, |meta| {
                meta.local = Some(local)
            })?;
            info!(handle, address = %local, "socket bound");
            Ok(())
        })();
        traced(&span, result)
    }

    pub fn listen(&self, handle: Handle, backlog: i32) -> SocketResult<()> {
        let span = span_socket("listen", Some(handle));
        let _guard = span.enter();

        let result = (|| {
            let entry = self.entry_for(handle, SocketOp::Listen)?;
            if backlog < 0 {
                return Err(SocketError::ListenFailed { code: EINVAL });
            }
            self.backend
                .listen(entry.socket(), backlog)
                .map_err(|code| SocketError::ListenFailed { code })?;
            self.advance(&entry, SocketState::Bound, SocketOp::Listen, |_| {})?;
            info!(handle, backlog, "socket listening");
            Ok(())
        })();
        traced(&span, result)
    }

    /// Block until a connection arrives; returns its new handle and peer address
    pub fn accept(&self, handle: Handle) -> SocketResult<(Handle, Address)> {
        let span = span_socket("accept", Some(handle)).blocking();
        let _guard = span.enter();

        let result = (|| {
            let entry = self.entry_for(handle, SocketOp::Accept)?;
            let (socket, wire) = self
                .backend
                .accept(entry.socket())
                .map_err(|code| SocketError::AcceptFailed { code })?;
            let peer = decode(&wire).map_err(|code| SocketError::AcceptFailed { code })?;
            let local = self.local_of(&socket);

            let accepted = self
                .table
                .insert(socket, SocketMeta::connected(local, peer))
                .map_err(|e| SocketError::AcceptFailed { code: e.code() })?;

            span.record_new_handle(accepted);
            span.record_address(&peer);
            info!(listener = handle, handle = accepted, peer = %peer, "connection accepted");
            Ok((accepted, peer))
        })();
        traced(&span, result)
    }

    pub fn connect(&self, handle: Handle, addr: &Address) -> SocketResult<()> {
        let span = span_socket("connect", Some(handle)).blocking();
        let _guard = span.enter();
        span.record_address(addr);

        let result = (|| {
            let entry = self.entry_for(handle, SocketOp::Connect)?;
            self.backend
                .connect(entry.socket(), &encode(addr))
                .map_err(|code| SocketError::ConnectFailed { code })?;

            let local = self.local_of(entry.socket());
            let peer = *addr;
            self.advance(&entry, SocketState::Closed, SocketOp::Connect, |meta| {
                meta.local = local;
                meta.peer = Some(peer);
            })?;
            info!(handle, peer = %peer, "socket connected");
            Ok(())
        })();
        traced(&span, result)
    }

    /// Send once; the returned count may be shorter than `data`
    pub fn send(&self, handle: Handle, data: &[u8], flags: i32) -> SocketResult<usize> {
        let span = span_socket("send", Some(handle)).blocking();
        let _guard = span.enter();

        let result = self.entry_for(handle, SocketOp::Send).and_then(|entry| {
            self.backend
                .send(entry.socket(), data, flags)
                .map_err(|code| SocketError::SendFailed { code })
        });

        if let Ok(sent) = result {
            span.record_bytes(sent);
            if sent < data.len() {
                debug!(handle, sent, requested = data.len(), "partial send");
            }
        }
        traced(&span, result)
    }

    /// Keep sending until all of `data` is written or an error occurs
    pub fn send_all(&self, handle: Handle, data: &[u8], flags: i32) -> SocketResult<usize> {
        let mut sent = 0;
        while sent < data.len() {
            let written = self.send(handle, &data[sent..], flags)?;
            if written == 0 {
                warn!(handle, sent, requested = data.len(), "send made no progress");
                break;
            }
            sent += written;
        }
        Ok(sent)
    }

    /// Receive into `buf`; `Ok(0)` means the peer shut down in an orderly way
    pub fn recv_into(&self, handle: Handle, buf: &mut [u8], flags: i32) -> SocketResult<usize> {
        let span = span_socket("recv", Some(handle)).blocking();
        let _guard = span.enter();

        let result = self.entry_for(handle, SocketOp::Recv).and_then(|entry| {
            self.backend
                .recv(entry.socket(), buf, flags)
                .map_err(|code| SocketError::RecvFailed { code })
        });

        if let Ok(read) = result {
            span.record_bytes(read);
        }
        traced(&span, result)
    }

    /// Receive up to `max_len` bytes
    pub fn recv(&self, handle: Handle, max_len: usize, flags: i32) -> SocketResult<Vec<u8>> {
        let mut buffer = vec![0u8; max_len];
        let read = self.recv_into(handle, &mut buffer, flags)?;
        buffer.truncate(read);
        Ok(buffer)
    }

    /// Shut the socket down and invalidate its handle
    ///
    /// The handle is released even when the backend reports an error.
    pub fn shutdown(&self, handle: Handle, how: ShutdownMode) -> SocketResult<()> {
        let span = span_socket("shutdown", Some(handle));
        let _guard = span.enter();

        let result = self.table.release(handle).and_then(|entry| {
            let previous = entry.update(|meta| std::mem::replace(&mut meta.state, SocketState::Shutdown));
            let outcome = self
                .backend
                .shutdown(entry.socket(), how)
                .map_err(|code| SocketError::ShutdownFailed { code });

            match &outcome {
                Ok(()) => info!(handle, how = %how, from = %previous, "socket shut down"),
                Err(e) => warn!(handle, how = %how, from = %previous, error = %e, "socket shut down with backend error"),
            }
            outcome
        });

        if let Err(SocketError::InvalidHandle { .. }) = result {
            warn!(handle, "shutdown of unknown or already closed socket");
        }
        traced(&span, result)
    }

    pub fn state(&self, handle: Handle) -> SocketResult<SocketState> {
        Ok(self.table.lookup(handle)?.state())
    }

    pub fn local_address(&self, handle: Handle) -> SocketResult<Option<Address>> {
        Ok(self.table.lookup(handle)?.meta().local)
    }

    pub fn peer_address(&self, handle: Handle) -> SocketResult<Option<Address>> {
        Ok(self.table.lookup(handle)?.meta().peer)
    }
}

// =============================================================================
// PROCESS-WIDE INSTANCE
// =============================================================================

static GLOBAL_SOCKETS: OnceLock<Arc<Sockets<DefaultBackend>>> = OnceLock::new();

fn global_ref() -> &'static Arc<Sockets<DefaultBackend>> {
    GLOBAL_SOCKETS.get_or_init(|| Arc::new(Sockets::new(DefaultBackend::default())))
}

/// Process-wide socket layer over the build-selected backend
///
/// Created on first use and never torn down.
pub fn global() -> Arc<Sockets<DefaultBackend>> {
    Arc::clone(global_ref())
}

pub fn socket(family: u16, socket_type: i32, protocol: i32) -> SocketResult<Handle> {
    global_ref().socket(family, socket_type, protocol)
}

pub fn bind(handle: Handle, addr: &Address) -> SocketResult<()> {
    global_ref().bind(handle, addr)
}

pub fn listen(handle: Handle, backlog: i32) -> SocketResult<()> {
    global_ref().listen(handle, backlog)
}

pub fn accept(handle: Handle) -> SocketResult<(Handle, Address)> {
    global_ref().accept(handle)
}

pub fn connect(handle: Handle, addr: &Address) -> SocketResult<()> {
    global_ref().connect(handle, addr)
}

pub fn send(handle: Handle, data: &[u8], flags: i32) -> SocketResult<usize> {
    global_ref().send(handle, data, flags)
}

pub fn recv(handle: Handle, max_len: usize, flags: i32) -> SocketResult<Vec<u8>> {
    global_ref().recv(handle, max_len, flags)
}

pub fn shutdown(handle: Handle, how: ShutdownMode) -> SocketResult<()> {
    global_ref().shutdown(handle, how)
}
