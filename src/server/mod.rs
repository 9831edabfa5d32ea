/*!
 * Connection Server
 *
 * Accept loop over a listening socket. Accepts and connections both block, so
 * the accept loop runs on its own named thread and every accepted peer gets
 * a dedicated connection thread. Neither runs on tokio's blocking pool.
 *
 * Stopping the server shuts down the listening handle, which wakes the
 * pending accept and ends `run`. Connection threads already running finish on
 * their own when their peer closes.
 */

mod handler;

pub use handler::{ConnectionHandler, EchoResponder, ECHO_PREFIX};

use crate::config::ServerConfig;
use crate::core::limits::EAGAIN;
use crate::core::{Handle, ShutdownMode, SocketError, SocketResult, PF_INET, SOCK_STREAM};
use crate::net::{Address, Sockets, TransportBackend};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

const ACCEPT_THREAD_NAME: &str = "unisockets-accept";

/// Connection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    pub accepted: u64,
    pub active: u64,
    pub closed: u64,
    /// Closed connections that ended on a receive or send error
    pub errored: u64,
    pub failed_accepts: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    active: AtomicU64,
    closed: AtomicU64,
    errored: AtomicU64,
    failed_accepts: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ServerStats {
        ServerStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            failed_accepts: self.failed_accepts.load(Ordering::Relaxed),
        }
    }

    fn connection_ended(&self, end: ConnectionEnd) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.closed.fetch_add(1, Ordering::Relaxed);
        if end == ConnectionEnd::Errored {
            self.errored.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// How a connection came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    PeerClosed,
    Errored,
}

pub struct ConnectionServer<B: TransportBackend, H: ConnectionHandler> {
    shared: Arc<Shared<B, H>>,
}

/// State reachable from the accept thread and every connection thread
struct Shared<B: TransportBackend, H: ConnectionHandler> {
    sockets: Arc<Sockets<B>>,
    handler: H,
    listener: Handle,
    local: Address,
    buffer_len: usize,
    counters: Counters,
    stopped: AtomicBool,
}

impl<B: TransportBackend, H: ConnectionHandler> ConnectionServer<B, H> {
    /// Create, bind and listen on `config.address()`
    ///
    /// The listening handle is shut down again if bind or listen fails.
    pub fn bind(sockets: Arc<Sockets<B>>, config: &ServerConfig, handler: H) -> SocketResult<Self> {
        let listener = sockets.socket(PF_INET, SOCK_STREAM, 0)?;

        let setup = sockets
            .bind(listener, &config.address())
            .and_then(|()| sockets.listen(listener, config.backlog));
        if let Err(e) = setup {
            error!(address = %config.address(), error = %e, "server setup failed");
            if let Err(close) = sockets.shutdown(listener, ShutdownMode::Both) {
                debug!(handle = listener, error = %close, "closing failed listener");
            }
            return Err(e);
        }

        let local = sockets
            .local_address(listener)?
            .unwrap_or_else(|| config.address());
        info!(address = %local, backlog = config.backlog, backend = sockets.backend().name(), "server listening");

        Ok(Self {
            shared: Arc::new(Shared {
                sockets,
                handler,
                listener,
                local,
                buffer_len: config.buffer_len,
                counters: Counters::default(),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    pub fn local_address(&self) -> Address {
        self.shared.local
    }

    pub fn listener(&self) -> Handle {
        self.shared.listener
    }

    pub fn stats(&self) -> ServerStats {
        self.shared.counters.snapshot()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Shut down the listening handle; idempotent
    pub fn stop(&self) -> SocketResult<()> {
        self.shared.stop()
    }

    /// Accept connections until the listener is stopped
    ///
    /// Dropping the returned future does not stop the accept thread; call
    /// [`stop`](Self::stop) for that.
    pub async fn run(&self) -> SocketResult<()> {
        let listener = self.shared.listener;
        let (done_tx, done_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);

        thread::Builder::new()
            .name(ACCEPT_THREAD_NAME.to_string())
            .spawn(move || {
                // Nobody is waiting if the run future was dropped
                let _ = done_tx.send(shared.accept_loop());
            })
            .map_err(|e| {
                error!(handle = listener, error = %e, "could not start accept thread");
                SocketError::AcceptFailed {
                    code: e.raw_os_error().unwrap_or(EAGAIN),
                }
            })?;

        match done_rx.await {
            Ok(result) => result,
            Err(_) => {
                error!(handle = listener, "accept thread ended without reporting");
                Err(SocketError::InvalidHandle { handle: listener })
            }
        }
    }
}

impl<B: TransportBackend, H: ConnectionHandler> Drop for ConnectionServer<B, H> {
    fn drop(&mut self) {
        if let Err(e) = self.shared.stop() {
            debug!(handle = self.shared.listener, error = %e, "listener already closed on drop");
        }
    }
}

impl<B: TransportBackend, H: ConnectionHandler> Shared<B, H> {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn stop(&self) -> SocketResult<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(handle = self.listener, address = %self.local, "stopping server");
        self.sockets.shutdown(self.listener, ShutdownMode::Both)
    }

    fn accept_loop(self: &Arc<Self>) -> SocketResult<()> {
        let listener = self.listener;
        loop {
            match self.sockets.accept(listener) {
                Ok((handle, peer)) if self.is_stopped() => {
                    debug!(handle, peer = %peer, "accepted after stop, closing");
                    self.close_unserved(handle);
                }
                Ok((handle, peer)) => self.spawn_connection(handle, peer),
                Err(SocketError::InvalidHandle { .. }) => {
                    info!(handle = listener, "listener closed, leaving accept loop");
                    return Ok(());
                }
                Err(e) if self.is_stopped() => {
                    debug!(error = %e, "accept interrupted by stop");
                }
                Err(e) => {
                    self.counters.failed_accepts.fetch_add(1, Ordering::Relaxed);
                    warn!(handle = listener, error = %e, "accept failed, continuing");
                }
            }
        }
    }

    fn spawn_connection(self: &Arc<Self>, handle: Handle, peer: Address) {
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        self.counters.active.fetch_add(1, Ordering::Relaxed);

        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("unisockets-conn-{}", handle))
            .spawn(move || {
                let end = serve_connection(&shared.sockets, &shared.handler, handle, peer, shared.buffer_len);
                shared.counters.connection_ended(end);
            });

        if let Err(e) = spawned {
            warn!(handle, peer = %peer, error = %e, "could not start connection thread");
            self.close_unserved(handle);
            self.counters.connection_ended(ConnectionEnd::Errored);
        }
    }

    fn close_unserved(&self, handle: Handle) {
        if let Err(e) = self.sockets.shutdown(handle, ShutdownMode::Both) {
            debug!(handle, error = %e, "closing unserved connection");
        }
    }
}

/// Receive, reply, repeat until the peer closes or an error ends the connection
fn serve_connection<B: TransportBackend, H: ConnectionHandler + ?Sized>(
    sockets: &Sockets<B>,
    handler: &H,
    handle: Handle,
    peer: Address,
    buffer_len: usize,
) -> ConnectionEnd {
    debug!(handle, peer = %peer, "connection started");

    let end = loop {
        let message = match sockets.recv(handle, buffer_len, 0) {
            Ok(message) if message.is_empty() => {
                debug!(handle, peer = %peer, "peer closed connection");
                break ConnectionEnd::PeerClosed;
            }
            Ok(message) => message,
            Err(e) => {
                warn!(handle, peer = %peer, error = %e, "receive failed, closing connection");
                break ConnectionEnd::Errored;
            }
        };

        info!(
            handle,
            peer = %peer,
            bytes = message.len(),
            message = %String::from_utf8_lossy(&message),
            "client sent"
        );

        let reply = handler.respond(&message);
        if let Err(e) = sockets.send_all(handle, &reply, 0) {
            warn!(handle, peer = %peer, error = %e, "send failed, closing connection");
            break ConnectionEnd::Errored;
        }
    };

    if let Err(e) = sockets.shutdown(handle, ShutdownMode::Both) {
        debug!(handle, error = %e, "connection shutdown reported an error");
    }
    end
}
