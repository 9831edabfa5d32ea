/*!
 * Emulated Backend
 *
 * Stream-socket semantics with no kernel underneath: connection queues,
 * address aliases and byte streams are all kept in process. Suitable for
 * targets without OS sockets and for deterministic tests.
 */

mod network;
mod stream;

pub use network::{EmulatedNetwork, PendingConnection};
pub use stream::StreamEnd;

use super::{check_stream_triple, BackendResult, TransportBackend};
use crate::core::limits::{
    DEFAULT_STREAM_CAPACITY, EINVAL, EISCONN, ENOTCONN, MAX_LISTEN_BACKLOG,
};
use crate::core::ShutdownMode;
use crate::net::address::{decode, encode, Address, WireAddress};
use flume::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

/// Emulated transport tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatedConfig {
    /// Bytes buffered per connection direction before send blocks
    pub stream_capacity: usize,
    /// Upper bound on a listener's pending-connection queue
    pub max_backlog: usize,
    /// Host part of ephemeral client aliases
    pub host: Ipv4Addr,
}

impl Default for EmulatedConfig {
    fn default() -> Self {
        Self {
            stream_capacity: DEFAULT_STREAM_CAPACITY,
            max_backlog: MAX_LISTEN_BACKLOG,
            host: Ipv4Addr::LOCALHOST,
        }
    }
}

enum Endpoint {
    Unbound,
    Bound {
        local: Address,
    },
    Listening {
        local: Address,
        pending: Receiver<PendingConnection>,
    },
    Connected {
        local: Address,
        stream: Arc<StreamEnd>,
        /// Client sockets own their ephemeral alias; accepted sockets share the listener's
        owns_alias: bool,
    },
    Closed,
}

/// Socket state kept by the emulated backend
pub struct EmulatedSocket {
    endpoint: Mutex<Endpoint>,
}

impl EmulatedSocket {
    fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint: Mutex::new(endpoint),
        }
    }

    fn stream(&self) -> BackendResult<Arc<StreamEnd>> {
        match &*self.endpoint.lock() {
            Endpoint::Connected { stream, .. } => Ok(Arc::clone(stream)),
            _ => Err(ENOTCONN),
        }
    }
}

/// Backend running over an in-process `EmulatedNetwork`
#[derive(Clone)]
pub struct EmulatedBackend {
    network: Arc<EmulatedNetwork>,
}

impl EmulatedBackend {
    /// Backend attached to a specific network (isolated tests, multiple fabrics)
    pub fn with_network(network: Arc<EmulatedNetwork>) -> Self {
        Self { network }
    }

    /// Backend on a fresh private network
    pub fn isolated(config: EmulatedConfig) -> Self {
        Self::with_network(Arc::new(EmulatedNetwork::new(config)))
    }

    pub fn network(&self) -> &Arc<EmulatedNetwork> {
        &self.network
    }
}

impl Default for EmulatedBackend {
    /// Backend on the process-wide emulated network
    fn default() -> Self {
        Self::with_network(EmulatedNetwork::global())
    }
}

impl TransportBackend for EmulatedBackend {
    type Socket = EmulatedSocket;

    fn name(&self) -> &'static str {
        "emulated"
    }

    fn create(&self, family: u16, socket_type: i32, protocol: i32) -> BackendResult<EmulatedSocket> {
        check_stream_triple(family, socket_type, protocol)?;
        Ok(EmulatedSocket::new(Endpoint::Unbound))
    }

    fn bind(&self, socket: &EmulatedSocket, addr: &WireAddress) -> BackendResult<()> {
        let requested = decode(addr)?;
        let mut endpoint = socket.endpoint.lock();
        if !matches!(*endpoint, Endpoint::Unbound) {
            return Err(EINVAL);
        }
        let local = self.network.claim(requested)?;
        *endpoint = Endpoint::Bound { local };
        Ok(())
    }

    fn listen(&self, socket: &EmulatedSocket, backlog: i32) -> BackendResult<()> {
        let mut endpoint = socket.endpoint.lock();
        let local = match *endpoint {
            Endpoint::Bound { local } => local,
            _ => return Err(EINVAL),
        };
        let capacity = usize::try_from(backlog)
            .unwrap_or(0)
            .clamp(1, self.network.config().max_backlog.max(1));
        let pending = self.network.listen(&local, capacity)?;
        *endpoint = Endpoint::Listening { local, pending };
        Ok(())
    }

    fn accept(&self, socket: &EmulatedSocket) -> BackendResult<(EmulatedSocket, WireAddress)> {
        let pending = match &*socket.endpoint.lock() {
            Endpoint::Listening { pending, .. } => pending.clone(),
            _ => return Err(EINVAL),
        };

        // Blocks without holding the endpoint lock; disconnects once the listener shuts down
        let connection = pending.recv().map_err(|_| EINVAL)?;
        debug!(
            connection = %connection.stream.connection_id(),
            peer = %connection.peer,
            "emulated connection accepted"
        );

        let accepted = EmulatedSocket::new(Endpoint::Connected {
            local: connection.local,
            stream: Arc::new(connection.stream),
            owns_alias: false,
        });
        Ok((accepted, encode(&connection.peer)))
    }

    fn connect(&self, socket: &EmulatedSocket, addr: &WireAddress) -> BackendResult<()> {
        let target = decode(addr)?;
        let mut endpoint = socket.endpoint.lock();
        match *endpoint {
            Endpoint::Unbound => {}
            Endpoint::Connected { .. } => return Err(EISCONN),
            _ => return Err(EINVAL),
        }
        let (local, stream) = self.network.connect(&target)?;
        *endpoint = Endpoint::Connected {
            local,
            stream: Arc::new(stream),
            owns_alias: true,
        };
        Ok(())
    }

    fn send(&self, socket: &EmulatedSocket, data: &[u8], _flags: i32) -> BackendResult<usize> {
        socket.stream()?.write(data)
    }

    fn recv(&self, socket: &EmulatedSocket, buf: &mut [u8], _flags: i32) -> BackendResult<usize> {
        Ok(socket.stream()?.read(buf))
    }

    fn shutdown(&self, socket: &EmulatedSocket, how: ShutdownMode) -> BackendResult<()> {
        let endpoint = std::mem::replace(&mut *socket.endpoint.lock(), Endpoint::Closed);
        match endpoint {
            Endpoint::Connected {
                local,
                stream,
                owns_alias,
            } => {
                stream.shutdown(how);
                if owns_alias {
                    self.network.release(&local);
                }
                Ok(())
            }
            Endpoint::Listening { local, pending } => {
                self.network.release(&local);
                // Connections still in the backlog are closed, so their clients see EOF
                let dropped = pending.drain().count();
                if dropped > 0 {
                    debug!(listener = %local, dropped, "closed queued connections");
                }
                Ok(())
            }
            Endpoint::Bound { local } => {
                self.network.release(&local);
                Err(ENOTCONN)
            }
            Endpoint::Unbound | Endpoint::Closed => Err(ENOTCONN),
        }
    }

    fn local_address(&self, socket: &EmulatedSocket) -> BackendResult<WireAddress> {
        let local = match &*socket.endpoint.lock() {
            Endpoint::Bound { local }
            | Endpoint::Listening { local, .. }
            | Endpoint::Connected { local, .. } => *local,
            Endpoint::Unbound | Endpoint::Closed => Address::unspecified(),
        };
        Ok(encode(&local))
    }
}
