/*!
 * Network Module
 * Berkeley-style stream sockets over pluggable transport backends
 */

pub mod address;
pub mod api;
pub mod backend;
pub mod state;
pub mod table;

pub use address::{decode, encode, htons, ntohs, Address, AddressFamily, WireAddress, WIRE_ADDRESS_LEN};
pub use api::{accept, bind, connect, global, listen, recv, send, shutdown, socket, Sockets};
pub use backend::{
    BackendResult, DefaultBackend, EmulatedBackend, EmulatedConfig, EmulatedNetwork, TransportBackend,
};
#[cfg(unix)]
pub use backend::NativeBackend;
pub use state::{SocketOp, SocketState};
pub use table::{HandleTable, SocketEntry, SocketMeta, TableStats};
