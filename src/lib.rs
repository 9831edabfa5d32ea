/*!
 * Unisockets
 *
 * Berkeley-sockets-compatible stream sockets with interchangeable transports:
 * a native backend that forwards to the operating system, and an emulated
 * in-process network. Includes a small connection server built on top.
 */

pub mod config;
pub mod core;
pub mod monitoring;
pub mod net;
pub mod server;

// Re-exports
pub use crate::config::{ConfigError, ConfigResult, ServerConfig, SocketLimits};
pub use crate::core::{
    Handle, RawStatus, ShutdownMode, SocketError, SocketResult, AF_INET, IPPROTO_IP, IPPROTO_TCP,
    PF_INET, SOCK_STREAM,
};
pub use monitoring::{init_tracing, span_socket, SocketSpan};
pub use net::{
    accept, bind, connect, htons, listen, ntohs, recv, send, shutdown, socket, Address, DefaultBackend,
    EmulatedBackend, EmulatedConfig, EmulatedNetwork, SocketState, Sockets, TransportBackend, WireAddress,
};
#[cfg(unix)]
pub use net::NativeBackend;
pub use server::{ConnectionHandler, ConnectionServer, EchoResponder, ServerStats};
