/*!
 * System Limits and Constants
 *
 * Centralized location for the socket layer's limits, defaults and status codes.
 *
 * - Performance-relevant constants are marked with [PERF]
 * - Linux-compatible values are marked with [LINUX-COMPAT]
 */

// =============================================================================
// HANDLE TABLE
// =============================================================================

/// First handle handed out by the table
/// Keeps socket handles visually distinct from stdio descriptors
pub const FIRST_SOCKET_HANDLE: i32 = 1000;

/// Default cap on simultaneously open handles
pub const DEFAULT_MAX_OPEN_HANDLES: usize = 1024;

// =============================================================================
// EMULATED TRANSPORT
// =============================================================================

/// Per-direction byte pipe capacity (64KB)
/// [PERF] Matches a typical kernel socket buffer
pub const DEFAULT_STREAM_CAPACITY: usize = 64 * 1024;

/// Largest pending-connection queue a listener may request [LINUX-COMPAT]
pub const MAX_LISTEN_BACKLOG: usize = 128;

/// Ephemeral port range for client aliases [LINUX-COMPAT: IANA dynamic range]
pub const EPHEMERAL_PORT_FIRST: u16 = 49152;
pub const EPHEMERAL_PORT_LAST: u16 = 65535;

// =============================================================================
// SERVER DEFAULTS
// =============================================================================

/// Echo server listen address
pub const DEFAULT_SERVER_HOST: [u8; 4] = [10, 0, 0, 240];
pub const DEFAULT_SERVER_PORT: u16 = 1234;

/// Echo server accept backlog
pub const DEFAULT_SERVER_BACKLOG: i32 = 1;

/// Bytes requested per receive on a connection
pub const DEFAULT_RECV_BUFFER_LEN: usize = 1024;

// =============================================================================
// STATUS CODES [LINUX-COMPAT]
// =============================================================================

/// Sentinel returned through the C-style surface on failure
pub const STATUS_FAILURE: i32 = -1;

pub const EBADF: i32 = 9;
pub const EAGAIN: i32 = 11;
pub const EINVAL: i32 = 22;
pub const EMFILE: i32 = 24;
pub const EPIPE: i32 = 32;
pub const EPROTONOSUPPORT: i32 = 93;
pub const ESOCKTNOSUPPORT: i32 = 94;
pub const EAFNOSUPPORT: i32 = 97;
pub const EADDRINUSE: i32 = 98;
pub const EADDRNOTAVAIL: i32 = 99;
pub const EISCONN: i32 = 106;
pub const ENOTCONN: i32 = 107;
pub const ECONNREFUSED: i32 = 111;
