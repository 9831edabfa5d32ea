/*!
 * Monitoring Module
 * Tracing setup and per-operation spans
 */

pub mod tracer;

pub use tracer::{generate_trace_id, init_tracing, span_socket, SocketSpan};
