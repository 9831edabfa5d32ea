/*!
 * Socket Tracing
 * Structured tracing for socket operations using the tracing crate
 *
 * Features:
 * - Trace ID per operation for log correlation
 * - JSON-formatted logs for structured parsing
 * - Slow-operation warnings embedded in span close events
 */

use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::core::Handle;

/// Non-blocking operations slower than this are reported at warn level
const SLOW_OPERATION: Duration = Duration::from_millis(100);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - UNISOCKETS_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("UNISOCKETS_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "structured tracing initialized");
    }
}

/// Generate a unique trace ID for request correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one socket operation
pub struct SocketSpan {
    span: tracing::Span,
    start: Instant,
    operation: &'static str,
    trace_id: String,
    blocking: bool,
}

impl SocketSpan {
    pub fn new(operation: &'static str, handle: Option<Handle>) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::DEBUG,
            "socket",
            trace_id = %trace_id,
            operation = operation,
            handle = handle,
            address = tracing::field::Empty,
            bytes = tracing::field::Empty,
            new_handle = tracing::field::Empty,
            result = tracing::field::Empty,
            error = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            operation,
            trace_id,
            blocking: false,
        }
    }

    /// Mark as a blocking call so waiting time is not reported as slowness
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn record_address(&self, address: &impl std::fmt::Display) {
        self.span.record("address", tracing::field::display(address));
    }

    pub fn record_bytes(&self, bytes: usize) {
        self.span.record("bytes", bytes);
    }

    pub fn record_new_handle(&self, handle: Handle) {
        self.span.record("new_handle", handle);
    }

    pub fn record_result(&self, success: bool) {
        self.span.record("result", if success { "success" } else { "error" });
    }

    pub fn record_error(&self, error: &impl std::fmt::Display) {
        self.span.record("error", tracing::field::display(error));
        self.span.record("result", "error");
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for SocketSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);
        let _entered = self.span.enter();

        if !self.blocking && duration > SLOW_OPERATION {
            warn!(
                trace_id = %self.trace_id,
                operation = self.operation,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow socket operation"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                operation = self.operation,
                duration_us = duration.as_micros() as u64,
                "socket operation completed"
            );
        }
    }
}

/// Helper to create a socket operation span
#[inline]
pub fn span_socket(operation: &'static str, handle: Option<Handle>) -> SocketSpan {
    SocketSpan::new(operation, handle)
}
