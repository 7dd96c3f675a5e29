/*!
 * Tracing
 * Structured tracing setup and per-operation spans for store operations
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

pub const ENV_TRACE_JSON: &str = "DIR_STORE_TRACE_JSON";

/// Operations slower than this are reported at warn level
pub const SLOW_OPERATION: Duration = Duration::from_millis(250);

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - DIR_STORE_TRACE_JSON: Enable JSON output (default: false)
///
/// Calling this more than once (or after another subscriber was installed)
/// is harmless; later calls are ignored.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(ENV_TRACE_JSON)
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
                    .with_span_list(true),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        debug!(json = use_json, "tracing initialized");
    }
}

/// Span covering one store operation, logged with its duration when dropped
pub struct OperationSpan {
    span: tracing::Span,
    start: Instant,
    id: u64,
    operation: &'static str,
}

impl OperationSpan {
    pub fn new(operation: &'static str, key: &str) -> Self {
        let id = NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed);
        let span = span!(
            Level::DEBUG,
            "store_op",
            op_id = id,
            operation = operation,
            key = key,
            result = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            id,
            operation,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enter the span for the current scope
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn record_result(&self, success: bool) {
        self.span
            .record("result", if success { "success" } else { "error" });
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let _entered = self.span.enter();

        if elapsed > SLOW_OPERATION {
            warn!(
                op_id = self.id,
                operation = self.operation,
                duration_ms = elapsed.as_millis() as u64,
                slow = true,
                "slow store operation"
            );
        } else {
            debug!(
                op_id = self.id,
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "store operation completed"
            );
        }
    }
}

/// Create a span for an asynchronous store operation
pub fn span_operation(operation: &'static str, key: &str) -> OperationSpan {
    OperationSpan::new(operation, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn test_operation_ids_increase() {
        let a = span_operation("read", "k");
        let b = span_operation("write", "k");
        assert!(b.id() > a.id());
        a.record_result(true);
        b.record_result(false);
    }
}
