/*!
 * Monitoring
 * Structured tracing for store operations
 */

mod tracer;

pub use tracer::{init_tracing, span_operation, OperationSpan, ENV_TRACE_JSON, SLOW_OPERATION};
