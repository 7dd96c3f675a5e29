/*!
 * Dispatch Layer
 * Background pools driving asynchronous store operations
 */

pub mod dispatcher;
pub mod pool;

pub use dispatcher::{Dispatcher, DispatcherStats};
pub use pool::{Job, PoolKind, PoolStats, WorkerPool};
