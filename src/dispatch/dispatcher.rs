/*!
 * Store Dispatcher
 *
 * Background execution for asynchronous store operations:
 *
 * ```text
 *   write_async / delete_*_async ──► write pool (1 worker, FIFO)
 *   delete_file / delete_all     ──► write pool, caller blocks on the result
 *   read_async                   ──► read pool  (elastic, concurrent)
 * ```
 *
 * Writes and deletes queued here run strictly in submission order relative
 * to each other, so a delete always lands after the async writes queued
 * before it. Sync reads and writes stay on the caller thread and are only
 * ordered by the key's admissions.
 */

use std::time::Duration;
use tracing::{debug, info};

use super::pool::{Job, PoolStats, WorkerPool};
use crate::core::errors::{StoreError, StoreResult};

/// Snapshot of both pools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherStats {
    pub write: PoolStats,
    pub read: PoolStats,
}

/// Write pool + read pool pair owned by one store
pub struct Dispatcher {
    write_pool: WorkerPool,
    read_pool: WorkerPool,
}

impl Dispatcher {
    /// Start the dispatcher; threads are named `<prefix>-write` and `<prefix>-read-N`
    pub fn new(thread_prefix: &str, read_keep_alive: Duration) -> StoreResult<Self> {
        let write_pool = WorkerPool::serial(format!("{thread_prefix}-write"))?;
        let read_pool = WorkerPool::elastic(format!("{thread_prefix}-read"), read_keep_alive);

        info!(
            prefix = thread_prefix,
            read_keep_alive_ms = read_keep_alive.as_millis() as u64,
            "dispatcher started"
        );

        Ok(Self {
            write_pool,
            read_pool,
        })
    }

    /// Queue on the single write worker
    pub fn submit_write(&self, job: Job) {
        self.write_pool.submit(job);
    }

    /// Run `job` in write-queue order and wait for its result
    ///
    /// Runs inline when called from the write worker itself, or once the
    /// pool is shut down and nothing new can be queued. A job that is
    /// dropped or panics reports `Aborted`.
    pub fn run_write<R, F>(&self, operation: &str, job: F) -> StoreResult<R>
    where
        R: Send + 'static,
        F: FnOnce() -> StoreResult<R> + Send + 'static,
    {
        if self.write_pool.is_worker_thread() || self.write_pool.is_shutdown() {
            return job();
        }

        let (tx, rx) = flume::bounded(1);
        self.write_pool.submit(Box::new(move || {
            let _ = tx.send(job());
        }));

        rx.recv().unwrap_or_else(|_| {
            debug!(operation, "queued write job ended without a result");
            Err(StoreError::Aborted(operation.to_string()))
        })
    }

    /// Queue on the elastic read pool
    pub fn submit_read(&self, job: Job) {
        self.read_pool.submit(job);
    }

    /// Stop accepting work; already queued jobs still run
    pub fn shutdown(&self) {
        self.write_pool.shutdown();
        self.read_pool.shutdown();
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            write: self.write_pool.stats(),
            read: self.read_pool.stats(),
        }
    }
}
