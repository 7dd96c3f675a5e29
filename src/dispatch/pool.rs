/*!
 * Worker Pools
 *
 * Two shapes of OS-thread pool fed by a flume channel:
 *
 * - **Serial**: exactly one worker, started eagerly. Jobs run strictly in
 *   submission order.
 * - **Elastic**: no fixed size. A submit reuses an idle worker when one is
 *   parked, otherwise it starts a new one. Workers idle longer than the
 *   keep-alive exit.
 *
 * ## Idle accounting
 *
 * `idle` counts parked workers that nobody has claimed. A submit that finds
 * `idle > 0` claims one slot before sending, so every queued job is matched
 * by either a claimed idle worker or a freshly started one. A worker whose
 * receive times out only exits if an unclaimed slot is left; otherwise a
 * claimed job is on its way and it keeps receiving.
 *
 * A panicking job is caught and counted; the worker survives.
 * Dropping the pool disconnects the channel and workers exit once the queue
 * is drained. Workers are never joined, so a pool may be dropped from one of
 * its own jobs.
 */

use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::core::errors::{StoreError, StoreResult};

thread_local! {
    /// Address of the `PoolShared` this thread works for, 0 elsewhere
    static CURRENT_POOL: Cell<usize> = const { Cell::new(0) };
}

/// Unit of work run on a pool thread
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Serial,
    Elastic,
}

/// Counters for one pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub name: String,
    pub kind: PoolKind,
    pub submitted: u64,
    pub completed: u64,
    pub panicked: u64,
    pub live_workers: usize,
    pub idle_workers: usize,
    pub queued: usize,
}

struct PoolShared {
    name: String,
    kind: PoolKind,
    keep_alive: Duration,
    idle: Mutex<usize>,
    live_workers: AtomicUsize,
    next_worker: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl PoolShared {
    fn run(&self, job: Job) {
        match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(()) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                error!(pool = %self.name, "job panicked; worker continues");
            }
        }
    }
}

/// A named pool of worker threads
pub struct WorkerPool {
    sender: RwLock<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Single-worker pool; the worker thread is started immediately
    pub fn serial(name: impl Into<String>) -> StoreResult<Self> {
        let pool = Self::with_kind(name.into(), PoolKind::Serial, Duration::MAX);
        pool.spawn_worker()?;
        Ok(pool)
    }

    /// Unbounded pool that grows on demand and retires idle workers
    pub fn elastic(name: impl Into<String>, keep_alive: Duration) -> Self {
        Self::with_kind(name.into(), PoolKind::Elastic, keep_alive)
    }

    fn with_kind(name: String, kind: PoolKind, keep_alive: Duration) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            shared: Arc::new(PoolShared {
                name,
                kind,
                keep_alive,
                idle: Mutex::new(0),
                live_workers: AtomicUsize::new(0),
                next_worker: AtomicUsize::new(0),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                panicked: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn kind(&self) -> PoolKind {
        self.shared.kind
    }

    /// Queue a job
    ///
    /// If the job cannot be queued (pool shut down, or no worker could be
    /// started) it is dropped without running; jobs that own a completion
    /// report the abort through it.
    pub fn submit(&self, job: Job) {
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            warn!(pool = %self.shared.name, "submit after shutdown; job dropped");
            return;
        };

        if self.shared.kind == PoolKind::Elastic && !self.claim_idle() {
            if let Err(e) = self.spawn_worker() {
                error!(pool = %self.shared.name, error = %e, "no worker available; job dropped");
                return;
            }
        }

        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        if sender.send(job).is_err() {
            error!(pool = %self.shared.name, "queue disconnected; job dropped");
        }
    }

    /// Stop accepting jobs; queued jobs still run
    pub fn shutdown(&self) {
        if self.sender.write().take().is_some() {
            debug!(pool = %self.shared.name, "pool shut down");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.read().is_none()
    }

    /// True when called from one of this pool's workers
    pub fn is_worker_thread(&self) -> bool {
        let pool = Arc::as_ptr(&self.shared) as usize;
        CURRENT_POOL.with(|current| current.get() == pool)
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        PoolStats {
            name: shared.name.clone(),
            kind: shared.kind,
            submitted: shared.submitted.load(Ordering::Relaxed),
            completed: shared.completed.load(Ordering::Relaxed),
            panicked: shared.panicked.load(Ordering::Relaxed),
            live_workers: shared.live_workers.load(Ordering::Relaxed),
            idle_workers: *shared.idle.lock(),
            queued: self.receiver.len(),
        }
    }

    fn claim_idle(&self) -> bool {
        let mut idle = self.shared.idle.lock();
        if *idle > 0 {
            *idle -= 1;
            true
        } else {
            false
        }
    }

    fn spawn_worker(&self) -> StoreResult<()> {
        let shared = self.shared.clone();
        let receiver = self.receiver.clone();
        let thread_name = match shared.kind {
            PoolKind::Serial => shared.name.clone(),
            PoolKind::Elastic => format!(
                "{}-{}",
                shared.name,
                shared.next_worker.fetch_add(1, Ordering::Relaxed)
            ),
        };

        shared.live_workers.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                CURRENT_POOL.with(|current| current.set(Arc::as_ptr(&shared) as usize));
                match shared.kind {
                    PoolKind::Serial => serial_loop(&shared, &receiver),
                    PoolKind::Elastic => elastic_loop(&shared, &receiver),
                }
                shared.live_workers.fetch_sub(1, Ordering::Relaxed);
                debug!(pool = %shared.name, "worker exited");
            });

        match spawned {
            Ok(_) => {
                debug!(pool = %self.shared.name, thread = %thread_name, "worker started");
                Ok(())
            }
            Err(source) => {
                self.shared.live_workers.fetch_sub(1, Ordering::Relaxed);
                Err(StoreError::WorkerSpawn {
                    pool: self.shared.name.clone(),
                    source,
                })
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serial_loop(shared: &PoolShared, receiver: &Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        shared.run(job);
    }
}

fn elastic_loop(shared: &PoolShared, receiver: &Receiver<Job>) {
    loop {
        match receiver.recv_timeout(shared.keep_alive) {
            Ok(job) => {
                shared.run(job);
                *shared.idle.lock() += 1;
            }
            Err(RecvTimeoutError::Timeout) => {
                let mut idle = shared.idle.lock();
                if *idle > 0 {
                    *idle -= 1;
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
