/*!
 * Per-Key Lock Entry
 *
 * Reader/writer admission for a single key, built on parking_lot's
 * Mutex + Condvar. Admissions are RAII guards; dropping a guard is the
 * matching exit step and wakes every waiter once the key drains.
 *
 * # Protocol
 *
 * ```text
 *   enter_read       wait while writers != 0 || exclusive        readers += 1
 *   enter_write      wait while readers != 0 || exclusive
 *                    (strict: also while writers != 0)           writers += 1
 *   enter_exclusive  wait while readers != 0 || writers != 0
 *                    || exclusive                                exclusive = true
 * ```
 *
 * Every wait re-checks its condition in a loop, so spurious wakeups and
 * competing waiters are harmless. There is no timeout: a stalled holder
 * blocks the key until it releases.
 *
 * Admissions are not re-entrant. A thread already holding any admission on
 * an entry gets `StoreError::Reentrant` instead of deadlocking.
 */

use ahash::AHashSet;
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use tracing::trace;

use super::config::WriterPolicy;
use crate::core::errors::{StoreError, StoreResult};

thread_local! {
    /// Entries this thread currently holds an admission on
    static HELD: RefCell<AHashSet<usize>> = RefCell::new(AHashSet::new());
}

#[derive(Debug, Default)]
struct Counters {
    readers: usize,
    writers: usize,
    exclusive: bool,
    retired: bool,
}

/// Point-in-time view of an entry's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntrySnapshot {
    pub readers: usize,
    pub writers: usize,
    pub exclusive: bool,
    pub retired: bool,
}

impl EntrySnapshot {
    /// No reader, writer or exclusive holder
    pub fn is_idle(&self) -> bool {
        self.readers == 0 && self.writers == 0 && !self.exclusive
    }
}

/// Synchronization state for one key
pub struct LockEntry {
    key: String,
    policy: WriterPolicy,
    state: Mutex<Counters>,
    condvar: Condvar,
}

impl LockEntry {
    pub fn new(key: impl Into<String>, policy: WriterPolicy) -> Self {
        Self {
            key: key.into(),
            policy,
            state: Mutex::new(Counters::default()),
            condvar: Condvar::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn policy(&self) -> WriterPolicy {
        self.policy
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        let state = self.state.lock();
        EntrySnapshot {
            readers: state.readers,
            writers: state.writers,
            exclusive: state.exclusive,
            retired: state.retired,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.state.lock().retired
    }

    /// Admit a reader; blocks while a writer or an exclusive holder is active
    pub fn enter_read(&self) -> StoreResult<ReadGuard<'_>> {
        self.admit(
            |s| s.writers != 0 || s.exclusive,
            |s| s.readers += 1,
        )?;
        trace!(key = %self.key, "read admitted");
        Ok(ReadGuard {
            entry: self,
            _not_send: PhantomData,
        })
    }

    /// Admit a writer; blocks while readers are active (and writers, under strict policy)
    pub fn enter_write(&self) -> StoreResult<WriteGuard<'_>> {
        let exclude_writers = self.policy.excludes_writers();
        self.admit(
            |s| s.readers != 0 || s.exclusive || (exclude_writers && s.writers != 0),
            |s| s.writers += 1,
        )?;
        trace!(key = %self.key, policy = %self.policy, "write admitted");
        Ok(WriteGuard {
            entry: self,
            _not_send: PhantomData,
        })
    }

    /// Admit an exclusive holder once every reader and writer has drained
    pub fn enter_exclusive(&self) -> StoreResult<ExclusiveGuard<'_>> {
        self.admit(
            |s| s.readers != 0 || s.writers != 0 || s.exclusive,
            |s| s.exclusive = true,
        )?;
        trace!(key = %self.key, "exclusive admitted");
        Ok(ExclusiveGuard {
            entry: self,
            _not_send: PhantomData,
        })
    }

    fn admit<B, A>(&self, blocked: B, admit: A) -> StoreResult<()>
    where
        B: Fn(&Counters) -> bool,
        A: FnOnce(&mut Counters),
    {
        self.claim_thread()?;

        let mut state = self.state.lock();
        loop {
            if state.retired {
                drop(state);
                self.release_thread();
                return Err(StoreError::StaleHandle(self.key.clone()));
            }
            if !blocked(&state) {
                break;
            }
            self.condvar.wait(&mut state);
        }
        admit(&mut state);
        Ok(())
    }

    fn exit_read(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.readers > 0, "exit_read without admission");
        state.readers = state.readers.saturating_sub(1);
        let drained = state.readers == 0;
        drop(state);

        self.release_thread();
        if drained {
            self.condvar.notify_all();
        }
    }

    fn exit_write(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.writers > 0, "exit_write without admission");
        state.writers = state.writers.saturating_sub(1);
        let drained = state.writers == 0;
        drop(state);

        self.release_thread();
        if drained {
            self.condvar.notify_all();
        }
    }

    fn exit_exclusive(&self) {
        self.state.lock().exclusive = false;
        self.release_thread();
        self.condvar.notify_all();
    }

    #[inline]
    fn id(&self) -> usize {
        self as *const Self as usize
    }

    fn claim_thread(&self) -> StoreResult<()> {
        let id = self.id();
        HELD.with(|held| {
            if held.borrow_mut().insert(id) {
                Ok(())
            } else {
                Err(StoreError::Reentrant(self.key.clone()))
            }
        })
    }

    fn release_thread(&self) {
        let id = self.id();
        HELD.with(|held| {
            held.borrow_mut().remove(&id);
        });
    }
}

impl fmt::Debug for LockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockEntry")
            .field("key", &self.key)
            .field("policy", &self.policy)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Admissions are tracked per thread, so a guard must be released on the
/// thread that acquired it.
type NotSend = PhantomData<*const ()>;

/// Shared read admission; released on drop
///
/// Guards stay on the acquiring thread:
///
/// ```compile_fail
/// use dir_store::core::{LockEntry, WriterPolicy};
///
/// let entry = LockEntry::new("k", WriterPolicy::Strict);
/// let guard = entry.enter_read().unwrap();
/// std::thread::scope(|s| {
///     s.spawn(move || drop(guard));
/// });
/// ```
#[must_use = "dropping the guard releases the read admission immediately"]
pub struct ReadGuard<'a> {
    entry: &'a LockEntry,
    _not_send: NotSend,
}

impl ReadGuard<'_> {
    pub fn key(&self) -> &str {
        self.entry.key()
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.entry.exit_read();
    }
}

/// Write admission; released on drop
///
/// ```compile_fail
/// use dir_store::core::{LockEntry, WriterPolicy};
///
/// let entry = LockEntry::new("k", WriterPolicy::Strict);
/// let guard = entry.enter_write().unwrap();
/// std::thread::scope(|s| {
///     s.spawn(move || drop(guard));
/// });
/// ```
#[must_use = "dropping the guard releases the write admission immediately"]
pub struct WriteGuard<'a> {
    entry: &'a LockEntry,
    _not_send: NotSend,
}

impl WriteGuard<'_> {
    pub fn key(&self) -> &str {
        self.entry.key()
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.entry.exit_write();
    }
}

/// Exclusive admission used by deletion; released on drop
#[must_use = "dropping the guard releases the exclusive admission immediately"]
pub struct ExclusiveGuard<'a> {
    entry: &'a LockEntry,
    _not_send: NotSend,
}

impl ExclusiveGuard<'_> {
    pub fn key(&self) -> &str {
        self.entry.key()
    }

    /// Mark the entry dead; every later or waiting admission fails with `StaleHandle`
    pub fn retire(&self) {
        self.entry.state.lock().retired = true;
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.entry.exit_exclusive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_readers_share() {
        let entry = LockEntry::new("k", WriterPolicy::Strict);
        let r1 = entry.enter_read().unwrap();
        let r2 = thread::scope(|s| {
            s.spawn(|| {
                let _r = entry.enter_read().unwrap();
                entry.snapshot().readers
            })
            .join()
            .unwrap()
        });
        assert_eq!(r2, 2);
        drop(r1);
        assert!(entry.snapshot().is_idle());
    }

    #[test]
    fn test_writer_waits_for_reader() {
        let entry = Arc::new(LockEntry::new("k", WriterPolicy::Strict));
        let read = entry.enter_read().unwrap();
        let written = Arc::new(AtomicBool::new(false));

        let handle = {
            let entry = entry.clone();
            let written = written.clone();
            thread::spawn(move || {
                let _w = entry.enter_write().unwrap();
                written.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!written.load(Ordering::SeqCst));
        drop(read);
        handle.join().unwrap();
        assert!(written.load(Ordering::SeqCst));
        assert!(entry.snapshot().is_idle());
    }

    #[test]
    fn test_strict_excludes_writers() {
        let entry = Arc::new(LockEntry::new("k", WriterPolicy::Strict));
        let write = entry.enter_write().unwrap();
        let (tx, rx) = mpsc::channel();

        let handle = {
            let entry = entry.clone();
            thread::spawn(move || {
                let _w = entry.enter_write().unwrap();
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(write);
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_permissive_admits_concurrent_writers() {
        let entry = Arc::new(LockEntry::new("k", WriterPolicy::Permissive));
        let _write = entry.enter_write().unwrap();

        let writers = {
            let entry = entry.clone();
            thread::spawn(move || {
                let _w = entry.enter_write().unwrap();
                entry.snapshot().writers
            })
            .join()
            .unwrap()
        };
        assert_eq!(writers, 2);
    }

    #[test]
    fn test_reentrant_acquisition_fails_fast() {
        let entry = LockEntry::new("k", WriterPolicy::Strict);
        let _read = entry.enter_read().unwrap();

        assert!(matches!(entry.enter_read(), Err(StoreError::Reentrant(_))));
        assert!(matches!(entry.enter_write(), Err(StoreError::Reentrant(_))));
        assert_eq!(entry.snapshot().readers, 1);
    }

    #[test]
    fn test_reacquire_after_release() {
        let entry = LockEntry::new("k", WriterPolicy::Strict);
        drop(entry.enter_write().unwrap());
        drop(entry.enter_read().unwrap());
        drop(entry.enter_exclusive().unwrap());
        assert!(entry.snapshot().is_idle());
    }

    #[test]
    fn test_retired_entry_rejects_waiters() {
        let entry = Arc::new(LockEntry::new("k", WriterPolicy::Strict));
        let exclusive = entry.enter_exclusive().unwrap();

        let waiter = {
            let entry = entry.clone();
            thread::spawn(move || {
                let admitted = entry.enter_read().map(|_| ());
                admitted
            })
        };

        thread::sleep(Duration::from_millis(30));
        exclusive.retire();
        drop(exclusive);

        assert!(matches!(
            waiter.join().unwrap(),
            Err(StoreError::StaleHandle(_))
        ));
        assert!(entry.is_retired());
        assert!(matches!(entry.enter_write(), Err(StoreError::StaleHandle(_))));
    }
}
