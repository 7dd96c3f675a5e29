/*!
 * Keyed Store
 *
 * Facade tying together the lock registry, the dispatcher and the
 * completion relay over one root directory:
 *
 * ```text
 *   open(key) ──► FileHandle ── read/write (caller thread)
 *                      │
 *                      └──── read_async ──► read pool ──┐
 *                      └──── write_async ─► write pool ─┼─► relay ─► callback context
 *   delete_*(_async) ─────────────────────► write pool ─┘
 * ```
 *
 * # Caller contract
 *
 * Coordination is per store instance. Two stores rooted at the same
 * directory do not see each other's locks; keep one store per root.
 */

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::adapter::FileAdapter;
use super::config::StoreConfig;
use super::handle::FileHandle;
use super::paths::{ensure_file, remove_file, StoreRoot};
use crate::core::errors::{StoreError, StoreResult};
use crate::core::sync::{EntrySnapshot, LockRegistry};
use crate::dispatch::{Dispatcher, DispatcherStats};
use crate::monitoring::span_operation;
use crate::relay::{CallbackContext, CompletionRelay};

pub(crate) struct StoreShared {
    pub(crate) config: StoreConfig,
    pub(crate) root: StoreRoot,
    pub(crate) registry: Arc<LockRegistry>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) relay: CompletionRelay,
}

/// File-per-key store with coordinated sync and async access
///
/// Cheap to clone; clones share the registry, pools and callback context.
#[derive(Clone)]
pub struct KeyedStore {
    shared: Arc<StoreShared>,
}

impl KeyedStore {
    /// Create a store delivering async results on `context`
    ///
    /// Creates the root directory if needed and starts the write worker.
    pub fn new(config: StoreConfig, context: impl CallbackContext) -> StoreResult<Self> {
        Self::with_shared_context(config, Arc::new(context))
    }

    pub fn with_shared_context(
        config: StoreConfig,
        context: Arc<dyn CallbackContext>,
    ) -> StoreResult<Self> {
        config.validate()?;

        let root = StoreRoot::new(config.root.clone());
        root.ensure_dir()?;

        let dispatcher = Dispatcher::new(&config.thread_name_prefix, config.read_keep_alive)?;
        let relay = CompletionRelay::new(context);

        info!(
            root = %root.path().display(),
            policy = %config.writer_policy,
            callback_context = relay.context_name(),
            "store opened"
        );

        Ok(Self {
            shared: Arc::new(StoreShared {
                registry: Arc::new(LockRegistry::new(config.writer_policy)),
                config,
                root,
                dispatcher,
                relay,
            }),
        })
    }

    /// Bind `key` to its file and `adapter`
    ///
    /// Creates the file empty if absent and registers the key's lock entry.
    pub fn open<T, A>(&self, key: &str, adapter: A) -> StoreResult<FileHandle<T>>
    where
        T: Send + 'static,
        A: FileAdapter<T>,
    {
        self.open_shared(key, Arc::new(adapter))
    }

    /// Like [`KeyedStore::open`], reusing an adapter shared between handles
    pub fn open_shared<T>(
        &self,
        key: &str,
        adapter: Arc<dyn FileAdapter<T>>,
    ) -> StoreResult<FileHandle<T>>
    where
        T: Send + 'static,
    {
        let path = self.shared.root.resolve(key)?;
        ensure_file(&path)?;
        let entry = self.shared.registry.get_or_create(key);
        Ok(FileHandle::new(
            self.shared.clone(),
            key.to_string(),
            path,
            entry,
            adapter,
        ))
    }

    /// Remove the file for `key` once every reader and writer has left
    ///
    /// Runs in write-queue order, after every async write already submitted,
    /// and blocks until done. Returns whether a file was removed. The key's
    /// lock entry is retired; handles opened before the delete fail with
    /// `StaleHandle`.
    pub fn delete_file(&self, key: &str) -> StoreResult<bool> {
        let registry = self.shared.registry.clone();
        let root = self.shared.root.clone();
        let owned = key.to_string();

        self.shared
            .dispatcher
            .run_write(&format!("delete {key}"), move || {
                delete_key(&registry, &root, &owned)
            })
    }

    /// Queue a delete behind every async write already submitted, without blocking
    pub fn delete_file_async<F>(&self, key: &str, callback: F)
    where
        F: FnOnce(StoreResult<bool>) + Send + 'static,
    {
        let completion = self
            .shared
            .relay
            .completion(format!("delete {key}"), callback);
        let registry = self.shared.registry.clone();
        let root = self.shared.root.clone();
        let key = key.to_string();

        self.shared.dispatcher.submit_write(Box::new(move || {
            let span = span_operation("delete", &key);
            let _entered = span.enter();
            let result = delete_key(&registry, &root, &key);
            span.record_result(result.is_ok());
            completion.complete(result);
        }));
    }

    /// Delete every tracked key, one after another
    ///
    /// Like [`KeyedStore::delete_file`], runs after every async write already
    /// submitted. Only keys known to this store are removed; files created
    /// out of band stay. Returns how many files were removed. Keys opened
    /// while the sweep runs may remain tracked.
    pub fn delete_all(&self) -> StoreResult<usize> {
        let registry = self.shared.registry.clone();
        let root = self.shared.root.clone();

        self.shared
            .dispatcher
            .run_write("delete all", move || delete_tracked(&registry, &root))
    }

    /// Queue [`KeyedStore::delete_all`] behind every async write already submitted
    pub fn delete_all_async<F>(&self, callback: F)
    where
        F: FnOnce(StoreResult<usize>) + Send + 'static,
    {
        let completion = self.shared.relay.completion("delete all", callback);
        let registry = self.shared.registry.clone();
        let root = self.shared.root.clone();

        self.shared.dispatcher.submit_write(Box::new(move || {
            let span = span_operation("delete_all", "*");
            let _entered = span.enter();
            let result = delete_tracked(&registry, &root);
            span.record_result(result.is_ok());
            completion.complete(result);
        }));
    }

    /// Keys that currently have a lock entry, sorted
    pub fn tracked_keys(&self) -> Vec<String> {
        self.shared.registry.keys()
    }

    /// Counters of the live entry for `key`, if tracked
    pub fn entry_snapshot(&self, key: &str) -> Option<EntrySnapshot> {
        self.shared.registry.get(key).map(|entry| entry.snapshot())
    }

    pub fn root(&self) -> &Path {
        self.shared.root.path()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    pub fn dispatcher_stats(&self) -> DispatcherStats {
        self.shared.dispatcher.stats()
    }

    /// Stop accepting async work; queued operations still complete
    ///
    /// Async calls made afterwards report `Aborted` through their callback.
    pub fn shutdown(&self) {
        self.shared.dispatcher.shutdown();
        info!(root = %self.shared.root.path().display(), "store shut down");
    }
}

fn delete_key(registry: &LockRegistry, root: &StoreRoot, key: &str) -> StoreResult<bool> {
    let path = root.resolve(key)?;
    let started = Instant::now();

    loop {
        let entry = registry.get_or_create(key);
        let exclusive = match entry.enter_exclusive() {
            Ok(guard) => guard,
            // Lost a race with another delete of the same key; take the fresh entry.
            Err(StoreError::StaleHandle(_)) => continue,
            Err(e) => return Err(e),
        };

        let removed = remove_file(&path)?;
        exclusive.retire();
        registry.remove(key, &entry);
        drop(exclusive);

        debug!(
            key,
            removed,
            waited_us = started.elapsed().as_micros() as u64,
            "key deleted"
        );
        return Ok(removed);
    }
}

fn delete_tracked(registry: &LockRegistry, root: &StoreRoot) -> StoreResult<usize> {
    let mut removed = 0;
    let mut first_error = None;

    for key in registry.keys() {
        match delete_key(registry, root, &key) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "delete failed during sweep");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            info!(removed, root = %root.path().display(), "tracked keys deleted");
            Ok(removed)
        }
    }
}
