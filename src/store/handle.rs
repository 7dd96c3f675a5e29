/*!
 * File Handle
 * Typed access to one key of a `KeyedStore`
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::adapter::FileAdapter;
use super::keyed::StoreShared;
use crate::core::errors::StoreResult;
use crate::core::sync::{EntrySnapshot, LockEntry};
use crate::monitoring::span_operation;

/// Handle bound to one key, its file and a value adapter
///
/// Handles are lightweight; open as many as needed. A handle keeps the lock
/// entry it was opened with. After the key is deleted, every operation
/// through the handle fails with `StaleHandle`; open the key again.
pub struct FileHandle<T> {
    shared: Arc<StoreShared>,
    key: String,
    path: PathBuf,
    entry: Arc<LockEntry>,
    adapter: Arc<dyn FileAdapter<T>>,
}

impl<T: Send + 'static> FileHandle<T> {
    pub(crate) fn new(
        shared: Arc<StoreShared>,
        key: String,
        path: PathBuf,
        entry: Arc<LockEntry>,
        adapter: Arc<dyn FileAdapter<T>>,
    ) -> Self {
        Self {
            shared,
            key,
            path,
            entry,
            adapter,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Swap the adapter used by later operations on this handle
    pub fn set_adapter(&mut self, adapter: impl FileAdapter<T>) {
        self.adapter = Arc::new(adapter);
    }

    /// Counters of this handle's lock entry
    pub fn snapshot(&self) -> EntrySnapshot {
        self.entry.snapshot()
    }

    /// True once the key has been deleted out from under this handle
    pub fn is_stale(&self) -> bool {
        self.entry.is_retired()
    }

    /// Write `value` on the calling thread, waiting for readers to leave first
    #[instrument(level = "debug", skip_all, fields(key = %self.key))]
    pub fn write(&self, value: &T) -> StoreResult<()> {
        write_entry(&self.entry, self.adapter.as_ref(), &self.path, value)
    }

    /// Write `value` on the write worker and report through the callback context
    ///
    /// Async writes run one at a time in submission order.
    pub fn write_async<F>(&self, value: T, callback: F)
    where
        F: FnOnce(StoreResult<()>) + Send + 'static,
    {
        let completion = self
            .shared
            .relay
            .completion(format!("write {}", self.key), callback);
        let entry = self.entry.clone();
        let adapter = self.adapter.clone();
        let path = self.path.clone();

        self.shared.dispatcher.submit_write(Box::new(move || {
            let span = span_operation("write", entry.key());
            let _entered = span.enter();
            let result = write_entry(&entry, adapter.as_ref(), &path, &value);
            span.record_result(result.is_ok());
            completion.complete(result);
        }));
    }

    /// Read on the calling thread, waiting for any writer to finish first
    #[instrument(level = "debug", skip_all, fields(key = %self.key))]
    pub fn read(&self) -> StoreResult<T> {
        read_entry(&self.entry, self.adapter.as_ref(), &self.path)
    }

    /// Read on the read pool and report through the callback context
    pub fn read_async<F>(&self, callback: F)
    where
        F: FnOnce(StoreResult<T>) + Send + 'static,
    {
        let completion = self
            .shared
            .relay
            .completion(format!("read {}", self.key), callback);
        let entry = self.entry.clone();
        let adapter = self.adapter.clone();
        let path = self.path.clone();

        self.shared.dispatcher.submit_read(Box::new(move || {
            let span = span_operation("read", entry.key());
            let _entered = span.enter();
            let result = read_entry(&entry, adapter.as_ref(), &path);
            span.record_result(result.is_ok());
            completion.complete(result);
        }));
    }
}

impl<T> Clone for FileHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            key: self.key.clone(),
            path: self.path.clone(),
            entry: self.entry.clone(),
            adapter: self.adapter.clone(),
        }
    }
}

impl<T> fmt::Debug for FileHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("entry", &self.entry.snapshot())
            .finish()
    }
}

// The admission guard is dropped before these return, so async callers
// always release the key before their completion is scheduled.

fn write_entry<T: 'static>(
    entry: &LockEntry,
    adapter: &dyn FileAdapter<T>,
    path: &Path,
    value: &T,
) -> StoreResult<()> {
    let _admission = entry.enter_write()?;
    let result = adapter.write(path, value);
    if let Err(e) = &result {
        debug!(key = entry.key(), error = %e, "write failed");
    }
    result
}

fn read_entry<T: 'static>(
    entry: &LockEntry,
    adapter: &dyn FileAdapter<T>,
    path: &Path,
) -> StoreResult<T> {
    let _admission = entry.enter_read()?;
    let result = adapter.read(path);
    if let Err(e) = &result {
        debug!(key = entry.key(), error = %e, "read failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::StoreError;
    use crate::relay::InlineContext;
    use crate::store::{BytesAdapter, KeyedStore, StoreConfig, StringAdapter};
    use std::sync::mpsc;
    use std::time::Duration;

    fn store(dir: &tempfile::TempDir) -> KeyedStore {
        KeyedStore::new(StoreConfig::new(dir.path()), InlineContext).unwrap()
    }

    #[test]
    fn test_sync_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let handle = store(&dir).open("file1", StringAdapter).unwrap();
        handle.write(&"content".to_string()).unwrap();
        assert_eq!(handle.read().unwrap(), "content");
        assert!(handle.snapshot().is_idle());
    }

    #[test]
    fn test_async_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let handle = store(&dir).open("file1", StringAdapter).unwrap();
        let (tx, rx) = mpsc::channel();

        let write_tx = tx.clone();
        handle.write_async("content".to_string(), move |r| {
            write_tx.send(r.map(|_| String::new())).unwrap();
        });
        rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();

        handle.read_async(move |r| tx.send(r).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap(), "content");
    }

    #[test]
    fn test_set_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let st = store(&dir);
        let mut handle = st.open("raw", BytesAdapter).unwrap();
        handle.write(&b"bytes".to_vec()).unwrap();
        handle.set_adapter(BytesAdapter);
        assert_eq!(handle.read().unwrap(), b"bytes".to_vec());
    }

    #[test]
    fn test_stale_handle_after_delete() {
        let dir = tempfile::tempdir().unwrap();
        let st = store(&dir);
        let handle = st.open("file1", StringAdapter).unwrap();
        st.delete_file("file1").unwrap();

        assert!(handle.is_stale());
        assert!(matches!(
            handle.write(&"x".to_string()),
            Err(StoreError::StaleHandle(_))
        ));

        let reopened = st.open("file1", StringAdapter).unwrap();
        reopened.write(&"again".to_string()).unwrap();
        assert_eq!(reopened.read().unwrap(), "again");
    }
}
