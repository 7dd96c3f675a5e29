/*!
 * Lock Registry
 * Keyed map of lock entries with atomic create-on-first-use
 */

use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::config::WriterPolicy;
use super::entry::LockEntry;

/// Registry of per-key lock entries
///
/// Entries are created lazily and atomically: two threads racing on the
/// first access to a key receive the same `Arc<LockEntry>`. Entries leave
/// the registry only through [`LockRegistry::remove`], after deletion has
/// retired them.
pub struct LockRegistry {
    entries: DashMap<String, Arc<LockEntry>, RandomState>,
    policy: WriterPolicy,
}

impl LockRegistry {
    pub fn new(policy: WriterPolicy) -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
            policy,
        }
    }

    pub fn policy(&self) -> WriterPolicy {
        self.policy
    }

    /// Get the live entry for a key, creating it if absent
    ///
    /// A retired entry that has not been removed yet is replaced in place,
    /// under the same shard lock, so callers never receive a dead entry.
    pub fn get_or_create(&self, key: &str) -> Arc<LockEntry> {
        if let Some(existing) = self.entries.get(key) {
            if !existing.is_retired() {
                return existing.clone();
            }
        }

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_retired() {
                    let fresh = Arc::new(LockEntry::new(key, self.policy));
                    occupied.insert(fresh.clone());
                    debug!(key, "replaced retired lock entry");
                    fresh
                } else {
                    occupied.get().clone()
                }
            }
            Entry::Vacant(vacant) => {
                let fresh = Arc::new(LockEntry::new(key, self.policy));
                vacant.insert(fresh.clone());
                debug!(key, "created lock entry");
                fresh
            }
        }
    }

    /// Look up an entry without creating it
    pub fn get(&self, key: &str) -> Option<Arc<LockEntry>> {
        self.entries.get(key).map(|e| e.clone())
    }

    /// Remove `entry` if it is still the one registered under `key`
    ///
    /// Returns false when the key maps to a different (newer) entry or to nothing.
    pub fn remove(&self, key: &str, entry: &Arc<LockEntry>) -> bool {
        self.entries
            .remove_if(key, |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    /// Snapshot of the tracked keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new(WriterPolicy::default())
    }
}
