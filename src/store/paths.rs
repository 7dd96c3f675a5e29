/*!
 * Store Paths
 * Key validation and key → file resolution under a store root
 */

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::core::errors::{StoreError, StoreResult};

/// Check that `key` names exactly one file directly under the root
///
/// Rejects empty keys, separators, `.`/`..` and NUL so a key can never
/// escape the store root.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let invalid = key.is_empty()
        || key.contains(['/', '\\', '\0'])
        || !matches!(
            Path::new(key).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        );

    if invalid {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Root directory of one store; one file per key, named verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRoot {
    root: PathBuf,
}

impl StoreRoot {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `key`
    pub fn resolve(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// Create the root directory (and parents) if missing
    pub fn ensure_dir(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        debug!(root = %self.root.display(), "store root ready");
        Ok(())
    }
}

/// Create an empty file at `path` unless one already exists
pub fn ensure_file(path: &Path) -> StoreResult<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => {
            debug!(path = %path.display(), "created backing file");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Remove the file at `path`; a missing file is not an error
pub fn remove_file(path: &Path) -> StoreResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    }
}
