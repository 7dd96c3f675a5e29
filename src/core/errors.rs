/*!
 * Error Types
 * Centralized error handling with thiserror and miette diagnostics
 */

use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Store operation result
///
/// # Must Use
/// Store operations can fail and must be handled to prevent data loss
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the store, its adapters and the access protocol
#[derive(Error, Debug, Diagnostic)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    #[diagnostic(
        code(store::io),
        help("Check that the store root exists and is writable.")
    )]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Codec error on {}: {message}", path.display())]
    #[diagnostic(
        code(store::codec),
        help("The file content does not match the adapter's value type.")
    )]
    Codec { path: PathBuf, message: String },

    #[error("Invalid key: {0:?}")]
    #[diagnostic(
        code(store::invalid_key),
        help("Keys are single file names: non-empty, no separators, not '.' or '..'.")
    )]
    InvalidKey(String),

    #[error("Stale handle for key {0:?}: the key was deleted")]
    #[diagnostic(
        code(store::stale_handle),
        help("Re-open the key to obtain a fresh handle.")
    )]
    StaleHandle(String),

    #[error("Re-entrant access to key {0:?} from the same thread")]
    #[diagnostic(
        code(store::reentrant),
        help("Release the current read/write admission before acquiring another on the same key.")
    )]
    Reentrant(String),

    #[error("Operation {0:?} was aborted before completing")]
    #[diagnostic(code(store::aborted))]
    Aborted(String),

    #[error("Failed to start worker for pool {pool}: {source}")]
    #[diagnostic(
        code(store::worker_spawn),
        help("The process may have hit its thread limit.")
    )]
    WorkerSpawn {
        pool: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(store::config))]
    Config(String),
}

impl StoreError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a serialization failure with the path it happened on
    pub fn codec(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Codec {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True for failures caused by misuse of the API rather than the environment
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey(_) | Self::StaleHandle(_) | Self::Reentrant(_)
        )
    }
}
