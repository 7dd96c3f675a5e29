/*!
 * Store Configuration
 *
 * Environment variables (read by `StoreConfig::from_env`):
 * - DIR_STORE_ROOT: store root directory (default: <tmp>/dir-store)
 * - DIR_STORE_WRITER_POLICY: "strict" or "permissive" (default: strict)
 * - DIR_STORE_READ_KEEP_ALIVE_SECS: idle read worker lifetime (default: 60)
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::errors::{StoreError, StoreResult};
use crate::core::sync::WriterPolicy;

pub const ENV_ROOT: &str = "DIR_STORE_ROOT";
pub const ENV_WRITER_POLICY: &str = "DIR_STORE_WRITER_POLICY";
pub const ENV_READ_KEEP_ALIVE: &str = "DIR_STORE_READ_KEEP_ALIVE_SECS";

/// Idle read workers exit after this long without work
pub const DEFAULT_READ_KEEP_ALIVE: Duration = Duration::from_secs(60);
pub const DEFAULT_THREAD_PREFIX: &str = "dir-store";
const DEFAULT_ROOT_DIR: &str = "dir-store";

/// Configuration for one `KeyedStore`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one file per key
    pub root: PathBuf,
    /// Writer/writer exclusion policy for every key of the store
    pub writer_policy: WriterPolicy,
    /// Keep-alive of idle read workers
    pub read_keep_alive: Duration,
    /// Prefix for worker thread names
    pub thread_name_prefix: String,
}

impl StoreConfig {
    /// Defaults rooted at `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            writer_policy: WriterPolicy::default(),
            read_keep_alive: DEFAULT_READ_KEEP_ALIVE,
            thread_name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
        }
    }

    pub fn builder<P: Into<PathBuf>>(root: P) -> StoreConfigBuilder {
        StoreConfigBuilder {
            config: Self::new(root),
        }
    }

    /// Build from `DIR_STORE_*` environment variables
    pub fn from_env() -> StoreResult<Self> {
        let root = std::env::var(ENV_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join(DEFAULT_ROOT_DIR));
        let mut builder = Self::builder(root);

        if let Ok(policy) = std::env::var(ENV_WRITER_POLICY) {
            builder = builder.writer_policy(policy.parse()?);
        }

        if let Ok(secs) = std::env::var(ENV_READ_KEEP_ALIVE) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                StoreError::Config(format!("{ENV_READ_KEEP_ALIVE} must be whole seconds, got {secs:?}"))
            })?;
            builder = builder.read_keep_alive(Duration::from_secs(secs));
        }

        builder.build()
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(StoreError::Config("store root must not be empty".into()));
        }
        if self.read_keep_alive.is_zero() {
            return Err(StoreError::Config("read keep-alive must be positive".into()));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(StoreError::Config("thread name prefix must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(DEFAULT_ROOT_DIR))
    }
}

/// Builder for [`StoreConfig`]
#[derive(Debug, Clone)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    pub fn writer_policy(mut self, policy: WriterPolicy) -> Self {
        self.config.writer_policy = policy;
        self
    }

    pub fn read_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config.read_keep_alive = keep_alive;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> StoreResult<StoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
