/*!
 * Dir Store Library
 * Per-key coordinated file storage exposed as a library
 */

pub mod core;
pub mod dispatch;
pub mod monitoring;
pub mod relay;
pub mod store;

// Re-exports
pub use crate::core::errors::{StoreError, StoreResult};
pub use crate::core::sync::{EntrySnapshot, LockRegistry, WriterPolicy};
pub use dispatch::{DispatcherStats, PoolStats};
pub use monitoring::init_tracing;
pub use relay::{CallbackContext, EventLoop, InlineContext, LoopHandle};
pub use store::{
    BincodeAdapter, BytesAdapter, FileAdapter, FileHandle, JsonAdapter, KeyedStore, StoreConfig,
    StringAdapter,
};
