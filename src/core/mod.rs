/*!
 * Core Module
 * Error handling and per-key synchronization
 */

pub mod errors;
pub mod sync;

// Re-export for convenience
pub use errors::*;
pub use sync::{
    EntrySnapshot, ExclusiveGuard, LockEntry, LockRegistry, ReadGuard, WriteGuard, WriterPolicy,
};
