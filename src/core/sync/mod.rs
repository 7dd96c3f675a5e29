/*!
 * Synchronization Primitives
 *
 * Per-key reader/writer coordination:
 * - `LockEntry`: counters + condvar for one key, RAII admissions
 * - `LockRegistry`: keyed entries with atomic create-on-first-use
 * - `WriterPolicy`: strict (exclusive) or permissive (overlapping) writers
 */

mod config;
mod entry;
mod registry;

pub use config::WriterPolicy;
pub use entry::{EntrySnapshot, ExclusiveGuard, LockEntry, ReadGuard, WriteGuard};
pub use registry::LockRegistry;
