/*!
 * Store Module
 * File-per-key storage with coordinated sync and async access
 */

pub mod adapter;
pub mod config;
pub mod handle;
pub mod keyed;
pub mod paths;

// Re-exports
pub use adapter::{BincodeAdapter, BytesAdapter, FileAdapter, JsonAdapter, StringAdapter};
pub use config::{StoreConfig, StoreConfigBuilder};
pub use handle::FileHandle;
pub use keyed::KeyedStore;
pub use paths::{validate_key, StoreRoot};
