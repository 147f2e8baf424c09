//! Storage layer for geoproof.
//!
//! Every piece of cross-invocation state (active event, debounce marker,
//! offline queue, device identity) lives in a [`KeyValueStore`]. The
//! transition handler may run in a freshly started process, so nothing is
//! kept only in memory.

pub mod keys;
mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryKeyValueStore;
pub use traits::{read_json, write_json, KeyValueStore, StorageError};

#[cfg(feature = "persistent")]
pub use persistent::{open_store, PersistentConfig, PersistentKeyValueStore};
