//! Persistence for session keys and delegation material.
//!
//! The host supplies a [`KeyValueStore`]; everything above it goes through the
//! typed [`KeyStore`], which is the only component that touches persistent
//! storage directly.

pub mod error;
pub mod key_store;
pub mod keys;
pub mod lock;
pub mod memory;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use key_store::KeyStore;
pub use keys::{Namespace, StorageDomain, StorageKey};
pub use lock::NamespaceLocks;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;

/// Written in place of a record when the backend cannot delete entries.
pub(crate) const EMPTY_SENTINEL: &str = "";
