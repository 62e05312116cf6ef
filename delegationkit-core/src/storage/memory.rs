//! In-memory implementation of [`KeyValueStore`] for testing.
//!
//! This implementation is NOT durable. It is designed for unit and
//! integration tests of hosts and of this crate.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{
    error::{StorageError, StorageResult},
    traits::KeyValueStore,
};

/// In-memory key/value store backed by a `BTreeMap`.
///
/// Thread-safe implementation for testing concurrent access patterns. It can
/// simulate an unavailable backend and a backend without delete support.
#[derive(Debug)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<String, String>>,
    supports_remove: bool,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_remove_support(true)
    }

    /// Creates a store whose `remove_item` reports `Unsupported`.
    #[must_use]
    pub fn without_remove() -> Self {
        Self::with_remove_support(false)
    }

    fn with_remove_support(supports_remove: bool) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            supports_remove,
            unavailable: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Makes every subsequent operation fail with `Unavailable` (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful `set_item` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Reads a raw value, bypassing the availability switch.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.read().get(key).cloned()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        self.check_available()?;
        Ok(self.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check_available()?;
        self.write()
            .insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.check_available()?;
        if !self.supports_remove {
            return Err(StorageError::Unsupported("remove_item".to_string()));
        }
        self.write().remove(key);
        Ok(())
    }

    async fn find(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.check_available()?;
        Ok(self
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_switch() {
        let store = MemoryStore::new();
        store.set_item("k", "v").await.unwrap();
        store.set_unavailable(true);
        assert!(matches!(
            store.get_item("k").await,
            Err(StorageError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_find_by_prefix() {
        let store = MemoryStore::new();
        store.set_item("identity", "a").await.unwrap();
        store.set_item("identity:wallet", "b").await.unwrap();
        store.set_item("delegation", "c").await.unwrap();
        assert_eq!(
            store.find("identity").await.unwrap(),
            vec!["identity".to_string(), "identity:wallet".to_string()]
        );
    }
}
