//! Typed access to the host key/value store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use super::{
    error::{StorageError, StorageResult},
    keys::{Namespace, StorageDomain, StorageKey},
    lock::{NamespaceGuard, NamespaceLocks},
    traits::KeyValueStore,
    EMPTY_SENTINEL,
};

/// Durable mapping from typed [`StorageKey`]s to serialized records.
///
/// Every `KeyStore` over the same backend instance shares one set of
/// [`NamespaceLocks`], whether it was cloned or built separately.
#[derive(Clone)]
pub struct KeyStore {
    backend: Arc<dyn KeyValueStore>,
    locks: Arc<NamespaceLocks>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore").finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Wraps a host-provided backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        let locks = locks_for(&backend);
        Self { backend, locks }
    }

    /// Waits for and acquires the lock for `namespace`. Read-modify-write
    /// sequences on a namespace's records run under this guard.
    pub async fn lock(&self, namespace: &Namespace) -> NamespaceGuard {
        self.locks.lock(namespace).await
    }

    /// Reads the record stored under `key`. Empty sentinels read as absent.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn load(&self, key: &StorageKey) -> StorageResult<Option<String>> {
        let value = self.backend.get_item(&key.to_raw()).await?;
        Ok(value.filter(|v| v != EMPTY_SENTINEL))
    }

    /// Writes `value` under `key`.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn save(&self, key: &StorageKey, value: &str) -> StorageResult<()> {
        self.backend.set_item(&key.to_raw(), value).await
    }

    /// Deletes the record under `key`, or overwrites it with the empty sentinel
    /// when the backend cannot delete.
    ///
    /// # Errors
    ///
    /// Propagates backend failures other than missing delete support.
    pub async fn remove(&self, key: &StorageKey) -> StorageResult<()> {
        let raw = key.to_raw();
        match self.backend.remove_item(&raw).await {
            Err(StorageError::Unsupported(reason)) => {
                log::debug!("remove unsupported for {raw} ({reason}); writing empty sentinel");
                self.backend.set_item(&raw, EMPTY_SENTINEL).await
            }
            other => other,
        }
    }

    /// Lists the namespaces holding a live record in `domain`.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn namespaces(&self, domain: StorageDomain) -> StorageResult<Vec<Namespace>> {
        let mut namespaces = Vec::new();
        for raw in self.backend.find(domain.base_key()).await? {
            let Some(namespace) = StorageKey::namespace_from_raw(domain, &raw) else {
                continue;
            };
            let key = StorageKey::new(domain, namespace);
            if self.load(&key).await?.is_some() {
                namespaces.push(key.namespace().clone());
            }
        }
        namespaces.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(namespaces)
    }
}

/// Returns the lock registry of `backend`, creating it on first use.
///
/// Registries are keyed by the backend's address. An entry stays valid only
/// while some `KeyStore` holds the registry, and that `KeyStore` also keeps the
/// backend alive, so a live entry always belongs to the same backend.
fn locks_for(backend: &Arc<dyn KeyValueStore>) -> Arc<NamespaceLocks> {
    static REGISTRY: OnceLock<Mutex<HashMap<usize, Weak<NamespaceLocks>>>> = OnceLock::new();

    let id = Arc::as_ptr(backend).cast::<()>() as usize;
    let mut registry = REGISTRY
        .get_or_init(Mutex::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    registry.retain(|_, locks| locks.strong_count() > 0);

    if let Some(locks) = registry.get(&id).and_then(Weak::upgrade) {
        return locks;
    }
    let locks = Arc::new(NamespaceLocks::new());
    registry.insert(id, Arc::downgrade(&locks));
    locks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn key(namespace: &str) -> StorageKey {
        StorageKey::new(
            StorageDomain::SessionIdentity,
            Namespace::parse(namespace).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_remove_falls_back_to_sentinel() {
        let backend = Arc::new(MemoryStore::without_remove());
        let store = KeyStore::new(backend.clone());
        store.save(&key("wallet"), "record").await.unwrap();

        store.remove(&key("wallet")).await.unwrap();

        assert_eq!(store.load(&key("wallet")).await.unwrap(), None);
        assert_eq!(backend.raw("identity:wallet").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_namespaces_skip_cleared_and_foreign_keys() {
        let backend = Arc::new(MemoryStore::without_remove());
        let store = KeyStore::new(backend.clone());
        store.save(&key(""), "a").await.unwrap();
        store.save(&key("wallet"), "b").await.unwrap();
        store.save(&key("game"), "c").await.unwrap();
        store.remove(&key("game")).await.unwrap();
        backend.set_item("identity-cache", "x").await.unwrap();

        let namespaces = store.namespaces(StorageDomain::SessionIdentity).await.unwrap();

        assert_eq!(
            namespaces,
            vec![Namespace::default(), Namespace::parse("wallet").unwrap()]
        );
    }

    #[tokio::test]
    async fn test_stores_over_one_backend_share_locks() {
        let backend = Arc::new(MemoryStore::new());
        let first = KeyStore::new(backend.clone());
        let second = KeyStore::new(backend);
        let other = KeyStore::new(Arc::new(MemoryStore::new()));
        let wallet = Namespace::parse("wallet").unwrap();

        let _guard = first.lock(&wallet).await;

        assert!(second.locks.try_lock(&wallet).is_none());
        assert!(first.clone().locks.try_lock(&wallet).is_none());
        assert!(other.locks.try_lock(&wallet).is_some());
    }
}
