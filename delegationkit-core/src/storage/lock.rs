//! Per-namespace locks for serializing read-modify-write sequences.
//!
//! Critical sections span storage round-trips, so the per-namespace lock is an
//! async mutex. The registry of locks itself is only touched briefly and uses a
//! std mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::keys::Namespace;

/// Guard that holds a namespace lock for its lifetime.
pub type NamespaceGuard = OwnedMutexGuard<()>;

/// Async mutual exclusion keyed by [`Namespace`].
///
/// Different namespaces never contend with each other. Entries nobody holds or
/// waits on are pruned, so the registry only tracks namespaces in use.
#[derive(Debug, Default)]
pub struct NamespaceLocks {
    locks: Mutex<HashMap<Namespace, Arc<AsyncMutex<()>>>>,
}

impl NamespaceLocks {
    /// Creates an empty lock registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and acquires the lock for `namespace`.
    pub async fn lock(&self, namespace: &Namespace) -> NamespaceGuard {
        self.get_lock(namespace).lock_owned().await
    }

    /// Acquires the lock for `namespace` if it is free.
    #[must_use]
    pub fn try_lock(&self, namespace: &Namespace) -> Option<NamespaceGuard> {
        self.get_lock(namespace).try_lock_owned().ok()
    }

    /// Number of namespaces currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no lock has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_lock(&self, namespace: &Namespace) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Guards and waiters hold a clone; a count of one means the entry is idle.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry(namespace.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_is_exclusive_per_namespace() {
        let locks = NamespaceLocks::new();
        let wallet = Namespace::parse("wallet").unwrap();
        let game = Namespace::parse("game").unwrap();

        let guard = locks.lock(&wallet).await;
        assert!(locks.try_lock(&wallet).is_none());
        assert!(locks.try_lock(&game).is_some());

        drop(guard);
        assert!(locks.try_lock(&wallet).is_some());
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = NamespaceLocks::new();
        let held = locks.lock(&Namespace::parse("held").unwrap()).await;
        for i in 0..16 {
            drop(locks.lock(&Namespace::parse(&format!("ns{i}")).unwrap()).await);
        }

        assert_eq!(locks.len(), 2);
        drop(held);
        drop(locks.lock(&Namespace::default()).await);
        assert_eq!(locks.len(), 1);
    }
}
