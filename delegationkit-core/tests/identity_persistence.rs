//! Session keys across restarts, concurrent callers and degraded backends.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use delegationkit_core::{storage::MemoryStore, DelegationKitError};

#[tokio::test]
async fn test_identity_survives_restart() {
    let backend = Arc::new(MemoryStore::new());

    let before_restart = common::identity_manager(&backend);
    assert!(before_restart.existing("wallet").await.unwrap().is_none());
    let k1 = before_restart.get_or_create("wallet").await.unwrap();
    drop(before_restart);

    let after_restart = common::identity_manager(&backend);
    let restored = after_restart.get_or_create("wallet").await.unwrap();

    assert_eq!(*restored.to_record(), *k1.to_record());
    assert_eq!(restored.principal(), k1.principal());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_create_generates_one_key() {
    let backend = Arc::new(MemoryStore::new());
    let manager = common::identity_manager(&backend);

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_or_create("wallet").await })
        })
        .collect();

    let mut keys = HashSet::new();
    for task in tasks {
        let identity = task.await.unwrap().unwrap();
        keys.insert(identity.public_key());
    }

    assert_eq!(keys.len(), 1);
    assert_eq!(backend.write_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_namespaces_proceed_independently() {
    let backend = Arc::new(MemoryStore::new());
    let manager = common::identity_manager(&backend);

    let tasks: Vec<_> = ["wallet", "game", "default"]
        .into_iter()
        .map(|namespace| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_or_create(namespace).await })
        })
        .collect();
    let mut keys = HashSet::new();
    for task in tasks {
        keys.insert(task.await.unwrap().unwrap().public_key());
    }

    assert_eq!(keys.len(), 3);
    assert!(backend.raw("identity").is_some());
    assert!(backend.raw("identity:wallet").is_some());
    assert!(backend.raw("identity:game").is_some());
}

#[tokio::test]
async fn test_clear_without_delete_support_writes_sentinel() {
    let backend = Arc::new(MemoryStore::without_remove());
    let manager = common::identity_manager(&backend);

    let before = manager.get_or_create("wallet").await.unwrap();
    manager.clear("wallet").await;

    assert_eq!(backend.raw("identity:wallet").as_deref(), Some(""));
    let after = manager.get_or_create("wallet").await.unwrap();
    assert_ne!(before.public_key(), after.public_key());
}

#[tokio::test]
async fn test_unavailable_backend_is_surfaced() {
    let backend = Arc::new(MemoryStore::new());
    let manager = common::identity_manager(&backend);
    backend.set_unavailable(true);

    let err = manager.get_or_create("wallet").await.unwrap_err();

    assert!(matches!(err, DelegationKitError::StorageUnavailable(_)));
    assert!(err.is_user_visible());
}
