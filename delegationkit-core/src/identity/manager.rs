//! Create-or-load lifecycle of session identities.

use crate::{
    error::DelegationKitError,
    storage::{KeyStore, Namespace, StorageDomain, StorageKey},
};

use super::SessionIdentity;

/// Owns the key pair lifecycle on top of a [`KeyStore`].
///
/// `get_or_create` is idempotent per namespace: repeated calls return the same
/// key pair until [`clear`](Self::clear) is called. Concurrent calls for one
/// namespace are serialized through the [`KeyStore`] lock, so exactly one key
/// pair is ever generated and stored for it, even across managers sharing a
/// backend.
#[derive(Debug)]
pub struct SessionIdentityManager {
    key_store: KeyStore,
}

impl SessionIdentityManager {
    /// Creates a manager over `key_store`.
    #[must_use]
    pub fn new(key_store: KeyStore) -> Self {
        Self { key_store }
    }

    /// The key store backing this manager.
    #[must_use]
    pub const fn key_store(&self) -> &KeyStore {
        &self.key_store
    }

    /// Returns the identity stored for `namespace`, generating and persisting
    /// a new one if none exists or the stored record is malformed.
    ///
    /// # Errors
    ///
    /// - [`DelegationKitError::InvalidInput`] for an invalid namespace.
    /// - [`DelegationKitError::StorageUnavailable`] if the backend fails.
    /// - [`DelegationKitError::KeyGenerationFailed`] if no randomness is available.
    pub async fn get_or_create(&self, namespace: &str) -> Result<SessionIdentity, DelegationKitError> {
        let namespace = Namespace::parse(namespace)?;
        let key = StorageKey::new(StorageDomain::SessionIdentity, namespace.clone());

        let _guard = self.key_store.lock(&namespace).await;

        if let Some(identity) = self.load_locked(&key).await? {
            return Ok(identity);
        }

        let identity = SessionIdentity::generate(namespace)?;
        self.key_store.save(&key, &identity.to_record()).await?;
        log::info!(
            "generated session identity for namespace {} ({})",
            key.namespace(),
            identity.principal()
        );
        Ok(identity)
    }

    /// Returns the identity stored for `namespace` without creating one.
    ///
    /// # Errors
    ///
    /// See [`Self::get_or_create`].
    pub async fn existing(&self, namespace: &str) -> Result<Option<SessionIdentity>, DelegationKitError> {
        let namespace = Namespace::parse(namespace)?;
        let key = StorageKey::new(StorageDomain::SessionIdentity, namespace.clone());
        let _guard = self.key_store.lock(&namespace).await;
        self.load_locked(&key).await
    }

    /// Deletes the identity stored for `namespace`.
    ///
    /// Idempotent, and never fails the caller: backend failures are logged.
    pub async fn clear(&self, namespace: &str) {
        let namespace = match Namespace::parse(namespace) {
            Ok(namespace) => namespace,
            Err(e) => {
                log::warn!("ignoring clear for invalid namespace: {e}");
                return;
            }
        };
        let key = StorageKey::new(StorageDomain::SessionIdentity, namespace.clone());

        let _guard = self.key_store.lock(&namespace).await;
        match self.key_store.remove(&key).await {
            Ok(()) => log::debug!("cleared session identity for namespace {namespace}"),
            Err(e) => log::warn!("failed to clear session identity for namespace {namespace}: {e}"),
        }
    }

    /// Namespaces that currently hold a stored identity.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::StorageUnavailable`] if the backend fails.
    pub async fn namespaces(&self) -> Result<Vec<Namespace>, DelegationKitError> {
        Ok(self.key_store.namespaces(StorageDomain::SessionIdentity).await?)
    }

    async fn load_locked(&self, key: &StorageKey) -> Result<Option<SessionIdentity>, DelegationKitError> {
        let Some(record) = self.key_store.load(key).await? else {
            return Ok(None);
        };
        let identity = SessionIdentity::from_record(key.namespace().clone(), &record);
        if identity.is_none() {
            log::warn!("stored session identity under {key} is malformed; treating as absent");
        }
        Ok(identity)
    }
}
