//! Platform interface for durable key/value storage.

use async_trait::async_trait;

use super::error::StorageResult;

/// Durable string key/value storage provided by the host platform.
///
/// Platform implementations typically map this onto:
/// - iOS: Keychain Services
/// - Android: `EncryptedSharedPreferences`
/// - Browser: `IndexedDB` (or `localStorage` for non-sensitive slots)
///
/// Every key is independently lockable; no cross-key transactions are required.
/// Implementations must not block the calling task for long periods.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`](super::StorageError::Unavailable)
    /// if the backend cannot be read.
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes `value` under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`](super::StorageError::Unsupported)
    /// when the backend cannot delete entries, or an error if the delete fails.
    async fn remove_item(&self, key: &str) -> StorageResult<()>;

    /// Lists every stored key starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated.
    async fn find(&self, prefix: &str) -> StorageResult<Vec<String>>;
}
