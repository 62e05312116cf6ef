use thiserror::Error;

use crate::storage::StorageError;

/// Error outputs from `DelegationKit`
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum DelegationKitError {
    /// The persistence backend failed. Not retried automatically.
    #[error("storage_unavailable: {0}")]
    StorageUnavailable(String),
    /// The cryptographic primitive failed to produce a key pair. The caller may retry.
    #[error("key_generation_failed: {0}")]
    KeyGenerationFailed(String),
    /// A delegation was decoded but violates the chain invariants.
    #[error("delegation_structurally_invalid: {reason}")]
    DelegationStructurallyInvalid {
        /// Which invariant was violated.
        reason: String,
    },
    /// The delegation chain is past its expiration.
    #[error("delegation_expired")]
    DelegationExpired,
    /// No wallet target, including the website fallback, could be opened.
    #[error("transport_unavailable: {0}")]
    TransportUnavailable(String),
    /// The operation was intentionally abandoned.
    #[error("cancelled")]
    Cancelled,
    /// The presented input is not valid for the requested operation
    #[error("invalid_input_{attribute}: {reason}")]
    InvalidInput {
        /// The attribute that was invalid.
        attribute: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A remote response failed the configured trust policy.
    #[error("untrusted_response: {0}")]
    UntrustedResponse(String),
    /// The remote service answered with a textual error.
    #[error("remote_rejected: {0}")]
    RemoteRejected(String),
    /// Unexpected error serializing information
    #[error("serialization_error: {0}")]
    SerializationError(String),
}

impl DelegationKitError {
    /// Whether the error should be surfaced to the user.
    ///
    /// Cancellation is the result of a user-initiated navigation away and
    /// resolves to silence; everything else warrants an error or retry affordance.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    pub(crate) fn invalid_input(attribute: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn structurally_invalid(reason: impl Into<String>) -> Self {
        Self::DelegationStructurallyInvalid {
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for DelegationKitError {
    fn from(error: StorageError) -> Self {
        Self::StorageUnavailable(error.to_string())
    }
}

impl From<serde_json::Error> for DelegationKitError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError(error.to_string())
    }
}
