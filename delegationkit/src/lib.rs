//! Delegated-identity sessions for mobile and web clients.
//!
//! This crate is the distribution artifact consumed by host applications. It
//! re-exports [`delegationkit_core`] and, with the default `ffi` feature, ships
//! the foreign-language binding glue generated there.

pub use delegationkit_core::*;

/// Result type defaulting to [`DelegationKitError`].
pub type DelegationKitResult<T, E = DelegationKitError> = std::result::Result<T, E>;
