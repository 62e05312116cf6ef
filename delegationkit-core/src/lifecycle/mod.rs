//! Cancellable operations and cleanup registries.
//!
//! Every suspend-capable operation of a [`WalletSession`](crate::WalletSession)
//! runs inside a [`PendingOperation`], so that a navigation away is always
//! observable and a cancelled operation never delivers its original result.

mod cancel;
mod cleanup;

pub use cancel::{CancelHandle, CancelSignal, OperationState, PendingOperation, Settlement};
pub use cleanup::{CleanupFailure, CleanupRegistry, CleanupReport};
