#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Delegated-identity sessions.
//!
//! A locally generated Ed25519 session key is granted time-boxed authority by an
//! external identity provider or wallet. The resulting delegation chain is used
//! to sign subsequent requests to a remote service.
//!
//! The building blocks, leaves first:
//!
//! - [`storage`]: the host-provided key/value contract and the typed [`KeyStore`] on top of it.
//! - [`identity`]: session key pairs and the [`SessionIdentityManager`].
//! - [`delegation`]: delegation chains, the payload parser and [`DelegatedIdentity`].
//! - [`connect`]: the outbound wallet connect launcher and inbound return handling.
//! - [`lifecycle`]: cancellable operations and cleanup registries.
//! - [`trust`]: the response [`TrustPolicy`].
//! - [`session`]: [`WalletSession`], tying the round-trip together.
//! - [`service`]: the signed-request surface of the remote service.
use strum::EnumString;

/// Deployment environment used to pick configuration defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    /// Pre-production deployment.
    Staging,
    /// Production deployment.
    Production,
}

pub mod connect;
pub mod defaults;
pub mod delegation;
pub mod identity;
pub mod lifecycle;
pub mod logger;
pub mod service;
pub mod session;
pub mod storage;
pub mod trust;

mod error;
pub use error::*;

pub use connect::{LaunchConfig, LaunchReport, UrlOpener, WalletConnectLauncher, WalletConnectRequest};
pub use defaults::DefaultConfig;
pub use delegation::{DelegatedIdentity, DelegationChain, DelegationParser, SignedRequest};
pub use identity::{Principal, SessionIdentity, SessionIdentityManager};
pub use lifecycle::{CancelSignal, CleanupRegistry, PendingOperation, Settlement};
pub use service::{RemoteService, ServiceClient, ServiceMethod};
pub use session::{Platform, WalletSession};
pub use storage::{KeyStore, KeyValueStore, Namespace, StorageKey};
pub use trust::{RootKeyVerifier, TrustMode, TrustPolicy};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("delegationkit_core");
