//! Common test utilities shared across integration tests.
//!
//! Each test binary uses a different subset of these helpers.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use delegationkit_core::{
    connect::{LaunchConfig, UrlOpener, WalletConnectLauncher},
    delegation::{Delegation, DelegationChain, SignedDelegation},
    identity::{ed25519_der, SessionIdentity, SessionIdentityManager},
    storage::{KeyStore, MemoryStore},
    DelegationKitError,
};

/// Records every URL it is asked to open and fails those matching a prefix.
#[derive(Default)]
pub struct RecordingOpener {
    failing: Vec<String>,
    hang: bool,
    opened: Mutex<Vec<String>>,
}

impl RecordingOpener {
    /// An opener that accepts every URL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every URL starting with one of `prefixes`.
    pub fn failing(prefixes: &[&str]) -> Self {
        Self {
            failing: prefixes.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Never returns from `open_url`, like a platform call stuck behind a
    /// system dialog.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// URLs passed to `open_url`, in call order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl UrlOpener for RecordingOpener {
    async fn open_url(&self, url: &str) -> Result<(), DelegationKitError> {
        self.opened.lock().unwrap().push(url.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.failing.iter().any(|prefix| url.starts_with(prefix.as_str())) {
            return Err(DelegationKitError::TransportUnavailable(format!(
                "no handler for {url}"
            )));
        }
        Ok(())
    }
}

/// Public website the launcher falls back to.
pub const WEBSITE: &str = "https://identity.example";

/// Native-only configuration with two scheme targets and no universal link.
pub fn launch_config() -> LaunchConfig {
    LaunchConfig::from_json(&format!(
        r#"{{
            "appName": "Guessing Game",
            "appIconUrl": "https://game.example/icon.png",
            "deepLinkReturnUrl": "app:///wallet-connect",
            "primarySchemeUrl": "wallet://connect",
            "alternateSchemeUrl": "walletapp://connect",
            "websiteFallback": "{WEBSITE}"
        }}"#
    ))
    .expect("valid config")
}

/// A fresh manager over `backend`, as a restarted process would build one.
pub fn identity_manager(backend: &Arc<MemoryStore>) -> Arc<SessionIdentityManager> {
    Arc::new(SessionIdentityManager::new(KeyStore::new(backend.clone())))
}

/// A launcher over [`launch_config`].
pub fn launcher(
    opener: Arc<RecordingOpener>,
    identities: Arc<SessionIdentityManager>,
) -> WalletConnectLauncher {
    WalletConnectLauncher::new(launch_config(), opener, identities)
}

/// Root key of a fake identity provider.
pub fn provider_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

/// A provider-signed chain granting `session` authority until `expiration`.
pub fn chain_for(session: &SessionIdentity, expiration: u64) -> DelegationChain {
    let provider = provider_key();
    let pubkey = session.public_key_der();
    let mut signed = pubkey.clone();
    signed.extend_from_slice(&expiration.to_be_bytes());

    DelegationChain::new(
        vec![SignedDelegation {
            delegation: Delegation {
                pubkey,
                expiration,
                targets: None,
            },
            signature: provider.sign(&signed).to_bytes().to_vec(),
        }],
        ed25519_der(&provider.verifying_key().to_bytes()),
    )
    .expect("valid chain")
}
