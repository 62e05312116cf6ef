//! The wallet connect round-trip as seen by a screen.
//!
//! A [`WalletSession`] lives as long as the screen that drives the login. Every
//! suspending step runs as a [`PendingOperation`]; navigating away
//! ([`WalletSession::cancel_pending`]) or tearing the screen down
//! ([`WalletSession::close`]) cancels whatever is in flight, and the caller
//! then sees [`DelegationKitError::Cancelled`] instead of a late result.

use std::{
    convert::Infallible,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use strum::EnumString;

use crate::{
    connect::{LaunchReport, WalletConnectLauncher, WalletConnectRequest},
    delegation::{unix_nanos_now, DelegatedIdentity, DelegationChain, DelegationParser},
    error::DelegationKitError,
    identity::SessionIdentityManager,
    lifecycle::{CancelHandle, CancelSignal, CleanupRegistry, CleanupReport, PendingOperation},
    storage::{KeyStore, Namespace, StorageDomain, StorageKey},
};

/// Where the app runs. Only web targets park inbound payloads in the
/// session-scoped storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    /// iOS or Android.
    Native,
    /// Browser.
    Web,
}

#[derive(Debug, Default)]
struct PendingSlot {
    closed: bool,
    current: Option<CancelHandle>,
}

/// Orchestrates identity, launch, return handling and persistence for one
/// namespace.
#[derive(Debug)]
pub struct WalletSession {
    namespace: Namespace,
    platform: Platform,
    identities: Arc<SessionIdentityManager>,
    launcher: WalletConnectLauncher,
    pending: Arc<Mutex<PendingSlot>>,
    delegated: Mutex<Option<DelegatedIdentity>>,
    cleanup: CleanupRegistry,
}

impl WalletSession {
    /// Creates a session for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::InvalidInput`] for an invalid namespace.
    pub fn new(
        namespace: &str,
        platform: Platform,
        identities: Arc<SessionIdentityManager>,
        launcher: WalletConnectLauncher,
    ) -> Result<Self, DelegationKitError> {
        let session = Self {
            namespace: Namespace::parse(namespace)?,
            platform,
            identities,
            launcher,
            pending: Arc::default(),
            delegated: Mutex::default(),
            cleanup: CleanupRegistry::new(),
        };

        let pending = Arc::clone(&session.pending);
        session.cleanup.add(move || {
            let mut slot = pending.lock().unwrap_or_else(PoisonError::into_inner);
            slot.closed = true;
            if let Some(handle) = slot.current.take() {
                handle.cancel();
            }
            Ok::<(), Infallible>(())
        });
        Ok(session)
    }

    /// The namespace this session works in.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The registry torn down by [`Self::close`]. Hosts may add their own
    /// teardowns (listeners, timers) to it.
    #[must_use]
    pub const fn cleanup_registry(&self) -> &CleanupRegistry {
        &self.cleanup
    }

    /// The delegated identity of the last completed or restored round-trip.
    #[must_use]
    pub fn delegated_identity(&self) -> Option<DelegatedIdentity> {
        self.delegated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ensures a session key exists and sends the user to the wallet.
    ///
    /// # Errors
    ///
    /// - [`DelegationKitError::Cancelled`] if cancelled or the session is closed.
    /// - Storage and key generation failures.
    ///
    /// Transport failures are reported in the [`LaunchReport`].
    pub async fn begin_connect(
        &self,
        request: Option<WalletConnectRequest>,
    ) -> Result<LaunchReport, DelegationKitError> {
        let request = request.unwrap_or_else(|| self.launcher.default_request(true));
        let namespace = self.namespace.as_str();
        self.run_pending(|signal| async move {
            let identity = signal
                .guard(self.identities.get_or_create(namespace))
                .await??;
            log::debug!("connecting session key {}", identity.principal());
            signal
                .guard(self.launcher.launch(&request, namespace))
                .await?
        })
        .await
    }

    /// Handles the user's return from the wallet.
    ///
    /// Returns `Ok(None)` while no decodable delegation has arrived yet (the
    /// wallet round-trip may still be in progress).
    ///
    /// # Errors
    ///
    /// - [`DelegationKitError::DelegationStructurallyInvalid`] if the chain is
    ///   malformed or not granted to this session's key.
    /// - [`DelegationKitError::DelegationExpired`] if it arrived expired.
    /// - [`DelegationKitError::Cancelled`] if cancelled or the session is closed.
    /// - Storage failures.
    ///
    /// A cancellation that lands after the chain was persisted still reports
    /// `Cancelled` and leaves [`Self::delegated_identity`] untouched; the
    /// stored chain is picked up by the next [`Self::restore`].
    pub async fn complete_connect(
        &self,
        return_url: &str,
    ) -> Result<Option<DelegatedIdentity>, DelegationKitError> {
        let identity = self.run_pending(|signal| async move {
            let parked_key = StorageKey::new(StorageDomain::PendingDelegation, self.namespace.clone());
            let parked = match self.platform {
                Platform::Web => signal.guard(self.key_store().load(&parked_key)).await??,
                Platform::Native => None,
            };

            let Some(raw) = DelegationParser::extract_delegation(return_url, parked.as_deref())
            else {
                log::debug!("no delegation in return yet");
                return Ok(None);
            };
            let Some(chain) = DelegationParser::parse(&raw) else {
                log::debug!("delegation payload could not be decoded");
                return Ok(None);
            };
            if chain.is_expired(unix_nanos_now()?) {
                return Err(DelegationKitError::DelegationExpired);
            }

            let session = signal
                .guard(self.identities.existing(self.namespace.as_str()))
                .await??
                .ok_or_else(|| {
                    DelegationKitError::structurally_invalid("no session key to delegate to")
                })?;
            let identity = DelegationParser::build_delegation_identity(&session, chain)?;

            signal
                .guard(self.key_store().save(&self.delegation_key(), &identity.chain().to_json()?))
                .await??;
            if parked.is_some() {
                if let Err(e) = self.key_store().remove(&parked_key).await {
                    log::warn!("failed to clear parked delegation: {e}");
                }
            }

            log::info!("delegation accepted for principal {}", identity.principal());
            Ok(Some(identity))
        })
        .await?;

        if let Some(identity) = &identity {
            self.set_delegated(Some(identity.clone()));
        }
        Ok(identity)
    }

    /// Stores an inbound payload in the session-scoped slot, for web return
    /// pages that cannot hand the URL over directly.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn park_pending_delegation(&self, payload: &str) -> Result<(), DelegationKitError> {
        let key = StorageKey::new(StorageDomain::PendingDelegation, self.namespace.clone());
        Ok(self.key_store().save(&key, payload).await?)
    }

    /// Rebuilds the delegated identity persisted by an earlier round-trip.
    ///
    /// Expired, malformed or orphaned chains are discarded and `Ok(None)` is
    /// returned.
    ///
    /// # Errors
    ///
    /// Propagates storage failures and cancellation.
    pub async fn restore(&self) -> Result<Option<DelegatedIdentity>, DelegationKitError> {
        let identity = self.run_pending(|signal| async move {
            let key = self.delegation_key();
            let Some(json) = signal.guard(self.key_store().load(&key)).await?? else {
                return Ok(None);
            };
            let session = signal
                .guard(self.identities.existing(self.namespace.as_str()))
                .await??;

            let restored = serde_json::from_str::<DelegationChain>(&json)
                .map_err(DelegationKitError::from)
                .and_then(|chain| {
                    let session = session.ok_or_else(|| {
                        DelegationKitError::structurally_invalid("session key is gone")
                    })?;
                    DelegatedIdentity::new(session, chain)
                });
            let now = unix_nanos_now()?;
            let identity = match restored {
                Ok(identity) if !identity.is_expired(now) => identity,
                Ok(_) => {
                    log::info!("stored delegation for {} expired; discarding", self.namespace);
                    self.discard_delegation().await;
                    return Ok(None);
                }
                Err(e) => {
                    log::warn!("stored delegation for {} unusable ({e}); discarding", self.namespace);
                    self.discard_delegation().await;
                    return Ok(None);
                }
            };

            Ok(Some(identity))
        })
        .await?;

        if let Some(identity) = &identity {
            self.set_delegated(Some(identity.clone()));
        }
        Ok(identity)
    }

    /// Cancels in-flight work and forgets the session key and delegation.
    /// Never fails; storage errors are logged.
    pub async fn logout(&self) {
        self.cancel_pending();
        self.set_delegated(None);
        self.discard_delegation().await;
        self.identities.clear(self.namespace.as_str()).await;
        log::info!("logged out of namespace {}", self.namespace);
    }

    /// Cancels the in-flight operation, if any, as on navigation away.
    ///
    /// Returns `true` if something was cancelled.
    pub fn cancel_pending(&self) -> bool {
        let current = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .take();
        current.is_some_and(|handle| handle.cancel())
    }

    /// Tears the session down: cancels in-flight work and runs every
    /// registered teardown. Later operations fail with `Cancelled`.
    pub fn close(&self) -> CleanupReport {
        self.cleanup.cleanup()
    }

    fn key_store(&self) -> &KeyStore {
        self.identities.key_store()
    }

    fn delegation_key(&self) -> StorageKey {
        StorageKey::new(StorageDomain::Delegation, self.namespace.clone())
    }

    fn set_delegated(&self, identity: Option<DelegatedIdentity>) {
        *self.delegated.lock().unwrap_or_else(PoisonError::into_inner) = identity;
    }

    async fn discard_delegation(&self) {
        if let Err(e) = self.key_store().remove(&self.delegation_key()).await {
            log::warn!("failed to discard delegation for {}: {e}", self.namespace);
        }
    }

    /// Runs `work` as the session's single in-flight operation, superseding
    /// (cancelling) any previous one.
    async fn run_pending<T, F, Fut>(&self, work: F) -> Result<T, DelegationKitError>
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = Result<T, DelegationKitError>>,
    {
        let op = PendingOperation::new();
        let id = op.id();
        {
            let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.closed {
                return Err(DelegationKitError::Cancelled);
            }
            if let Some(previous) = slot.current.replace(op.cancel_handle()) {
                if previous.cancel() {
                    log::debug!("operation {} superseded by {id}", previous.id());
                }
            }
        }

        let outcome = op.run(work).await;

        let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.current.as_ref().is_some_and(|handle| handle.id() == id) {
            slot.current = None;
        }
        drop(slot);
        outcome.into_result()
    }
}
