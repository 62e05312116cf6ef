//! The wallet connect round-trip: sending the session key out to a wallet and
//! launching it through whichever transport target is available.

use async_trait::async_trait;

use crate::error::DelegationKitError;

mod config;
mod launcher;

pub use config::LaunchConfig;
pub use launcher::WalletConnectLauncher;

/// Opens URLs through the host platform (deep links, universal links, browser).
///
/// Platforms generally cannot report "no handler installed" synchronously, so
/// `Ok` only means the open call itself did not fail.
#[async_trait]
pub trait UrlOpener: Send + Sync {
    /// Opens `url`.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::TransportUnavailable`] if the platform
    /// rejected the open call.
    async fn open_url(&self, url: &str) -> Result<(), DelegationKitError>;
}

/// One outbound connect attempt. Constructed per attempt, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConnectRequest {
    /// Where the wallet should send the user back to.
    pub return_url: String,
    /// Display name shown by the wallet.
    pub app_name: Option<String>,
    /// Icon shown by the wallet.
    pub app_icon_url: Option<String>,
    /// Opaque payload forwarded to the wallet as the `request` parameter.
    pub app_specific_payload: Option<String>,
    /// Whether to send the session public key along.
    pub include_public_key: bool,
}

impl WalletConnectRequest {
    /// A request returning to `return_url` with no optional fields set.
    #[must_use]
    pub fn new(return_url: impl Into<String>) -> Self {
        Self {
            return_url: return_url.into(),
            app_name: None,
            app_icon_url: None,
            app_specific_payload: None,
            include_public_key: false,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Sets the icon URL.
    #[must_use]
    pub fn with_app_icon_url(mut self, app_icon_url: impl Into<String>) -> Self {
        self.app_icon_url = Some(app_icon_url.into());
        self
    }

    /// Sets the `request` payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.app_specific_payload = Some(payload.into());
        self
    }

    /// Requests that the session public key be sent along.
    #[must_use]
    pub const fn with_public_key(mut self) -> Self {
        self.include_public_key = true;
        self
    }
}

/// A transport target whose open call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    /// The URL that was attempted.
    pub url: String,
    /// Why opening it failed.
    pub reason: String,
}

/// What [`WalletConnectLauncher::launch`] tried. Reported, never raised.
///
/// `Opened` only means the platform accepted the open call; it does not mean
/// the wallet is installed or that the user will approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchReport {
    /// A wallet target was opened.
    Opened {
        /// The target that was opened.
        url: String,
        /// Higher-priority targets that failed first.
        failures: Vec<CandidateFailure>,
    },
    /// Every wallet target failed; the public website was opened instead.
    WebsiteFallback {
        /// The website that was opened.
        url: String,
        /// The wallet targets that failed.
        failures: Vec<CandidateFailure>,
    },
    /// Nothing could be opened, not even the website.
    Exhausted {
        /// Every failed target, website last.
        failures: Vec<CandidateFailure>,
    },
}

impl LaunchReport {
    /// Every failed attempt, in order.
    #[must_use]
    pub fn failures(&self) -> &[CandidateFailure] {
        match self {
            Self::Opened { failures, .. }
            | Self::WebsiteFallback { failures, .. }
            | Self::Exhausted { failures } => failures,
        }
    }

    /// The URL that was opened, if any.
    #[must_use]
    pub fn opened_url(&self) -> Option<&str> {
        match self {
            Self::Opened { url, .. } | Self::WebsiteFallback { url, .. } => Some(url),
            Self::Exhausted { .. } => None,
        }
    }

    /// The error to show when nothing could be opened, for hosts that want a
    /// retry affordance.
    #[must_use]
    pub fn transport_error(&self) -> Option<DelegationKitError> {
        match self {
            Self::Exhausted { failures } => Some(DelegationKitError::TransportUnavailable(
                failures
                    .iter()
                    .map(|failure| format!("{}: {}", failure.url, failure.reason))
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
            _ => None,
        }
    }
}
