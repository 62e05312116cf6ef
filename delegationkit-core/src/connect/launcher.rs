use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use url::form_urlencoded;

use super::{CandidateFailure, LaunchConfig, LaunchReport, UrlOpener, WalletConnectRequest};
use crate::{error::DelegationKitError, identity::SessionIdentityManager};

/// Synonyms of `returnUrl` understood by various wallets.
const RETURN_URL_ALIASES: [&str; 6] = [
    "callback",
    "callbackUrl",
    "redirect",
    "redirectUrl",
    "redirect_uri",
    "successUrl",
];

/// Builds outbound connect requests and walks the transport targets in
/// priority order. Holds no state across calls.
pub struct WalletConnectLauncher {
    config: LaunchConfig,
    opener: Arc<dyn UrlOpener>,
    identities: Arc<SessionIdentityManager>,
}

impl std::fmt::Debug for WalletConnectLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConnectLauncher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WalletConnectLauncher {
    /// Creates a launcher.
    #[must_use]
    pub fn new(
        config: LaunchConfig,
        opener: Arc<dyn UrlOpener>,
        identities: Arc<SessionIdentityManager>,
    ) -> Self {
        Self {
            config,
            opener,
            identities,
        }
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// A request pre-filled from the configuration, returning to the web
    /// return URL (or the deep link when no web host is configured).
    #[must_use]
    pub fn default_request(&self, include_public_key: bool) -> WalletConnectRequest {
        WalletConnectRequest {
            return_url: self.config.web_return_url(),
            app_name: Some(self.config.app_name.clone()),
            app_icon_url: self.config.app_icon_url.clone(),
            app_specific_payload: None,
            include_public_key,
        }
    }

    /// Encodes `request` as a query string. The session public key of
    /// `namespace` is fetched (or created) only when the request asks for it.
    ///
    /// When the wallet returns somewhere other than the app's deep link (the
    /// web return page), the deep link travels along as `appReturnUrl` so that
    /// page can hand the user back to the app.
    ///
    /// # Errors
    ///
    /// Propagates storage and key generation failures of the identity lookup.
    pub async fn query_string(
        &self,
        request: &WalletConnectRequest,
        namespace: &str,
    ) -> Result<String, DelegationKitError> {
        let public_key = if request.include_public_key {
            let identity = self.identities.get_or_create(namespace).await?;
            Some(STANDARD.encode(identity.public_key_der()))
        } else {
            None
        };

        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("returnUrl", &request.return_url);
        for alias in RETURN_URL_ALIASES {
            query.append_pair(alias, &request.return_url);
        }
        let deep_link = self.config.deep_link_return_url();
        if request.return_url != deep_link {
            query.append_pair("appReturnUrl", deep_link);
        }
        if let Some(app_name) = &request.app_name {
            query.append_pair("appName", app_name);
        }
        if let Some(app_icon_url) = &request.app_icon_url {
            query.append_pair("appIcon", app_icon_url);
        }
        if let Some(payload) = &request.app_specific_payload {
            query.append_pair("request", payload);
        }
        if let Some(app_id) = &self.config.app_id {
            query.append_pair("appId", app_id);
        }
        if let Some(public_key) = &public_key {
            query.append_pair("publicKey", public_key);
        }
        Ok(query.finish())
    }

    /// Wallet targets in the order they are tried.
    #[must_use]
    pub fn candidates(&self, query: &str) -> Vec<String> {
        [
            Some(self.config.primary_scheme_url.as_str()),
            Some(self.config.alternate_scheme_url.as_str()),
            self.config.universal_link_base.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(|base| with_query(base, query))
        .collect()
    }

    /// Sends `request` to the wallet.
    ///
    /// Targets are tried one after another; the first whose open call does not
    /// fail ends the walk. If all of them fail, the public website is opened
    /// once as a last resort. Transport failures are reported in the returned
    /// [`LaunchReport`], never raised.
    ///
    /// # Errors
    ///
    /// Only failures building the request are raised: storage and key
    /// generation errors from fetching the session public key.
    pub async fn launch(
        &self,
        request: &WalletConnectRequest,
        namespace: &str,
    ) -> Result<LaunchReport, DelegationKitError> {
        let query = self.query_string(request, namespace).await?;
        let mut failures = Vec::new();

        for url in self.candidates(&query) {
            match self.opener.open_url(&url).await {
                Ok(()) => {
                    log::info!("opened wallet target {}", redact(&url));
                    return Ok(LaunchReport::Opened { url, failures });
                }
                Err(e) => {
                    log::warn!("failed to open wallet target {}: {e}", redact(&url));
                    failures.push(CandidateFailure {
                        url,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let website = self.config.website_fallback.clone();
        match self.opener.open_url(&website).await {
            Ok(()) => {
                log::info!("no wallet target opened; fell back to {website}");
                Ok(LaunchReport::WebsiteFallback {
                    url: website,
                    failures,
                })
            }
            Err(e) => {
                log::warn!("website fallback {website} failed: {e}");
                failures.push(CandidateFailure {
                    url: website,
                    reason: e.to_string(),
                });
                Ok(LaunchReport::Exhausted { failures })
            }
        }
    }
}

fn with_query(base: &str, query: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}

/// Strips the query from a target before logging it.
fn redact(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
