use serde::{Deserialize, Serialize};

use crate::{defaults::DEFAULT_WEBSITE_FALLBACK, error::DelegationKitError};

/// Where the wallet connect round-trip sends the user, and where it brings
/// them back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Display name sent to the wallet.
    pub app_name: String,
    /// Icon sent to the wallet.
    #[serde(default)]
    pub app_icon_url: Option<String>,
    /// Identifier of this app registered with the wallet.
    #[serde(default)]
    pub app_id: Option<String>,
    /// Deep link back into the app, e.g. `app:///wallet-connect`.
    pub deep_link_return_url: String,
    /// Host serving the canonical web return endpoint. Without it both
    /// return URLs are the deep link.
    #[serde(default)]
    pub web_host: Option<String>,
    /// First custom-scheme target of the wallet.
    pub primary_scheme_url: String,
    /// Second custom-scheme target of the wallet.
    pub alternate_scheme_url: String,
    /// Operator-configured universal link, tried after both schemes.
    #[serde(default)]
    pub universal_link_base: Option<String>,
    /// Public website opened when no wallet target could be opened.
    #[serde(default = "default_website_fallback")]
    pub website_fallback: String,
}

fn default_website_fallback() -> String {
    DEFAULT_WEBSITE_FALLBACK.to_string()
}

/// Path of the web return endpoint on [`LaunchConfig::web_host`].
const WEB_RETURN_PATH: &str = "/wallet-connect";

impl LaunchConfig {
    /// Parses a JSON configuration (camelCase keys).
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::SerializationError`] for malformed JSON and
    /// [`DelegationKitError::InvalidInput`] for unusable values.
    pub fn from_json(json: &str) -> Result<Self, DelegationKitError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every target is usable.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::InvalidInput`] naming the offending field.
    pub fn validate(&self) -> Result<(), DelegationKitError> {
        for (attribute, value) in [
            ("deep_link_return_url", Some(&self.deep_link_return_url)),
            ("primary_scheme_url", Some(&self.primary_scheme_url)),
            ("alternate_scheme_url", Some(&self.alternate_scheme_url)),
            ("universal_link_base", self.universal_link_base.as_ref()),
            ("website_fallback", Some(&self.website_fallback)),
        ] {
            if let Some(value) = value {
                url::Url::parse(value).map_err(|e| {
                    DelegationKitError::invalid_input(attribute, format!("{value}: {e}"))
                })?;
            }
        }
        if let Some(host) = &self.web_host {
            if host.is_empty() || host.contains(['/', '?', '#']) {
                return Err(DelegationKitError::invalid_input(
                    "web_host",
                    format!("{host} is not a bare host"),
                ));
            }
        }
        Ok(())
    }

    /// The canonical web return URL, or the deep link when no web host is set.
    #[must_use]
    pub fn web_return_url(&self) -> String {
        self.web_host.as_ref().map_or_else(
            || self.deep_link_return_url.clone(),
            |host| format!("https://{host}{WEB_RETURN_PATH}"),
        )
    }

    /// The deep-link return URL.
    #[must_use]
    pub fn deep_link_return_url(&self) -> &str {
        &self.deep_link_return_url
    }
}
