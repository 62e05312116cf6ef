//! Configuration defaults per [`Environment`].

use crate::{connect::LaunchConfig, error::DelegationKitError, Environment};

/// Public identity-provider site opened when no wallet target can be opened.
pub const DEFAULT_WEBSITE_FALLBACK: &str = "https://identity.ic0.app";

/// Builds a configuration with the defaults of an [`Environment`].
pub trait DefaultConfig {
    /// Defaults for `environment`, identifying this app to the wallet as `app_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::InvalidInput`] if the resulting
    /// configuration does not validate.
    fn from_environment(
        environment: &Environment,
        app_id: Option<String>,
    ) -> Result<Self, DelegationKitError>
    where
        Self: Sized;
}

impl DefaultConfig for LaunchConfig {
    fn from_environment(
        environment: &Environment,
        app_id: Option<String>,
    ) -> Result<Self, DelegationKitError> {
        let config = match environment {
            Environment::Staging => Self {
                app_name: "Guessing Game (staging)".to_string(),
                app_icon_url: Some("https://staging.guess.example/icon.png".to_string()),
                app_id,
                deep_link_return_url: "guessgame-staging:///wallet-connect".to_string(),
                web_host: Some("staging.guess.example".to_string()),
                primary_scheme_url: "wallet://connect".to_string(),
                alternate_scheme_url: "walletapp://connect".to_string(),
                universal_link_base: Some("https://staging.wallet.example/connect".to_string()),
                website_fallback: DEFAULT_WEBSITE_FALLBACK.to_string(),
            },

            Environment::Production => Self {
                app_name: "Guessing Game".to_string(),
                app_icon_url: Some("https://guess.example/icon.png".to_string()),
                app_id,
                deep_link_return_url: "guessgame:///wallet-connect".to_string(),
                web_host: Some("guess.example".to_string()),
                primary_scheme_url: "wallet://connect".to_string(),
                alternate_scheme_url: "walletapp://connect".to_string(),
                universal_link_base: None,
                website_fallback: DEFAULT_WEBSITE_FALLBACK.to_string(),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_environment_defaults_validate() {
        for name in ["staging", "PRODUCTION"] {
            let environment = Environment::from_str(name).unwrap();
            let config = LaunchConfig::from_environment(&environment, None).unwrap();
            assert_eq!(config.website_fallback, DEFAULT_WEBSITE_FALLBACK);
        }
    }

    #[test]
    fn test_app_id_is_carried() {
        let config =
            LaunchConfig::from_environment(&Environment::Production, Some("game-1".to_string()))
                .unwrap();
        assert_eq!(config.app_id.as_deref(), Some("game-1"));
        assert_eq!(config.web_return_url(), "https://guess.example/wallet-connect");
    }
}
