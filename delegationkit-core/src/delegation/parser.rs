//! Decoding of inbound delegation payloads.

use std::borrow::Cow;

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};

use super::{DelegatedIdentity, DelegationChain};
use crate::{error::DelegationKitError, identity::SessionIdentity};

/// Name of the return-URL parameter carrying the delegation payload.
pub const DELEGATION_PARAM: &str = "delegation";

/// Stateless decoder for delegation payloads returned by a wallet.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelegationParser;

impl DelegationParser {
    /// Decodes a delegation chain from `input`.
    ///
    /// Tries, in order: JSON as-is, percent-decoded JSON, then base64-wrapped
    /// JSON (standard or URL-safe alphabet, padded or not, optionally itself
    /// percent-encoded). Returns the first successful decode, `None` when every
    /// strategy fails. Never panics.
    ///
    /// The result is not validated; see [`Self::build_delegation_identity`].
    #[must_use]
    pub fn parse(input: &str) -> Option<DelegationChain> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if let Some(chain) = Self::decode_json(input.as_bytes()) {
            return Some(chain);
        }

        let percent_decoded = urlencoding::decode(input).ok();
        if let Some(decoded) = percent_decoded.as_deref() {
            if decoded != input {
                if let Some(chain) = Self::decode_json(decoded.as_bytes()) {
                    log::debug!("delegation payload was percent-encoded");
                    return Some(chain);
                }
            }
        }

        let mut candidates = vec![Cow::Borrowed(input)];
        if let Some(decoded) = percent_decoded.filter(|decoded| decoded != input) {
            candidates.push(decoded);
        }
        let chain = candidates
            .iter()
            .find_map(|candidate| Self::decode_base64(candidate.trim()));
        if chain.is_some() {
            log::debug!("delegation payload was base64-wrapped");
        }
        chain
    }

    /// Combines a session key with a parsed chain into an identity that signs
    /// on behalf of the delegator.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::DelegationStructurallyInvalid`] if the
    /// chain is empty, carries empty keys or signatures, or does not grant
    /// authority to `session`.
    pub fn build_delegation_identity(
        session: &SessionIdentity,
        chain: DelegationChain,
    ) -> Result<DelegatedIdentity, DelegationKitError> {
        DelegatedIdentity::new(session.clone(), chain)
    }

    /// Finds the raw delegation payload of an inbound return.
    ///
    /// Checks, in order, the `delegation` parameter of the URL's hash
    /// fragment, the one of its query string, then `session_slot` (the
    /// session-scoped slot web targets park payloads in; pass `None` on other
    /// platforms). The first non-empty match wins. Values are returned
    /// undecoded, `+` included, for [`Self::parse`] to unwrap.
    #[must_use]
    pub fn extract_delegation(return_url: &str, session_slot: Option<&str>) -> Option<String> {
        let (before_fragment, fragment) = match return_url.split_once('#') {
            Some((head, fragment)) => (head, Some(fragment)),
            None => (return_url, None),
        };

        let from_fragment = fragment.and_then(|fragment| {
            let params = fragment.split_once('?').map_or(fragment, |(_, query)| query);
            find_param(params, DELEGATION_PARAM)
        });
        let from_query = || {
            before_fragment
                .split_once('?')
                .and_then(|(_, query)| find_param(query, DELEGATION_PARAM))
        };
        let from_slot = || {
            session_slot
                .map(str::trim)
                .filter(|slot| !slot.is_empty())
                .map(str::to_string)
        };

        from_fragment.or_else(from_query).or_else(from_slot)
    }

    fn decode_json(bytes: &[u8]) -> Option<DelegationChain> {
        serde_json::from_slice(bytes).ok()
    }

    fn decode_base64(input: &str) -> Option<DelegationChain> {
        [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD]
            .into_iter()
            .filter_map(|engine| engine.decode(input).ok())
            .find_map(|bytes| Self::decode_json(&bytes))
    }
}

fn find_param(params: &str, name: &str) -> Option<String> {
    params
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
