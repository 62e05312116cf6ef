//! Delegation chains granted to session keys, and the identity built from them.
//!
//! A chain travels as JSON:
//!
//! ```json
//! {
//!   "delegations": [
//!     { "delegation": { "pubkey": "302a...", "expiration": "17f1c5c4a3b2e000", "targets": ["..."] },
//!       "signature": "ab12..." }
//!   ],
//!   "publicKey": "302a..."
//! }
//! ```
//!
//! Entries are ordered innermost first: `delegations[0]` grants authority to
//! the session key. `publicKey` is the delegator's root key.

use serde::{Deserialize, Serialize};

use crate::{error::DelegationKitError, identity::Principal};

mod delegated;
mod encoding;
mod parser;

pub use delegated::{DelegatedIdentity, SignedRequest, REQUEST_DOMAIN};
pub use parser::{DelegationParser, DELEGATION_PARAM};

/// One grant of authority to `pubkey`, valid until `expiration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// DER-encoded public key receiving authority.
    #[serde(with = "hex")]
    pub pubkey: Vec<u8>,
    /// Expiration as nanoseconds since the Unix epoch.
    #[serde(with = "encoding::hex_u64")]
    pub expiration: u64,
    /// Optional canister/target scope the grant is restricted to.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "encoding::hex_list"
    )]
    pub targets: Option<Vec<Vec<u8>>>,
}

/// A [`Delegation`] plus the delegator's signature over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDelegation {
    /// The grant.
    pub delegation: Delegation,
    /// Signature by the next-outer key.
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

/// An ordered, immutable delegation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationChain {
    delegations: Vec<SignedDelegation>,
    #[serde(rename = "publicKey", with = "hex")]
    public_key: Vec<u8>,
}

impl DelegationChain {
    /// Builds a chain from its entries (innermost first) and the delegator key.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::DelegationStructurallyInvalid`] if the
    /// result violates [`Self::validate`].
    pub fn new(
        delegations: Vec<SignedDelegation>,
        public_key: Vec<u8>,
    ) -> Result<Self, DelegationKitError> {
        let chain = Self {
            delegations,
            public_key,
        };
        chain.validate()?;
        Ok(chain)
    }

    /// Entries, innermost first.
    #[must_use]
    pub fn delegations(&self) -> &[SignedDelegation] {
        &self.delegations
    }

    /// The delegator's DER-encoded root public key.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The principal the chain acts on behalf of.
    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal::self_authenticating(&self.public_key)
    }

    /// Checks the structural invariants: at least one entry, and no empty key
    /// or signature anywhere in the chain.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::DelegationStructurallyInvalid`] naming the
    /// first violated invariant.
    pub fn validate(&self) -> Result<(), DelegationKitError> {
        if self.delegations.is_empty() {
            return Err(DelegationKitError::structurally_invalid(
                "chain has no delegations",
            ));
        }
        if self.public_key.is_empty() {
            return Err(DelegationKitError::structurally_invalid(
                "delegator public key is empty",
            ));
        }
        for (index, entry) in self.delegations.iter().enumerate() {
            if entry.delegation.pubkey.is_empty() {
                return Err(DelegationKitError::structurally_invalid(format!(
                    "delegation {index} has an empty public key"
                )));
            }
            if entry.signature.is_empty() {
                return Err(DelegationKitError::structurally_invalid(format!(
                    "delegation {index} is unsigned"
                )));
            }
        }
        Ok(())
    }

    /// The earliest expiration in the chain, in nanoseconds since the epoch.
    #[must_use]
    pub fn expires_at(&self) -> Option<u64> {
        self.delegations
            .iter()
            .map(|entry| entry.delegation.expiration)
            .min()
    }

    /// Whether any entry has expired at `now_nanos`.
    #[must_use]
    pub fn is_expired(&self, now_nanos: u64) -> bool {
        self.expires_at().map_or(true, |expires| expires <= now_nanos)
    }

    /// Serializes the chain to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::SerializationError`] if encoding fails.
    pub fn to_json(&self) -> Result<String, DelegationKitError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Current time in nanoseconds since the Unix epoch.
///
/// # Errors
///
/// Returns [`DelegationKitError::SerializationError`] if the clock is before the epoch.
pub fn unix_nanos_now() -> Result<u64, DelegationKitError> {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| {
            DelegationKitError::SerializationError(format!(
                "critical. unable to determine SystemTime: {e}"
            ))
        })?;
    Ok(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
}
