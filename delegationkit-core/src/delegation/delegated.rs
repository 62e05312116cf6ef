use serde::{Deserialize, Serialize};

use super::{DelegationChain, SignedDelegation};
use crate::{
    error::DelegationKitError,
    identity::{Principal, SessionIdentity},
};

/// Domain separator prepended to every message signed for the remote service.
pub const REQUEST_DOMAIN: &[u8] = b"\x0Aic-request";

/// A message signature plus everything a verifier needs to attribute it to the
/// delegator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    /// DER-encoded session public key that produced `signature`.
    #[serde(with = "hex")]
    pub sender_public_key: Vec<u8>,
    /// The delegation chain, innermost first.
    pub delegations: Vec<SignedDelegation>,
    /// Session-key signature over `REQUEST_DOMAIN || message`.
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

/// A session key acting on behalf of the delegator of a [`DelegationChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedIdentity {
    session: SessionIdentity,
    chain: DelegationChain,
}

impl DelegatedIdentity {
    /// Binds `session` to `chain`.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::DelegationStructurallyInvalid`] if the
    /// chain fails validation or its innermost entry does not delegate to the
    /// session public key.
    pub fn new(session: SessionIdentity, chain: DelegationChain) -> Result<Self, DelegationKitError> {
        chain.validate()?;
        let session_der = session.public_key_der();
        let grants_session = chain
            .delegations()
            .first()
            .is_some_and(|innermost| innermost.delegation.pubkey == session_der);
        if !grants_session {
            return Err(DelegationKitError::structurally_invalid(
                "innermost delegation does not grant the session key",
            ));
        }
        Ok(Self { session, chain })
    }

    /// The principal requests are attributed to.
    #[must_use]
    pub fn principal(&self) -> Principal {
        self.chain.principal()
    }

    /// The underlying session identity.
    #[must_use]
    pub const fn session(&self) -> &SessionIdentity {
        &self.session
    }

    /// The delegation chain.
    #[must_use]
    pub const fn chain(&self) -> &DelegationChain {
        &self.chain
    }

    /// Whether the chain has expired at `now_nanos`.
    #[must_use]
    pub fn is_expired(&self, now_nanos: u64) -> bool {
        self.chain.is_expired(now_nanos)
    }

    /// Signs `message` for the remote service.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> SignedRequest {
        let mut payload = Vec::with_capacity(REQUEST_DOMAIN.len() + message.len());
        payload.extend_from_slice(REQUEST_DOMAIN);
        payload.extend_from_slice(message);

        SignedRequest {
            sender_public_key: self.session.public_key_der(),
            delegations: self.chain.delegations().to_vec(),
            signature: self.session.sign(&payload),
        }
    }
}
