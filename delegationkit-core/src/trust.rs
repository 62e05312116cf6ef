//! Verification of responses from the remote service.
//!
//! The policy is chosen once, when a [`ServiceClient`](crate::service::ServiceClient)
//! is built. A failed verification is always an error; nothing falls back to
//! skipping verification at runtime.
//!
//! The `Bypassed` policy exists only for running against a local test backend
//! whose certificates cannot be verified. It is compiled in only for unit tests
//! and for debug builds with the `insecure-trust-bypass` feature.

use std::{fmt, sync::Arc};

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

use crate::{error::DelegationKitError, identity::ed25519_raw};

/// Domain separator for the signature over a response body digest.
pub const CERTIFICATE_DOMAIN: &[u8] = b"\x0Dic-state-root";
/// Domain separator for a root key signing an intermediate key.
pub const CERTIFICATE_DELEGATION_DOMAIN: &[u8] = b"\x0Dic-delegation";

/// Which policy to build, as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TrustMode {
    /// Full certificate verification.
    Verified,
    /// No verification. Only available in test builds.
    Bypassed,
}

/// An intermediate key certified by the root key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDelegation {
    /// DER-encoded Ed25519 key that signed the response.
    #[serde(with = "hex")]
    pub public_key: Vec<u8>,
    /// Root signature over `CERTIFICATE_DELEGATION_DOMAIN || public_key`.
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

/// Proof that a response body was produced by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Signature over `CERTIFICATE_DOMAIN || SHA-256(body)`.
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
    /// Present when the body was signed by an intermediate key.
    #[serde(default)]
    pub delegation: Option<CertificateDelegation>,
}

/// A response body together with its certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertifiedResponse {
    /// The raw response payload.
    #[serde(with = "hex")]
    pub body: Vec<u8>,
    /// Certificate covering `body`.
    pub certificate: Certificate,
}

/// Cryptographic verification of a [`CertifiedResponse`].
pub trait CertificateVerifier: Send + Sync {
    /// Verifies `response`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first check that failed.
    fn verify(&self, response: &CertifiedResponse) -> Result<(), String>;
}

/// Verifies certificates against a known Ed25519 root key.
#[derive(Debug, Clone)]
pub struct RootKeyVerifier {
    root_key: VerifyingKey,
}

impl RootKeyVerifier {
    /// Creates a verifier trusting the DER-encoded Ed25519 `root_key_der`.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::InvalidInput`] if the key cannot be decoded.
    pub fn from_der(root_key_der: &[u8]) -> Result<Self, DelegationKitError> {
        let root_key = parse_key(root_key_der)
            .map_err(|reason| DelegationKitError::invalid_input("root_key", reason))?;
        Ok(Self { root_key })
    }

    fn signer(&self, certificate: &Certificate) -> Result<VerifyingKey, String> {
        let Some(delegation) = &certificate.delegation else {
            return Ok(self.root_key);
        };
        let mut message = CERTIFICATE_DELEGATION_DOMAIN.to_vec();
        message.extend_from_slice(&delegation.public_key);
        verify_signature(&self.root_key, &message, &delegation.signature)
            .map_err(|e| format!("certificate delegation: {e}"))?;
        parse_key(&delegation.public_key)
    }
}

impl CertificateVerifier for RootKeyVerifier {
    fn verify(&self, response: &CertifiedResponse) -> Result<(), String> {
        let signer = self.signer(&response.certificate)?;
        let mut message = CERTIFICATE_DOMAIN.to_vec();
        message.extend_from_slice(&Sha256::digest(&response.body));
        verify_signature(&signer, &message, &response.certificate.signature)
            .map_err(|e| format!("response body: {e}"))
    }
}

fn parse_key(der: &[u8]) -> Result<VerifyingKey, String> {
    let raw = ed25519_raw(der).ok_or_else(|| "not a DER-encoded Ed25519 key".to_string())?;
    VerifyingKey::from_bytes(&raw).map_err(|e| e.to_string())
}

fn verify_signature(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> Result<(), String> {
    let signature = Signature::from_slice(signature).map_err(|e| e.to_string())?;
    key.verify(message, &signature).map_err(|e| e.to_string())
}

/// How responses from the remote service are authenticated.
#[derive(Clone)]
pub enum TrustPolicy {
    /// Every response must pass the verifier.
    Verified(Arc<dyn CertificateVerifier>),
    /// Every response is accepted unchecked.
    #[cfg(any(test, all(feature = "insecure-trust-bypass", debug_assertions)))]
    Bypassed,
}

impl fmt::Debug for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrustPolicy::{}", self.mode())
    }
}

impl TrustPolicy {
    /// A policy verifying every response with `verifier`.
    #[must_use]
    pub fn verified(verifier: impl CertificateVerifier + 'static) -> Self {
        Self::Verified(Arc::new(verifier))
    }

    /// Builds the policy named by `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::InvalidInput`] when `Bypassed` is requested
    /// from a build that does not carry it.
    pub fn from_mode(
        mode: TrustMode,
        verifier: Arc<dyn CertificateVerifier>,
    ) -> Result<Self, DelegationKitError> {
        match mode {
            TrustMode::Verified => Ok(Self::Verified(verifier)),
            #[cfg(any(test, all(feature = "insecure-trust-bypass", debug_assertions)))]
            TrustMode::Bypassed => {
                log::warn!("response verification is bypassed; never ship this build");
                Ok(Self::Bypassed)
            }
            #[cfg(not(any(test, all(feature = "insecure-trust-bypass", debug_assertions))))]
            TrustMode::Bypassed => Err(DelegationKitError::invalid_input(
                "trust_mode",
                "bypassed verification is not available in this build",
            )),
        }
    }

    /// The mode of this policy.
    #[must_use]
    pub const fn mode(&self) -> TrustMode {
        match self {
            Self::Verified(_) => TrustMode::Verified,
            #[cfg(any(test, all(feature = "insecure-trust-bypass", debug_assertions)))]
            Self::Bypassed => TrustMode::Bypassed,
        }
    }

    /// Checks `response` against the policy.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::UntrustedResponse`] if verification fails.
    pub fn check(&self, response: &CertifiedResponse) -> Result<(), DelegationKitError> {
        match self {
            Self::Verified(verifier) => verifier.verify(response).map_err(|reason| {
                log::warn!("rejecting unverifiable response: {reason}");
                DelegationKitError::UntrustedResponse(reason)
            }),
            #[cfg(any(test, all(feature = "insecure-trust-bypass", debug_assertions)))]
            Self::Bypassed => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;
    use crate::identity::ed25519_der;

    pub(crate) fn root() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    pub(crate) fn certify(signer: &SigningKey, body: &[u8]) -> Certificate {
        let mut message = CERTIFICATE_DOMAIN.to_vec();
        message.extend_from_slice(&Sha256::digest(body));
        Certificate {
            signature: signer.sign(&message).to_bytes().to_vec(),
            delegation: None,
        }
    }

    pub(crate) fn verifier() -> RootKeyVerifier {
        RootKeyVerifier::from_der(&ed25519_der(&root().verifying_key().to_bytes())).unwrap()
    }

    #[test]
    fn test_root_signed_response_verifies() {
        let response = CertifiedResponse {
            body: b"{\"round\":1}".to_vec(),
            certificate: certify(&root(), b"{\"round\":1}"),
        };
        assert!(TrustPolicy::verified(verifier()).check(&response).is_ok());
    }

    #[test]
    fn test_tampered_body_is_untrusted() {
        let response = CertifiedResponse {
            body: b"{\"round\":2}".to_vec(),
            certificate: certify(&root(), b"{\"round\":1}"),
        };
        assert!(matches!(
            TrustPolicy::verified(verifier()).check(&response),
            Err(DelegationKitError::UntrustedResponse(_))
        ));
    }

    #[test]
    fn test_intermediate_key_needs_root_signature() {
        let intermediate = SigningKey::from_bytes(&[9u8; 32]);
        let intermediate_der = ed25519_der(&intermediate.verifying_key().to_bytes());
        let mut delegation_message = CERTIFICATE_DELEGATION_DOMAIN.to_vec();
        delegation_message.extend_from_slice(&intermediate_der);

        let mut certificate = certify(&intermediate, b"ok");
        certificate.delegation = Some(CertificateDelegation {
            public_key: intermediate_der,
            signature: root().sign(&delegation_message).to_bytes().to_vec(),
        });
        let response = CertifiedResponse {
            body: b"ok".to_vec(),
            certificate,
        };
        assert!(verifier().verify(&response).is_ok());

        let mut forged = response;
        if let Some(delegation) = forged.certificate.delegation.as_mut() {
            delegation.signature = intermediate.sign(&delegation_message).to_bytes().to_vec();
        }
        assert!(verifier().verify(&forged).unwrap_err().contains("certificate delegation"));
    }

    #[test]
    fn test_mode_is_explicit() {
        let verifier: Arc<dyn CertificateVerifier> = Arc::new(verifier());
        let verified = TrustPolicy::from_mode("VERIFIED".parse().unwrap(), verifier.clone()).unwrap();
        assert_eq!(verified.mode(), TrustMode::Verified);

        let bypassed = TrustPolicy::from_mode(TrustMode::Bypassed, verifier).unwrap();
        let garbage = CertifiedResponse {
            body: vec![],
            certificate: Certificate {
                signature: vec![],
                delegation: None,
            },
        };
        assert!(bypassed.check(&garbage).is_ok());
        assert!(TrustPolicy::verified(self::verifier()).check(&garbage).is_err());
    }

    #[test]
    fn test_bad_root_key_is_invalid_input() {
        assert!(matches!(
            RootKeyVerifier::from_der(&[0x01, 0x02]),
            Err(DelegationKitError::InvalidInput { .. })
        ));
    }
}
