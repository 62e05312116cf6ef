//! Session identities: locally generated Ed25519 key pairs with no authority of
//! their own until a delegation is granted to them.

use std::fmt;

use ed25519_dalek::{Signer, SigningKey};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha224};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{error::DelegationKitError, storage::Namespace};

mod manager;
pub use manager::SessionIdentityManager;

/// DER header of an Ed25519 `SubjectPublicKeyInfo`; followed by the 32 raw key bytes.
pub const ED25519_DER_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Suffix marking a principal as derived from a public key.
const SELF_AUTHENTICATING_TAG: u8 = 0x02;

/// DER-encodes a raw Ed25519 public key.
#[must_use]
pub fn ed25519_der(raw_public_key: &[u8; 32]) -> Vec<u8> {
    let mut der = Vec::with_capacity(ED25519_DER_PREFIX.len() + raw_public_key.len());
    der.extend_from_slice(&ED25519_DER_PREFIX);
    der.extend_from_slice(raw_public_key);
    der
}

/// Extracts the raw Ed25519 key from its DER encoding.
#[must_use]
pub fn ed25519_raw(der: &[u8]) -> Option<[u8; 32]> {
    let raw = der.strip_prefix(&ED25519_DER_PREFIX)?;
    raw.try_into().ok()
}

/// The stable identifier of an authenticated actor.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Principal(Vec<u8>);

impl Principal {
    /// Self-authenticating principal for a DER-encoded public key:
    /// `SHA-224(der) || 0x02`.
    #[must_use]
    pub fn self_authenticating(der_public_key: &[u8]) -> Self {
        let mut bytes = Sha224::digest(der_public_key).to_vec();
        bytes.push(SELF_AUTHENTICATING_TAG);
        Self(bytes)
    }

    /// The raw principal bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({self})")
    }
}

/// A session signing key pair plus the namespace keying its storage slot.
#[derive(Clone)]
pub struct SessionIdentity {
    namespace: Namespace,
    signing_key: SigningKey,
}

impl SessionIdentity {
    /// Generates a fresh key pair from the operating system's RNG.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::KeyGenerationFailed`] if no randomness is available.
    pub fn generate(namespace: Namespace) -> Result<Self, DelegationKitError> {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng
            .try_fill_bytes(&mut *seed)
            .map_err(|e| DelegationKitError::KeyGenerationFailed(e.to_string()))?;
        Ok(Self::from_seed(namespace, &seed))
    }

    pub(crate) fn from_seed(namespace: Namespace, seed: &[u8; 32]) -> Self {
        Self {
            namespace,
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The namespace this identity is stored under.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The raw 32-byte Ed25519 public key.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The DER-encoded public key, as sent to wallets and embedded in delegations.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        ed25519_der(&self.public_key())
    }

    /// The principal of the undelegated session key.
    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal::self_authenticating(&self.public_key_der())
    }

    /// Signs `message` with the session key.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Serializes the key pair as `["<hex der public key>", "<hex secret seed>"]`.
    ///
    /// Treat the result as sensitive material.
    #[must_use]
    pub fn to_record(&self) -> Zeroizing<String> {
        let seed = Zeroizing::new(hex::encode(self.signing_key.to_bytes()));
        Zeroizing::new(format!(
            "[\"{}\",\"{}\"]",
            hex::encode(self.public_key_der()),
            seed.as_str()
        ))
    }

    /// Parses a record produced by [`Self::to_record`].
    ///
    /// Returns `None` for anything malformed, including a public key that does
    /// not belong to the stored secret.
    #[must_use]
    pub fn from_record(namespace: Namespace, record: &str) -> Option<Self> {
        let (public_hex, secret_hex): (String, String) = serde_json::from_str(record).ok()?;
        let secret_hex = Zeroizing::new(secret_hex);
        let public_der = hex::decode(public_hex).ok()?;
        let secret = Zeroizing::new(hex::decode(secret_hex.as_str()).ok()?);
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(secret.as_slice().try_into().ok()?);

        let identity = Self::from_seed(namespace, &seed);
        let matches: bool = identity.public_key_der().ct_eq(&public_der).into();
        matches.then_some(identity)
    }
}

impl PartialEq for SessionIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.signing_key == other.signing_key
    }
}

impl Eq for SessionIdentity {}

impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("namespace", &self.namespace)
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}
