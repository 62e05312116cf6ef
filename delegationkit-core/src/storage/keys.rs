//! Typed storage keys.
//!
//! Every key is derived from a `(domain, namespace)` pair. The default
//! namespace maps to the bare domain key, any other namespace to
//! `<domain>:<namespace>`.

use std::fmt;

use crate::error::DelegationKitError;

const SEPARATOR: char = ':';
const DEFAULT_NAMESPACE_ALIAS: &str = "default";

/// What a storage slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageDomain {
    /// The serialized session key pair.
    SessionIdentity,
    /// The delegation chain received from the last completed round-trip.
    Delegation,
    /// Session-scoped slot where web targets park an inbound delegation payload.
    PendingDelegation,
}

impl StorageDomain {
    /// The base key for this domain.
    #[must_use]
    pub const fn base_key(self) -> &'static str {
        match self {
            Self::SessionIdentity => "identity",
            Self::Delegation => "delegation",
            Self::PendingDelegation => "pending-delegation",
        }
    }
}

/// A validated storage namespace. The empty namespace is the default one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Parses a namespace. `""` and `"default"` both select the default namespace.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationKitError::InvalidInput`] if the namespace contains the
    /// key separator `:` or surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, DelegationKitError> {
        if raw.is_empty() || raw == DEFAULT_NAMESPACE_ALIAS {
            return Ok(Self::default());
        }
        if raw.contains(SEPARATOR) {
            return Err(DelegationKitError::invalid_input(
                "namespace",
                format!("must not contain '{SEPARATOR}'"),
            ));
        }
        if raw.trim() != raw {
            return Err(DelegationKitError::invalid_input(
                "namespace",
                "must not have surrounding whitespace",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Whether this is the default namespace.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    /// The namespace as given (empty for the default namespace).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str(DEFAULT_NAMESPACE_ALIAS)
        } else {
            f.write_str(&self.0)
        }
    }
}

/// A storage key derived from a domain and a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    domain: StorageDomain,
    namespace: Namespace,
}

impl StorageKey {
    /// Builds the key for `namespace` within `domain`.
    #[must_use]
    pub const fn new(domain: StorageDomain, namespace: Namespace) -> Self {
        Self { domain, namespace }
    }

    /// The domain of this key.
    #[must_use]
    pub const fn domain(&self) -> StorageDomain {
        self.domain
    }

    /// The namespace of this key.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The prefix shared by every non-default namespace of `domain`.
    #[must_use]
    pub fn namespaced_prefix(domain: StorageDomain) -> String {
        format!("{}{SEPARATOR}", domain.base_key())
    }

    /// Recovers the namespace from a raw key found under `domain`.
    #[must_use]
    pub fn namespace_from_raw(domain: StorageDomain, raw: &str) -> Option<Namespace> {
        if raw == domain.base_key() {
            return Some(Namespace::default());
        }
        let rest = raw.strip_prefix(&Self::namespaced_prefix(domain))?;
        Namespace::parse(rest).ok().filter(|ns| !ns.is_default())
    }

    /// The string handed to the backend.
    #[must_use]
    pub fn to_raw(&self) -> String {
        if self.namespace.is_default() {
            self.domain.base_key().to_string()
        } else {
            format!(
                "{}{SEPARATOR}{}",
                self.domain.base_key(),
                self.namespace.as_str()
            )
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw())
    }
}
