//! Identity type with `vrd_` prefix.
//!
//! Every participant the engine knows about (submitters, validators,
//! activators, managed accounts) is named by an [`Address`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// An engine identity, always prefixed with `vrd_`.
///
/// Derived from a 32-byte public key (or account seed) by `verdict-crypto`.
/// Ordering is lexicographic so registries can iterate deterministically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// The standard prefix for all identities.
    pub const PREFIX: &'static str = "vrd_";

    /// Create an address from a raw string.
    ///
    /// # Panics
    /// Panics if the string does not start with `vrd_`.
    pub fn new(raw: impl Into<String>) -> Self {
        let s = raw.into();
        assert!(s.starts_with(Self::PREFIX), "address must start with vrd_");
        Self(s)
    }

    /// Create an address, returning `None` instead of panicking on a bad prefix.
    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let s = raw.into();
        if s.starts_with(Self::PREFIX) && s.len() > Self::PREFIX.len() {
            Some(Self(s))
        } else {
            None
        }
    }

    /// Return the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The encoded part after the prefix.
    pub fn body(&self) -> &str {
        &self.0[Self::PREFIX.len()..]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
