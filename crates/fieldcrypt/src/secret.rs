//! [`SecretBytes`]: in-memory key material for the integrity and search secrets.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Owned secret key bytes.
///
/// The buffer is overwritten with zeroes when dropped, and the value never
/// prints its contents through `Debug`. Clone only when a second owner is
/// genuinely needed; each clone is zeroed independently.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    /// Take ownership of `bytes` as secret material.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Copy `bytes` into a new secret buffer.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Borrow the raw key bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("SecretBytes([REDACTED])")
    }
}
