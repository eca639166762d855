//! HMAC-SHA256 integrity tags over remote ciphertext.
//!
//! A tag lets the decrypt path reject a tampered or corrupted envelope before
//! any call is made to the key service.
//!
//! # Rendering
//!
//! Tags are the 32-byte MAC rendered as 64 lowercase hex characters.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::secret::SecretBytes;

type HmacSha256 = Hmac<Sha256>;

/// Length of a rendered tag in hex characters.
pub const TAG_HEX_LEN: usize = 64;

/// Suffix mixed into the key identifier when deriving the integrity secret.
const INTEGRITY_SUFFIX: &str = ":field-integrity:v1";

/// Process-wide HMAC key used for envelope integrity tags.
///
/// Derived once at startup and never persisted or logged.
#[derive(Clone, Debug)]
pub struct IntegritySecret(SecretBytes);

impl IntegritySecret {
    /// Derive the integrity secret from a named key identifier.
    ///
    /// The derivation is SHA-256 over the key name followed by a fixed suffix,
    /// so every process configured with the same key name verifies the same
    /// tags.
    pub fn derive(key_name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key_name.as_bytes());
        hasher.update(INTEGRITY_SUFFIX.as_bytes());
        Self(SecretBytes::new(hasher.finalize().to_vec()))
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(self.0.expose()).expect("HMAC accepts any key size")
    }
}

/// Compute the integrity tag of `ciphertext` under `secret`.
///
/// Deterministic: the same `(secret, ciphertext)` always yields the same tag.
pub fn compute(secret: &IntegritySecret, ciphertext: &str) -> String {
    let mut mac = secret.mac();
    mac.update(ciphertext.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify `tag` against `ciphertext` in constant time.
///
/// Accepts upper- or lowercase hex. Returns `false` for any tag that is not
/// exactly [`TAG_HEX_LEN`] hex characters.
pub fn verify(secret: &IntegritySecret, ciphertext: &str, tag: &str) -> bool {
    if tag.len() != TAG_HEX_LEN {
        return false;
    }
    let Ok(expected) = hex::decode(tag) else {
        return false;
    };
    let mut mac = secret.mac();
    mac.update(ciphertext.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// The current integrity secret plus previously used ones.
///
/// New tags are always computed with the current secret. Verification tries
/// the current secret first, then each previous secret in order, so tags
/// written before a rotation keep verifying while the previous secret is
/// still listed.
#[derive(Clone, Debug)]
pub struct IntegrityKeyring {
    current: IntegritySecret,
    previous: Vec<IntegritySecret>,
}

impl IntegrityKeyring {
    /// A keyring with a single secret and no rotation window.
    pub fn new(current: IntegritySecret) -> Self {
        Self {
            current,
            previous: Vec::new(),
        }
    }

    /// Add previous secrets, most recent first.
    pub fn with_previous(mut self, previous: impl IntoIterator<Item = IntegritySecret>) -> Self {
        self.previous.extend(previous);
        self
    }

    /// Build a keyring by deriving every secret from key identifiers.
    pub fn derive<'a>(key_name: &str, previous_key_names: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(IntegritySecret::derive(key_name))
            .with_previous(previous_key_names.into_iter().map(IntegritySecret::derive))
    }

    /// Compute a tag with the current secret.
    pub fn compute(&self, ciphertext: &str) -> String {
        compute(&self.current, ciphertext)
    }

    /// Verify a tag against the current secret, then each previous secret.
    pub fn verify(&self, ciphertext: &str, tag: &str) -> bool {
        std::iter::once(&self.current)
            .chain(self.previous.iter())
            .any(|secret| verify(secret, ciphertext, tag))
    }

    /// Number of previous secrets still accepted for verification.
    pub fn previous_len(&self) -> usize {
        self.previous.len()
    }
}
