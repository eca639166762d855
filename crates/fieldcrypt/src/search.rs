//! Keyed, deterministic digests for exact-match lookup on encrypted columns.
//!
//! The digest is stored in a sibling column next to the envelope, never
//! instead of it. The secret must differ from the integrity secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::secret::SecretBytes;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over plaintext with a process-wide search secret.
#[derive(Clone, Debug)]
pub struct SearchHasher {
    secret: SecretBytes,
}

impl SearchHasher {
    pub fn new(secret: SecretBytes) -> Self {
        Self { secret }
    }

    /// Lowercase hex digest of `plaintext`. Same input, same digest.
    pub fn hash(&self, plaintext: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose())
            .expect("HMAC accepts any key length");
        mac.update(plaintext.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{self, IntegritySecret};

    #[test]
    fn deterministic_hex_digest() {
        let h = SearchHasher::new(SecretBytes::from_slice(b"search-secret"));
        let a = h.hash("user@example.com");
        assert_eq!(a, h.hash("user@example.com"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn distinct_inputs_and_secrets_differ() {
        let h1 = SearchHasher::new(SecretBytes::from_slice(b"one"));
        let h2 = SearchHasher::new(SecretBytes::from_slice(b"two"));
        assert_ne!(h1.hash("x"), h1.hash("y"));
        assert_ne!(h1.hash("x"), h2.hash("x"));
    }

    #[test]
    fn independent_of_integrity_tag() {
        let h = SearchHasher::new(SecretBytes::from_slice(b"search"));
        let integrity = IntegritySecret::derive("search");
        assert_ne!(h.hash("value"), tag::compute(&integrity, "value"));
    }

    #[test]
    fn empty_secret_still_hashes() {
        let h = SearchHasher::new(SecretBytes::new(Vec::new()));
        assert_eq!(h.hash("a").len(), 64);
    }
}
