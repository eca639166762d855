//! In-process key service backed by AES-256-GCM-SIV.
//!
//! Intended for local development and tests; production deployments use a
//! remote backend. The behaviour mirrors what the remote backends guarantee:
//!
//! - the encryption context is bound as associated data, so decrypting with a
//!   different context fails with [`KeyServiceError::ContextMismatch`];
//! - with a non-empty context the nonce is derived from the context and the
//!   plaintext, so equal plaintext + context yields equal ciphertext;
//! - with an empty context the nonce is random per call.
//!
//! **Do NOT replace AES-GCM-SIV with plain AES-GCM here.** The derived nonce
//! repeats for repeated plaintext, which only a nonce-misuse-resistant AEAD
//! tolerates.
//!
//! # Ciphertext format
//!
//! ```text
//! local:v1:<base64url-no-pad(nonce || ciphertext+tag)>
//! ```

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256GcmSiv, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use super::{KeyService, KeyServiceError};
use crate::secret::SecretBytes;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Prefix on every ciphertext produced by this backend.
pub const CIPHERTEXT_PREFIX: &str = "local:v1:";

const NONCE_KEY_LABEL: &[u8] = b"local-key-service:nonce";

type HmacSha256 = Hmac<Sha256>;

/// Errors constructing a [`LocalKeyService`].
#[derive(Debug, Error)]
pub enum LocalKeyError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The hex-encoded key could not be decoded.
    #[error("key is not valid hex")]
    InvalidHex,
}

/// AES-256-GCM-SIV key service holding its key in process memory.
pub struct LocalKeyService {
    cipher: Aes256GcmSiv,
    nonce_key: SecretBytes,
}

impl LocalKeyService {
    /// Build a service from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LocalKeyError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
    pub fn new(key: &SecretBytes) -> Result<Self, LocalKeyError> {
        if key.len() != KEY_LEN {
            return Err(LocalKeyError::InvalidKeyLength(key.len()));
        }
        let cipher = Aes256GcmSiv::new_from_slice(key.expose())
            .map_err(|_| LocalKeyError::InvalidKeyLength(key.len()))?;

        let mut mac = <HmacSha256 as Mac>::new_from_slice(key.expose())
            .map_err(|_| LocalKeyError::InvalidKeyLength(key.len()))?;
        mac.update(NONCE_KEY_LABEL);
        let nonce_key = SecretBytes::new(mac.finalize().into_bytes().to_vec());

        Ok(Self { cipher, nonce_key })
    }

    /// Build a service from a 64-character hex key.
    ///
    /// # Errors
    ///
    /// Returns [`LocalKeyError::InvalidHex`] or [`LocalKeyError::InvalidKeyLength`].
    pub fn from_hex(key_hex: &str) -> Result<Self, LocalKeyError> {
        let bytes = hex::decode(key_hex.trim()).map_err(|_| LocalKeyError::InvalidHex)?;
        Self::new(&SecretBytes::new(bytes))
    }

    /// Build a service with a fresh random key. Ciphertext does not survive
    /// the process.
    pub fn ephemeral() -> Self {
        let mut key = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(&SecretBytes::new(key)).expect("generated key has the right length")
    }

    fn nonce_for(&self, plaintext: &[u8], context: &str) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        if context.is_empty() {
            OsRng.fill_bytes(&mut nonce);
        } else {
            let mut mac = <HmacSha256 as Mac>::new_from_slice(self.nonce_key.expose())
                .expect("HMAC accepts any key size");
            mac.update(context.as_bytes());
            mac.update(&[0]);
            mac.update(plaintext);
            nonce.copy_from_slice(&mac.finalize().into_bytes()[..NONCE_LEN]);
        }
        nonce
    }
}

fn associated_data(key_name: &str, context: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(key_name.len() + context.len() + 1);
    aad.extend_from_slice(key_name.as_bytes());
    aad.push(0);
    aad.extend_from_slice(context.as_bytes());
    aad
}

#[async_trait]
impl KeyService for LocalKeyService {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn encrypt(
        &self,
        key_name: &str,
        plaintext: &[u8],
        context: &str,
    ) -> Result<String, KeyServiceError> {
        let nonce_bytes = self.nonce_for(plaintext, context);
        let aad = associated_data(key_name, context);
        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| KeyServiceError::Remote("aead encryption failed".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);
        Ok(format!("{CIPHERTEXT_PREFIX}{}", URL_SAFE_NO_PAD.encode(blob)))
    }

    async fn decrypt(
        &self,
        key_name: &str,
        ciphertext: &str,
        context: &str,
    ) -> Result<Vec<u8>, KeyServiceError> {
        let encoded = ciphertext
            .strip_prefix(CIPHERTEXT_PREFIX)
            .ok_or_else(|| KeyServiceError::Remote("unrecognised ciphertext prefix".into()))?;
        let blob = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| KeyServiceError::Remote("invalid ciphertext encoding".into()))?;
        if blob.len() <= NONCE_LEN {
            return Err(KeyServiceError::Remote("ciphertext too short".into()));
        }
        let (nonce_bytes, sealed) = blob.split_at(NONCE_LEN);
        let aad = associated_data(key_name, context);

        // The AEAD cannot tell a wrong context from a wrong key; tampering with
        // the stored envelope is caught earlier by the integrity tag.
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| KeyServiceError::ContextMismatch)
    }
}
