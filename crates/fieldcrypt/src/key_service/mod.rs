//! The boundary to the external key-management / encryption service.
//!
//! [`KeyService`] is the only seam through which plaintext leaves the
//! process. Implementations:
//!
//! - [`TransitKeyService`]: Vault-Transit-style HTTP API.
//! - [`KmsKeyService`]: AWS KMS.
//! - [`LocalKeyService`]: in-process AES-256-GCM-SIV, for development and tests.
//!
//! Ciphertext returned by a backend is an opaque string to the rest of the
//! crate. An empty `context` means "no encryption context".

pub mod kms;
pub mod local;
pub mod transit;

pub use kms::KmsKeyService;
pub use local::LocalKeyService;
pub use transit::TransitKeyService;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a key-service backend.
#[derive(Debug, Error)]
pub enum KeyServiceError {
    /// The service answered with an error (non-2xx, API error payload).
    #[error("key service error: {0}")]
    Remote(String),

    /// The service could not be reached or the connection failed mid-call.
    #[error("key service transport error: {0}")]
    Transport(String),

    /// The call succeeded but the response carried no ciphertext.
    #[error("key service returned no ciphertext")]
    NoCiphertextReturned,

    /// The call succeeded but the response carried no plaintext.
    #[error("key service returned no plaintext")]
    NoPlaintextReturned,

    /// The service rejected the ciphertext for the supplied encryption context.
    #[error("encryption context does not match ciphertext")]
    ContextMismatch,

    /// A batch response had a different number of results than items sent.
    #[error("key service batch returned {got} results for {expected} items")]
    BatchLengthMismatch { expected: usize, got: usize },
}

impl KeyServiceError {
    /// Whether retrying the same call with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, KeyServiceError::Remote(_) | KeyServiceError::Transport(_))
    }
}

/// One entry of a batch encrypt call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptItem {
    pub plaintext: Vec<u8>,
    pub context: String,
}

/// One entry of a batch decrypt call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptItem {
    pub ciphertext: String,
    pub context: String,
}

/// Per-item results of a batch call, in request order.
pub type BatchResults<T> = Vec<Result<T, KeyServiceError>>;

/// Remote encrypt/decrypt under a named key.
///
/// Batch methods return one result per item in the same order. The outer
/// `Result` fails only when the whole call fails; a per-item error fails
/// only that item. The default batch implementations issue one call per
/// item.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyService: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Encrypt `plaintext` under `key_name`, scoped to `context`.
    async fn encrypt(
        &self,
        key_name: &str,
        plaintext: &[u8],
        context: &str,
    ) -> Result<String, KeyServiceError>;

    /// Decrypt `ciphertext` under `key_name`; `context` must match the one
    /// used at encryption time.
    async fn decrypt(
        &self,
        key_name: &str,
        ciphertext: &str,
        context: &str,
    ) -> Result<Vec<u8>, KeyServiceError>;

    async fn encrypt_batch(
        &self,
        key_name: &str,
        items: &[EncryptItem],
    ) -> Result<BatchResults<String>, KeyServiceError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.encrypt(key_name, &item.plaintext, &item.context).await);
        }
        Ok(out)
    }

    async fn decrypt_batch(
        &self,
        key_name: &str,
        items: &[DecryptItem],
    ) -> Result<BatchResults<Vec<u8>>, KeyServiceError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.decrypt(key_name, &item.ciphertext, &item.context).await);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reverses bytes; fails decrypt when the context differs from the one
    /// embedded at encryption time.
    struct Reverse;

    #[async_trait]
    impl KeyService for Reverse {
        fn backend(&self) -> &'static str {
            "reverse"
        }

        async fn encrypt(
            &self,
            _key_name: &str,
            plaintext: &[u8],
            context: &str,
        ) -> Result<String, KeyServiceError> {
            let mut rev = plaintext.to_vec();
            rev.reverse();
            Ok(format!("rev:{context}:{}", String::from_utf8_lossy(&rev)))
        }

        async fn decrypt(
            &self,
            _key_name: &str,
            ciphertext: &str,
            context: &str,
        ) -> Result<Vec<u8>, KeyServiceError> {
            let rest = ciphertext
                .strip_prefix(&format!("rev:{context}:"))
                .ok_or(KeyServiceError::ContextMismatch)?;
            let mut bytes = rest.as_bytes().to_vec();
            bytes.reverse();
            Ok(bytes)
        }
    }

    #[tokio::test]
    async fn default_batches_preserve_order_and_item_errors() {
        let svc = Reverse;
        let enc = svc
            .encrypt_batch(
                "k",
                &[
                    EncryptItem { plaintext: b"ab".to_vec(), context: "c1".into() },
                    EncryptItem { plaintext: b"cd".to_vec(), context: "".into() },
                ],
            )
            .await
            .unwrap();
        assert_eq!(enc[0].as_ref().unwrap(), "rev:c1:ba");
        assert_eq!(enc[1].as_ref().unwrap(), "rev::dc");

        let dec = svc
            .decrypt_batch(
                "k",
                &[
                    DecryptItem { ciphertext: "rev:c1:ba".into(), context: "c1".into() },
                    DecryptItem { ciphertext: "rev:c1:ba".into(), context: "c2".into() },
                ],
            )
            .await
            .unwrap();
        assert_eq!(dec[0].as_ref().unwrap(), b"ab");
        assert!(matches!(dec[1], Err(KeyServiceError::ContextMismatch)));
    }

    #[test]
    fn transient_classification() {
        assert!(KeyServiceError::Remote("503".into()).is_transient());
        assert!(KeyServiceError::Transport("reset".into()).is_transient());
        assert!(!KeyServiceError::ContextMismatch.is_transient());
        assert!(!KeyServiceError::NoCiphertextReturned.is_transient());
    }
}
