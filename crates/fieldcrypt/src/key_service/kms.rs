//! AWS KMS key service.
//!
//! The field context string is sent as the KMS encryption context
//! `{"field_context": <context>}`; KMS refuses to decrypt when it differs.
//! KMS ciphertext blobs are binary and rendered as
//! `kms:v1:<base64(ciphertext-blob)>`.
//!
//! KMS encryption is randomised: the same plaintext and context yield
//! different ciphertext on every call. Equality lookups on KMS-encrypted
//! fields go through the search hash instead.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::{KeyService, KeyServiceError};

/// Prefix on every ciphertext produced by this backend.
pub const CIPHERTEXT_PREFIX: &str = "kms:v1:";

/// Encryption-context key under which the field context is sent.
pub const CONTEXT_KEY: &str = "field_context";

/// Key service backed by AWS KMS `Encrypt` / `Decrypt`.
#[derive(Clone, Debug)]
pub struct KmsKeyService {
    client: aws_sdk_kms::Client,
}

impl KmsKeyService {
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }
}

fn encryption_context(context: &str) -> Option<HashMap<String, String>> {
    (!context.is_empty()).then(|| HashMap::from([(CONTEXT_KEY.to_owned(), context.to_owned())]))
}

fn decode_ciphertext(ciphertext: &str) -> Result<Vec<u8>, KeyServiceError> {
    let encoded = ciphertext
        .strip_prefix(CIPHERTEXT_PREFIX)
        .ok_or_else(|| KeyServiceError::Remote("unrecognised ciphertext prefix".into()))?;
    STANDARD
        .decode(encoded)
        .map_err(|_| KeyServiceError::Remote("invalid ciphertext encoding".into()))
}

#[async_trait]
impl KeyService for KmsKeyService {
    fn backend(&self) -> &'static str {
        "kms"
    }

    async fn encrypt(
        &self,
        key_name: &str,
        plaintext: &[u8],
        context: &str,
    ) -> Result<String, KeyServiceError> {
        let resp = self
            .client
            .encrypt()
            .key_id(key_name)
            .plaintext(Blob::new(plaintext))
            .set_encryption_context(encryption_context(context))
            .send()
            .await
            .map_err(|e| KeyServiceError::Remote(e.into_service_error().to_string()))?;

        let blob = resp
            .ciphertext_blob()
            .ok_or(KeyServiceError::NoCiphertextReturned)?;
        Ok(format!("{CIPHERTEXT_PREFIX}{}", STANDARD.encode(blob.as_ref())))
    }

    async fn decrypt(
        &self,
        key_name: &str,
        ciphertext: &str,
        context: &str,
    ) -> Result<Vec<u8>, KeyServiceError> {
        let blob = decode_ciphertext(ciphertext)?;
        let resp = self
            .client
            .decrypt()
            .key_id(key_name)
            .ciphertext_blob(Blob::new(blob))
            .set_encryption_context(encryption_context(context))
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_invalid_ciphertext_exception() {
                    KeyServiceError::ContextMismatch
                } else {
                    KeyServiceError::Remote(err.to_string())
                }
            })?;

        resp.plaintext()
            .map(|p| p.as_ref().to_vec())
            .ok_or(KeyServiceError::NoPlaintextReturned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_map_only_when_present() {
        assert!(encryption_context("").is_none());
        let map = encryption_context("user:email").unwrap();
        assert_eq!(map.get(CONTEXT_KEY).map(String::as_str), Some("user:email"));
    }

    #[test]
    fn decodes_prefixed_ciphertext() {
        let ct = format!("{CIPHERTEXT_PREFIX}{}", STANDARD.encode(b"blob"));
        assert_eq!(decode_ciphertext(&ct).unwrap(), b"blob");
    }

    #[test]
    fn rejects_foreign_ciphertext() {
        assert!(decode_ciphertext("vault:v1:abc").is_err());
        assert!(decode_ciphertext("kms:v1:***").is_err());
    }
}
