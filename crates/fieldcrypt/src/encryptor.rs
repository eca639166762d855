//! [`FieldEncryptor`]: the per-field encrypt/decrypt API.
//!
//! # Write path
//!
//! plaintext → key service encrypt → HMAC tag over the returned ciphertext →
//! `<ciphertext>:<tag>` envelope.
//!
//! # Read path
//!
//! envelope → parse → verify tag (fail closed, no remote call on mismatch) →
//! key service decrypt → plaintext. Untagged legacy envelopes skip the tag
//! check.
//!
//! Empty values are never sent to the key service: `""` encrypts to `""` and
//! decrypts to `""`.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::context::CallContext;
use crate::envelope::Envelope;
use crate::error::FieldCryptError;
use crate::key_service::{DecryptItem, EncryptItem, KeyService, KeyServiceError};
use crate::tag::IntegrityKeyring;

/// Encrypts and decrypts individual string fields through a [`KeyService`].
///
/// Cheap to clone; construct once at the composition root and hand clones
/// to every component that stores PII.
#[derive(Clone)]
pub struct FieldEncryptor {
    key_service: Arc<dyn KeyService>,
    key_name: Arc<str>,
    keyring: Arc<IntegrityKeyring>,
}

impl fmt::Debug for FieldEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldEncryptor")
            .field("backend", &self.key_service.backend())
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

impl FieldEncryptor {
    /// Create an encryptor for `key_name`, deriving the integrity secret from
    /// the same key name.
    ///
    /// # Errors
    ///
    /// Returns [`FieldCryptError::ConfigurationMissing`] if `key_name` is blank.
    pub fn new(key_service: Arc<dyn KeyService>, key_name: &str) -> Result<Self, FieldCryptError> {
        if key_name.trim().is_empty() {
            return Err(FieldCryptError::ConfigurationMissing("key name"));
        }
        Ok(Self {
            key_service,
            key_name: Arc::from(key_name),
            keyring: Arc::new(IntegrityKeyring::derive(key_name, std::iter::empty())),
        })
    }

    /// Replace the integrity keyring, e.g. to accept tags from previous
    /// integrity secrets during a rotation window.
    pub fn with_keyring(mut self, keyring: IntegrityKeyring) -> Self {
        self.keyring = Arc::new(keyring);
        self
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Name of the key-service backend in use.
    pub fn backend(&self) -> &'static str {
        self.key_service.backend()
    }

    // -----------------------------------------------------------------------
    // Single values
    // -----------------------------------------------------------------------

    /// Encrypt with no encryption context.
    pub async fn encrypt(&self, ctx: &CallContext, plaintext: &str) -> Result<String, FieldCryptError> {
        self.encrypt_with_context(ctx, plaintext, "").await
    }

    /// Encrypt `plaintext` scoped to `context` and return a tagged envelope.
    ///
    /// # Errors
    ///
    /// [`FieldCryptError::Remote`] if the key service fails,
    /// [`FieldCryptError::Cancelled`] / [`FieldCryptError::DeadlineExceeded`]
    /// if `ctx` ends first.
    pub async fn encrypt_with_context(
        &self,
        ctx: &CallContext,
        plaintext: &str,
        context: &str,
    ) -> Result<String, FieldCryptError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let remote = ctx
            .run(self.key_service.encrypt(&self.key_name, plaintext.as_bytes(), context))
            .await??;
        self.seal(remote)
    }

    /// Decrypt an envelope written with no encryption context.
    pub async fn decrypt(&self, ctx: &CallContext, envelope: &str) -> Result<String, FieldCryptError> {
        self.decrypt_with_context(ctx, envelope, "").await
    }

    /// Verify and decrypt `envelope`; `context` must be the one used to
    /// encrypt it.
    ///
    /// # Errors
    ///
    /// [`FieldCryptError::IntegrityViolation`] if the tag does not verify (no
    /// remote call is made), [`FieldCryptError::MalformedEnvelope`] for a tag
    /// with nothing before it, [`FieldCryptError::Remote`] for key-service
    /// failures including a context mismatch.
    pub async fn decrypt_with_context(
        &self,
        ctx: &CallContext,
        envelope: &str,
        context: &str,
    ) -> Result<String, FieldCryptError> {
        if envelope.is_empty() {
            return Ok(String::new());
        }
        let remote = self.verified_ciphertext(envelope)?;
        let bytes = ctx
            .run(self.key_service.decrypt(&self.key_name, remote, context))
            .await??;
        into_utf8(bytes)
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    /// Encrypt many values in one key-service call.
    ///
    /// `contexts`, when given, must have one entry per plaintext. Empty
    /// plaintexts map to empty envelopes and take no slot in the remote
    /// batch. Output position `i` always corresponds to input position `i`.
    /// Any per-item failure fails the whole call.
    pub async fn encrypt_batch(
        &self,
        ctx: &CallContext,
        plaintexts: &[&str],
        contexts: Option<&[&str]>,
    ) -> Result<Vec<String>, FieldCryptError> {
        check_lengths(plaintexts.len(), contexts)?;

        let mut out = vec![String::new(); plaintexts.len()];
        let mut slots = Vec::new();
        let mut items = Vec::new();
        for (i, plaintext) in plaintexts.iter().enumerate() {
            if plaintext.is_empty() {
                continue;
            }
            slots.push(i);
            items.push(EncryptItem {
                plaintext: plaintext.as_bytes().to_vec(),
                context: context_at(contexts, i).to_owned(),
            });
        }
        if items.is_empty() {
            return Ok(out);
        }

        debug!(total = plaintexts.len(), sent = items.len(), "encrypt batch");
        let results = ctx
            .run(self.key_service.encrypt_batch(&self.key_name, &items))
            .await??;
        check_result_count(items.len(), results.len())?;

        for (slot, result) in slots.into_iter().zip(results) {
            out[slot] = result
                .map_err(FieldCryptError::from)
                .and_then(|remote| self.seal(remote))
                .map_err(|e| e.at_index(slot))?;
        }
        Ok(out)
    }

    /// Verify and decrypt many envelopes in one key-service call.
    ///
    /// Every non-empty envelope is parsed and tag-verified before anything is
    /// sent; the first failure aborts the whole call with its input index and
    /// no remote call is made. Empty envelopes map to empty plaintexts and
    /// take no slot in the remote batch.
    pub async fn decrypt_batch(
        &self,
        ctx: &CallContext,
        envelopes: &[&str],
        contexts: Option<&[&str]>,
    ) -> Result<Vec<String>, FieldCryptError> {
        check_lengths(envelopes.len(), contexts)?;

        let mut slots = Vec::new();
        let mut items = Vec::new();
        for (i, envelope) in envelopes.iter().enumerate() {
            if envelope.is_empty() {
                continue;
            }
            let remote = self.verified_ciphertext(envelope).map_err(|e| e.at_index(i))?;
            slots.push(i);
            items.push(DecryptItem {
                ciphertext: remote.to_owned(),
                context: context_at(contexts, i).to_owned(),
            });
        }

        let mut out = vec![String::new(); envelopes.len()];
        if items.is_empty() {
            return Ok(out);
        }

        debug!(total = envelopes.len(), sent = items.len(), "decrypt batch");
        let results = ctx
            .run(self.key_service.decrypt_batch(&self.key_name, &items))
            .await??;
        check_result_count(items.len(), results.len())?;

        for (slot, result) in slots.into_iter().zip(results) {
            out[slot] = result
                .map_err(FieldCryptError::from)
                .and_then(into_utf8)
                .map_err(|e| e.at_index(slot))?;
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn seal(&self, remote: String) -> Result<String, FieldCryptError> {
        if remote.is_empty() {
            return Err(KeyServiceError::NoCiphertextReturned.into());
        }
        let tag = self.keyring.compute(&remote);
        Ok(Envelope::serialize(&remote, Some(&tag)))
    }

    fn verified_ciphertext<'a>(&self, envelope: &'a str) -> Result<&'a str, FieldCryptError> {
        let parsed = Envelope::parse(envelope)?;
        match parsed.tag {
            Some(tag) if !self.keyring.verify(parsed.remote_ciphertext, tag) => {
                error!(key_name = %self.key_name, "envelope integrity verification failed");
                Err(FieldCryptError::IntegrityViolation { index: None })
            }
            Some(_) => Ok(parsed.remote_ciphertext),
            None => {
                warn!(key_name = %self.key_name, "decrypting legacy envelope without integrity tag");
                Ok(parsed.remote_ciphertext)
            }
        }
    }
}

fn check_lengths(values: usize, contexts: Option<&[&str]>) -> Result<(), FieldCryptError> {
    match contexts {
        Some(c) if c.len() != values => Err(FieldCryptError::LengthMismatch {
            values,
            contexts: c.len(),
        }),
        _ => Ok(()),
    }
}

fn check_result_count(expected: usize, got: usize) -> Result<(), FieldCryptError> {
    if expected != got {
        return Err(KeyServiceError::BatchLengthMismatch { expected, got }.into());
    }
    Ok(())
}

fn context_at<'a>(contexts: Option<&[&'a str]>, i: usize) -> &'a str {
    contexts.map_or("", |c| c[i])
}

fn into_utf8(bytes: Vec<u8>) -> Result<String, FieldCryptError> {
    String::from_utf8(bytes).map_err(|_| FieldCryptError::InvalidUtf8 { index: None })
}
