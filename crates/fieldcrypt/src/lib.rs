//! Field-level PII encryption.
//!
//! Values are encrypted by an external key service and stored as envelopes
//! of the form `<remote-ciphertext>:<hmac-tag>`. The tag is verified locally
//! before any decrypt call, so tampered rows are rejected without touching
//! the key service.
//!
//! Alongside the encryptor live the supporting pieces every PII-handling
//! service needs: keyed search digests for equality lookups, log redaction,
//! display masks, and policy-driven encryption of whole JSON records.

pub mod context;
pub mod encryptor;
pub mod envelope;
pub mod error;
pub mod key_service;
pub mod mask;
pub mod record;
pub mod redact;
pub mod search;
pub mod secret;
pub mod tag;

pub use context::CallContext;
pub use encryptor::FieldEncryptor;
pub use envelope::Envelope;
pub use error::FieldCryptError;
pub use key_service::{KeyService, KeyServiceError};
pub use record::{ReadMode, RecordError, RecordPolicy};
pub use search::SearchHasher;
pub use secret::SecretBytes;
pub use tag::{IntegrityKeyring, IntegritySecret};
