//! Errors returned by [`FieldEncryptor`](crate::FieldEncryptor).

use thiserror::Error;

use crate::envelope::EnvelopeError;
use crate::key_service::KeyServiceError;

/// Failure of a field encrypt/decrypt operation.
///
/// `IntegrityViolation` and `LengthMismatch` indicate tampering or a caller
/// bug and must never be downgraded to warnings.
#[derive(Debug, Error)]
pub enum FieldCryptError {
    /// An envelope's integrity tag did not verify. No remote call was made.
    #[error("integrity tag verification failed{}", index_suffix(.index))]
    IntegrityViolation {
        /// Position in the batch, for batch calls.
        index: Option<usize>,
    },

    /// The key service failed.
    #[error("{source}{}", index_suffix(.index))]
    Remote {
        #[source]
        source: KeyServiceError,
        /// Position in the batch, for per-item batch failures.
        index: Option<usize>,
    },

    /// A stored envelope is structurally invalid.
    #[error("malformed envelope{}: {source}", index_suffix(.index))]
    MalformedEnvelope {
        #[source]
        source: EnvelopeError,
        index: Option<usize>,
    },

    /// `contexts` was supplied with a different length than the values.
    #[error("batch length mismatch: {values} values, {contexts} contexts")]
    LengthMismatch { values: usize, contexts: usize },

    /// A required configuration value was empty at construction time.
    #[error("missing required configuration: {0}")]
    ConfigurationMissing(&'static str),

    /// Decrypted bytes were not valid UTF-8.
    #[error("decrypted value is not valid UTF-8{}", index_suffix(.index))]
    InvalidUtf8 { index: Option<usize> },

    /// The caller's execution context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the key service answered.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

fn index_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" at index {i}")).unwrap_or_default()
}

impl FieldCryptError {
    pub(crate) fn remote(source: KeyServiceError) -> Self {
        Self::Remote {
            source,
            index: None,
        }
    }

    /// Attach a batch position to errors that carry one.
    pub(crate) fn at_index(self, i: usize) -> Self {
        match self {
            Self::IntegrityViolation { .. } => Self::IntegrityViolation { index: Some(i) },
            Self::Remote { source, .. } => Self::Remote {
                source,
                index: Some(i),
            },
            Self::MalformedEnvelope { source, .. } => Self::MalformedEnvelope {
                source,
                index: Some(i),
            },
            Self::InvalidUtf8 { .. } => Self::InvalidUtf8 { index: Some(i) },
            other => other,
        }
    }

    /// Whether the caller may retry the same call with backoff.
    ///
    /// Only transient key-service failures qualify; integrity, contract,
    /// context and cancellation failures never do.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote { source, .. } if source.is_transient())
    }

    /// Whether this is a key-service failure (the only kind a best-effort
    /// read may swallow).
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Batch position of the failing item, if known.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::IntegrityViolation { index }
            | Self::Remote { index, .. }
            | Self::MalformedEnvelope { index, .. }
            | Self::InvalidUtf8 { index } => *index,
            _ => None,
        }
    }
}

impl From<KeyServiceError> for FieldCryptError {
    fn from(source: KeyServiceError) -> Self {
        Self::remote(source)
    }
}

impl From<EnvelopeError> for FieldCryptError {
    fn from(source: EnvelopeError) -> Self {
        Self::MalformedEnvelope {
            source,
            index: None,
        }
    }
}
