//! Request and response types exchanged with the PII gateway.
//!
//! All bodies are JSON. Plaintext only ever travels in request bodies of
//! `/v1/encrypt`, `/v1/hash`, `/v1/mask` and in the response of `/v1/decrypt`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Encrypt / decrypt endpoints
// ---------------------------------------------------------------------------

/// A single value submitted for encryption or decryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldItem {
    /// Plaintext (encrypt) or envelope string (decrypt). Empty maps to empty.
    pub value: String,
    /// Encryption context, e.g. `"user:email"`. Absent means no context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Request body for `POST /v1/encrypt` and `POST /v1/decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldBatchRequest {
    /// Values to process, in order.
    pub items: Vec<FieldItem>,
}

/// Response body for `POST /v1/encrypt` and `POST /v1/decrypt`.
///
/// `items[i]` corresponds to `request.items[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldBatchResponse {
    /// Envelopes (encrypt) or plaintexts (decrypt), in request order.
    pub items: Vec<String>,
}

// ---------------------------------------------------------------------------
// Search hash endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashRequest {
    /// Plaintext values to hash.
    pub values: Vec<String>,
}

/// Response body for `POST /v1/hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashResponse {
    /// Lowercase-hex digests, in request order.
    pub digests: Vec<String>,
}

// ---------------------------------------------------------------------------
// Record endpoints
// ---------------------------------------------------------------------------

/// Request and response body for `POST /v1/records/{policy}/{encrypt,decrypt}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordBody {
    /// Arbitrary JSON object whose policy fields are transformed in place.
    pub record: serde_json::Value,
}

/// Query string for `POST /v1/records/{policy}/decrypt`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordDecryptQuery {
    /// `"strict"` (default) or `"best_effort"`.
    #[serde(default)]
    pub mode: Option<String>,
}

// ---------------------------------------------------------------------------
// Redact / mask endpoints
// ---------------------------------------------------------------------------

/// Request and response body for `POST /v1/redact`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactBody {
    /// Free text (request) or its redacted form (response).
    pub text: String,
}

/// Which display mask to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskKind {
    Name,
    Phone,
    Email,
}

/// Request body for `POST /v1/mask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskRequest {
    pub kind: MaskKind,
    pub value: String,
}

/// Response body for `POST /v1/mask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskResponse {
    pub masked: String,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Name of the configured key-service backend.
    pub key_service: String,
    /// Number of record policies currently loaded.
    pub policies_loaded: usize,
}
