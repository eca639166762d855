//! Mapping of core errors onto HTTP responses.
//!
//! Messages are generic and never echo plaintext, ciphertext or key material.
//! Caller-contract errors become 4xx; integrity and key-service failures 5xx.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, ServiceError};
use fieldcrypt::{FieldCryptError, KeyServiceError, RecordError};
use tracing::{error, warn};

/// A [`ServiceError`] that renders as a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl From<FieldCryptError> for ApiError {
    fn from(e: FieldCryptError) -> Self {
        Self(service_error(&e, ""))
    }
}

impl From<RecordError> for ApiError {
    fn from(e: RecordError) -> Self {
        let mapped = match &e {
            RecordError::Field { path, source } => service_error(source, &format!(" in field {path}")),
            RecordError::Crypt(source) => service_error(source, ""),
            RecordError::UnknownReadMode(mode) => {
                ServiceError::BadRequest(format!("unknown read mode {mode:?}"))
            }
            RecordError::InvalidPath { .. } => {
                error!(error = %e, "policy path rejected at request time");
                ServiceError::Internal("invalid record policy".into())
            }
        };
        Self(mapped)
    }
}

fn service_error(e: &FieldCryptError, location: &str) -> ServiceError {
    let at = match e.index() {
        Some(i) => format!(" at index {i}{location}"),
        None => location.to_owned(),
    };
    match e {
        FieldCryptError::IntegrityViolation { .. } => {
            ServiceError::EncryptionFailure(format!("integrity check failed{at}"))
        }
        FieldCryptError::Remote {
            source: KeyServiceError::ContextMismatch,
            ..
        } => ServiceError::BadRequest(format!("encryption context does not match{at}")),
        FieldCryptError::Remote { .. } if e.is_retryable() => {
            warn!(error = %e, "key service unavailable");
            ServiceError::Unavailable(format!("key service unavailable{at}"))
        }
        FieldCryptError::Remote { .. } => {
            error!(error = %e, "key service returned an unusable response");
            ServiceError::EncryptionFailure(format!("key service failure{at}"))
        }
        FieldCryptError::MalformedEnvelope { .. } => {
            ServiceError::BadRequest(format!("malformed envelope{at}"))
        }
        FieldCryptError::LengthMismatch { values, contexts } => ServiceError::BadRequest(
            format!("{values} values but {contexts} contexts"),
        ),
        FieldCryptError::InvalidUtf8 { .. } => {
            ServiceError::BadRequest(format!("decrypted value is not UTF-8{at}"))
        }
        FieldCryptError::ConfigurationMissing(what) => {
            error!(missing = what, "configuration missing at request time");
            ServiceError::Internal("service misconfigured".into())
        }
        FieldCryptError::Cancelled => ServiceError::Unavailable("request cancelled".into()),
        FieldCryptError::DeadlineExceeded => {
            ServiceError::Unavailable("key service deadline exceeded".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(e: impl Into<ApiError>) -> u16 {
        e.into().0.http_status()
    }

    #[test]
    fn caller_errors_are_4xx() {
        assert_eq!(status(FieldCryptError::LengthMismatch { values: 2, contexts: 1 }), 400);
        assert_eq!(status(FieldCryptError::from(KeyServiceError::ContextMismatch)), 400);
        assert_eq!(status(RecordError::UnknownReadMode("x".into())), 400);
    }

    #[test]
    fn integrity_and_remote_are_5xx() {
        assert_eq!(status(FieldCryptError::IntegrityViolation { index: Some(1) }), 500);
        assert_eq!(status(FieldCryptError::from(KeyServiceError::Transport("x".into()))), 503);
        assert_eq!(status(FieldCryptError::from(KeyServiceError::NoCiphertextReturned)), 500);
        assert_eq!(status(FieldCryptError::DeadlineExceeded), 503);
        assert_eq!(status(FieldCryptError::Cancelled), 503);
    }

    #[test]
    fn messages_carry_index_and_field_only() {
        let e: ApiError = RecordError::Field {
            path: "/addresses/1/street".into(),
            source: FieldCryptError::IntegrityViolation { index: Some(3) },
        }
        .into();
        let msg = e.0.to_string();
        assert!(msg.contains("at index 3 in field /addresses/1/street"), "{msg}");

        let e: ApiError = FieldCryptError::from(KeyServiceError::Remote("vault said: secret stuff".into())).into();
        assert!(!e.0.to_string().contains("secret stuff"));
    }
}
