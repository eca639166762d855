//! Shared application state injected into every Axum handler.

use std::time::Duration;

use fieldcrypt::{FieldEncryptor, SearchHasher};
use tokio_util::sync::CancellationToken;

use crate::policy::PolicyRegistry;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable (`Arc`-backed) so that Axum can clone the
/// state for each request without copying expensive data.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The process-wide field encryptor.
    pub encryptor: FieldEncryptor,
    /// Digests for searchable fields.
    pub hasher: SearchHasher,
    /// Record policies by name.
    pub policies: PolicyRegistry,
    /// Deadline applied to each request's key-service calls.
    pub key_service_timeout: Duration,
    /// Cancelled on shutdown; aborts in-flight key-service calls.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        encryptor: FieldEncryptor,
        hasher: SearchHasher,
        policies: PolicyRegistry,
        key_service_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            encryptor,
            hasher,
            policies,
            key_service_timeout,
            shutdown,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use fieldcrypt::key_service::LocalKeyService;
    use fieldcrypt::{KeyService, SecretBytes};

    use super::*;
    use crate::policy::tests::USER_POLICY;

    pub(crate) const KEY_NAME: &str = "pii-key";

    /// State over an in-process key service, for handler tests.
    pub(crate) fn test_state() -> AppState {
        state_with(Arc::new(LocalKeyService::ephemeral()))
    }

    pub(crate) fn state_with(key_service: Arc<dyn KeyService>) -> AppState {
        AppState::new(
            FieldEncryptor::new(key_service, KEY_NAME).unwrap(),
            SearchHasher::new(SecretBytes::from_slice(b"search-secret")),
            PolicyRegistry::from_yaml(USER_POLICY).unwrap(),
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }
}
