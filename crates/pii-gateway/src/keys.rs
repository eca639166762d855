//! Key-service wiring: picks the backend named in config and builds the
//! process-wide [`FieldEncryptor`].

use std::sync::Arc;

use anyhow::{Context, Result};
use fieldcrypt::key_service::{KmsKeyService, LocalKeyService, TransitKeyService};
use fieldcrypt::{FieldEncryptor, IntegrityKeyring, KeyService, SecretBytes};
use tracing::{info, warn};

use crate::aws::AwsClients;
use crate::config::{Backend, Config};

/// Build the configured key-service backend.
///
/// # Errors
///
/// Returns an error if a backend-specific setting is missing or invalid, or
/// if `kms` is selected without AWS clients.
pub fn build_key_service(cfg: &Config, aws: Option<&AwsClients>) -> Result<Arc<dyn KeyService>> {
    let svc: Arc<dyn KeyService> = match cfg.key_service_backend {
        Backend::Transit => {
            let addr = cfg
                .key_service_addr
                .as_deref()
                .context("KEY_SERVICE_ADDR is required for the transit backend")?;
            let token = cfg
                .key_service_token
                .as_deref()
                .context("KEY_SERVICE_TOKEN is required for the transit backend")?;
            Arc::new(
                TransitKeyService::new(addr, SecretBytes::from_slice(token.as_bytes()))
                    .context("failed to build transit key service client")?,
            )
        }
        Backend::Kms => {
            let aws = aws.context("AWS clients are required for the kms backend")?;
            Arc::new(KmsKeyService::new(aws.kms.clone()))
        }
        Backend::Local => {
            warn!("using in-process local key service; not for production data");
            let key_hex = cfg
                .local_key_hex
                .as_deref()
                .context("LOCAL_KEY_HEX is required for the local backend")?;
            Arc::new(LocalKeyService::from_hex(key_hex).context("invalid LOCAL_KEY_HEX")?)
        }
    };
    info!(backend = svc.backend(), "key service configured");
    Ok(svc)
}

/// Build the encryptor, with integrity tags from previous key names still
/// accepted on read.
pub fn build_encryptor(cfg: &Config, key_service: Arc<dyn KeyService>) -> Result<FieldEncryptor> {
    let previous = cfg.previous_key_names();
    let keyring = IntegrityKeyring::derive(&cfg.key_name, previous.iter().copied());
    let encryptor = FieldEncryptor::new(key_service, &cfg.key_name)
        .context("failed to build field encryptor")?
        .with_keyring(keyring);
    info!(
        key_name = %cfg.key_name,
        previous_integrity_keys = previous.len(),
        "field encryptor ready"
    );
    Ok(encryptor)
}

/// Whether AWS clients must be initialised for this configuration.
pub fn needs_aws(cfg: &Config) -> bool {
    cfg.key_service_backend == Backend::Kms || cfg.search_hash_secret_arn.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::local_config;
    use fieldcrypt::CallContext;

    #[tokio::test]
    async fn local_backend_round_trips() {
        let cfg = local_config();
        let svc = build_key_service(&cfg, None).unwrap();
        assert_eq!(svc.backend(), "local");

        let enc = build_encryptor(&cfg, svc).unwrap();
        let ctx = CallContext::background();
        let env = enc.encrypt_with_context(&ctx, "x@y.z", "user:email").await.unwrap();
        assert_eq!(enc.decrypt_with_context(&ctx, &env, "user:email").await.unwrap(), "x@y.z");
    }

    #[test]
    fn kms_without_clients_fails() {
        let cfg = Config {
            key_service_backend: Backend::Kms,
            ..local_config()
        };
        assert!(build_key_service(&cfg, None).is_err());
        assert!(needs_aws(&cfg));
        assert!(!needs_aws(&local_config()));
    }

    #[test]
    fn transit_builds_from_addr_and_token() {
        let cfg = Config {
            key_service_backend: Backend::Transit,
            key_service_addr: Some("http://127.0.0.1:8200".into()),
            key_service_token: Some("s.token".into()),
            ..local_config()
        };
        assert_eq!(build_key_service(&cfg, None).unwrap().backend(), "transit");
    }

    #[test]
    fn bad_local_key_fails() {
        let cfg = Config {
            local_key_hex: Some("abcd".into()),
            ..local_config()
        };
        assert!(build_key_service(&cfg, None).is_err());
    }
}
