//! Configuration loading and validation for the gateway.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Which key service the encryptor talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Vault-Transit-style HTTP API.
    #[default]
    Transit,
    /// AWS KMS.
    Kms,
    /// In-process AES-GCM-SIV; development only.
    Local,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transit => "transit",
            Self::Kms => "kms",
            Self::Local => "local",
        }
    }
}

/// Validated gateway configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub key_service_backend: Backend,

    /// Key service endpoint. **Required** for `transit`; optional endpoint
    /// override for `kms`.
    #[serde(default)]
    pub key_service_addr: Option<String>,

    /// Key service credential. **Required** for `transit`.
    #[serde(default)]
    pub key_service_token: Option<String>,

    /// Named key identifier; also seeds the integrity secret. **Required.**
    pub key_name: String,

    /// Comma-separated key identifiers whose integrity tags are still
    /// accepted on read.
    #[serde(default)]
    pub integrity_previous_key_names: Option<String>,

    /// 64 hex chars of AES-256 key. **Required** for `local`.
    #[serde(default)]
    pub local_key_hex: Option<String>,

    /// Search-hash secret, inline.
    #[serde(default)]
    pub search_hash_secret: Option<String>,

    /// Secrets Manager ARN of the search-hash secret.
    #[serde(default)]
    pub search_hash_secret_arn: Option<String>,

    /// YAML file of record policies.
    #[serde(default)]
    pub policy_file: Option<String>,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// PEM certificate chain; serve HTTPS when set together with the key.
    #[serde(default)]
    pub tls_cert_path: Option<String>,

    #[serde(default)]
    pub tls_key_path: Option<String>,

    /// Deadline for each request's key-service calls.
    #[serde(default = "default_key_service_timeout_ms")]
    pub key_service_timeout_ms: u64,

    /// OTLP collector; spans are exported only when set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Credentials and secrets stay out of Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("key_service_backend", &self.key_service_backend)
            .field("key_service_addr", &self.key_service_addr)
            .field("key_name", &self.key_name)
            .field("search_hash_secret_arn", &self.search_hash_secret_arn)
            .field("policy_file", &self.policy_file)
            .field("listen_port", &self.listen_port)
            .field("tls", &self.tls_paths().is_some())
            .field("key_service_timeout_ms", &self.key_service_timeout_ms)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

fn default_listen_port() -> u16 {
    8080
}
fn default_key_service_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.key_name, "KEY_NAME")?;

        match self.key_service_backend {
            Backend::Transit => {
                ensure_present(&self.key_service_addr, "KEY_SERVICE_ADDR")?;
                ensure_present(&self.key_service_token, "KEY_SERVICE_TOKEN")?;
            }
            Backend::Local => ensure_present(&self.local_key_hex, "LOCAL_KEY_HEX")?,
            Backend::Kms => {}
        }

        match (&self.search_hash_secret, &self.search_hash_secret_arn) {
            (Some(_), Some(_)) => {
                anyhow::bail!("set only one of SEARCH_HASH_SECRET and SEARCH_HASH_SECRET_ARN")
            }
            (None, None) => {
                anyhow::bail!("one of SEARCH_HASH_SECRET or SEARCH_HASH_SECRET_ARN is required")
            }
            (Some(s), None) => ensure_non_empty(s, "SEARCH_HASH_SECRET")?,
            (None, Some(arn)) => ensure_non_empty(arn, "SEARCH_HASH_SECRET_ARN")?,
        }

        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            anyhow::bail!("TLS_CERT_PATH and TLS_KEY_PATH must be set together");
        }
        if self.key_service_timeout_ms == 0 {
            anyhow::bail!("KEY_SERVICE_TIMEOUT_MS must be > 0");
        }
        Ok(())
    }

    pub fn key_service_timeout(&self) -> Duration {
        Duration::from_millis(self.key_service_timeout_ms)
    }

    /// Previous integrity key identifiers, most recent first.
    pub fn previous_key_names(&self) -> Vec<&str> {
        self.integrity_previous_key_names
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// `(cert, key)` paths when HTTPS is configured.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        Some((self.tls_cert_path.as_deref()?, self.tls_key_path.as_deref()?))
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

fn ensure_present(value: &Option<String>, name: &str) -> Result<()> {
    ensure_non_empty(value.as_deref().unwrap_or_default(), name)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn local_config() -> Config {
        Config {
            key_service_backend: Backend::Local,
            key_service_addr: None,
            key_service_token: None,
            key_name: "pii-key".into(),
            integrity_previous_key_names: None,
            local_key_hex: Some("42".repeat(32)),
            search_hash_secret: Some("search-secret".into()),
            search_hash_secret_arn: None,
            policy_file: None,
            listen_port: default_listen_port(),
            tls_cert_path: None,
            tls_key_path: None,
            key_service_timeout_ms: default_key_service_timeout_ms(),
            otel_exporter_otlp_endpoint: None,
            log_level: default_log_level(),
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_listen_port(), 8080);
        assert_eq!(default_key_service_timeout_ms(), 5000);
        assert_eq!(default_log_level(), "info");
        assert_eq!(Backend::default(), Backend::Transit);
    }

    #[test]
    fn local_config_is_valid() {
        assert!(local_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_key_name() {
        let cfg = Config {
            key_name: " ".into(),
            ..local_config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn transit_requires_addr_and_token() {
        let cfg = Config {
            key_service_backend: Backend::Transit,
            key_service_addr: Some("https://vault:8200".into()),
            ..local_config()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            key_service_token: Some("s.token".into()),
            ..cfg
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn local_requires_key() {
        let cfg = Config {
            local_key_hex: None,
            ..local_config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn search_secret_exactly_one_source() {
        let both = Config {
            search_hash_secret_arn: Some("arn:aws:secretsmanager:x".into()),
            ..local_config()
        };
        assert!(both.validate().is_err());

        let neither = Config {
            search_hash_secret: None,
            ..local_config()
        };
        assert!(neither.validate().is_err());
    }

    #[test]
    fn tls_paths_must_be_paired() {
        let cfg = Config {
            tls_cert_path: Some("/etc/tls/cert.pem".into()),
            ..local_config()
        };
        assert!(cfg.validate().is_err());
        assert!(cfg.tls_paths().is_none());
    }

    #[test]
    fn previous_key_names_split_and_trimmed() {
        let cfg = Config {
            integrity_previous_key_names: Some(" old-2 , old-1,,".into()),
            ..local_config()
        };
        assert_eq!(cfg.previous_key_names(), vec!["old-2", "old-1"]);
        assert!(local_config().previous_key_names().is_empty());
    }

    #[test]
    fn debug_omits_secrets() {
        let s = format!("{:?}", local_config());
        assert!(!s.contains("search-secret"));
        assert!(!s.contains(&"42".repeat(32)));
    }
}
