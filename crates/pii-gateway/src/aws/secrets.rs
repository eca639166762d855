//! Search-hash secret bootstrap.
//!
//! # Security invariants
//!
//! - The secret is **never** written to disk, logged, or included in traces.
//! - It lives only in a [`SecretBytes`], zeroed on drop.

use anyhow::{Context, Result};
use fieldcrypt::SecretBytes;
use tracing::info;

use super::AwsClients;
use crate::config::Config;

/// Resolve the search-hash secret from inline config or Secrets Manager.
///
/// # Errors
///
/// Returns an error if neither source is configured, if the Secrets Manager
/// call fails, or if the stored secret is empty.
pub async fn load_search_secret(cfg: &Config, aws: Option<&AwsClients>) -> Result<SecretBytes> {
    if let Some(inline) = &cfg.search_hash_secret {
        return Ok(SecretBytes::from_slice(inline.as_bytes()));
    }
    let arn = cfg
        .search_hash_secret_arn
        .as_deref()
        .context("no search hash secret configured")?;
    let aws = aws.context("AWS clients are required to fetch SEARCH_HASH_SECRET_ARN")?;
    fetch_search_secret(aws, arn).await
}

/// Fetch the secret value stored at `arn`, as a string or binary secret.
async fn fetch_search_secret(aws: &AwsClients, arn: &str) -> Result<SecretBytes> {
    let secret = aws
        .secretsmanager
        .get_secret_value()
        .secret_id(arn)
        .send()
        .await
        .context("failed to fetch search hash secret from Secrets Manager")?;

    let bytes = match (secret.secret_string(), secret.secret_binary()) {
        (Some(s), _) => SecretBytes::from_slice(s.as_bytes()),
        (None, Some(b)) => SecretBytes::from_slice(b.as_ref()),
        (None, None) => anyhow::bail!("search hash secret has no value"),
    };
    if bytes.is_empty() {
        anyhow::bail!("search hash secret is empty");
    }

    info!("search hash secret fetched");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::local_config;

    #[tokio::test]
    async fn inline_secret_needs_no_aws() {
        let secret = load_search_secret(&local_config(), None).await.unwrap();
        assert_eq!(secret.expose(), b"search-secret");
    }

    #[tokio::test]
    async fn arn_without_clients_fails() {
        let cfg = Config {
            search_hash_secret: None,
            search_hash_secret_arn: Some("arn:aws:secretsmanager:eu-west-1:1:secret:s".into()),
            ..local_config()
        };
        assert!(load_search_secret(&cfg, None).await.is_err());
    }
}
