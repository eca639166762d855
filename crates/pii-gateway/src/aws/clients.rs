//! AWS SDK client bundle.

use anyhow::Result;
use aws_config::BehaviorVersion;

/// KMS and Secrets Manager clients sharing one [`aws_config::SdkConfig`] so
/// that credentials are resolved once and reused.
#[derive(Clone, Debug)]
pub struct AwsClients {
    /// KMS client backing the `kms` key service.
    pub kms: aws_sdk_kms::Client,
    /// Secrets Manager client used to fetch the search-hash secret.
    pub secretsmanager: aws_sdk_secretsmanager::Client,
}

impl AwsClients {
    /// Initialise both clients from the standard AWS credential chain.
    ///
    /// `kms_endpoint` overrides the KMS endpoint URL, e.g. for a VPC
    /// endpoint or a local emulator.
    ///
    /// # Errors
    ///
    /// Returns an error if the SDK config cannot be loaded.
    pub async fn init(kms_endpoint: Option<&str>) -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let mut kms_config = aws_sdk_kms::config::Builder::from(&config);
        if let Some(endpoint) = kms_endpoint {
            kms_config = kms_config.endpoint_url(endpoint);
        }
        let kms = aws_sdk_kms::Client::from_conf(kms_config.build());
        let secretsmanager = aws_sdk_secretsmanager::Client::new(&config);

        Ok(Self {
            kms,
            secretsmanager,
        })
    }
}
