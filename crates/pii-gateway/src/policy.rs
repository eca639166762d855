//! Record-policy registry loaded from YAML.
//!
//! ```yaml
//! policies:
//!   - name: user
//!     fields:
//!       - path: email
//!         context: "user:email"
//!         searchable: true
//!       - path: addresses[].street
//!         context: "user:address"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fieldcrypt::RecordPolicy;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policies: Vec<RecordPolicy>,
}

/// Immutable set of record policies keyed by name.
#[derive(Clone, Debug, Default)]
pub struct PolicyRegistry {
    policies: Arc<HashMap<String, RecordPolicy>>,
}

impl PolicyRegistry {
    /// Parse and validate policies from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed YAML, an invalid field path, or a
    /// duplicated policy name.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: PolicyFile = serde_yaml::from_str(yaml).context("failed to parse policy YAML")?;
        let mut policies = HashMap::with_capacity(file.policies.len());
        for policy in file.policies {
            policy
                .validate()
                .with_context(|| format!("invalid policy {:?}", policy.name))?;
            let name = policy.name.clone();
            if policies.insert(name.clone(), policy).is_some() {
                anyhow::bail!("policy {name:?} defined twice");
            }
        }
        Ok(Self {
            policies: Arc::new(policies),
        })
    }

    /// Read and parse the policy file at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read policy file {}", path.display()))?;
        let registry = Self::from_yaml(&yaml)?;
        info!(policies = registry.len(), path = %path.display(), "record policies loaded");
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&RecordPolicy> {
        self.policies.get(name)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
