//! SSH key provider.
//!
//! Keys are identified by label. A key whose material differs from the spec
//! is stale and gets replaced.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{parse_id, MatchPolicy, MatchSet, ResourceHandle, ResourceProvider};
use crate::error::ProviderError;
use crate::softlayer::models::SshKey;
use crate::softlayer::SshKeyApi;
use crate::spec::{ResourceKind, ResourceSpec, SshKeyParams};

/// Adds, replaces and deletes account ssh keys.
pub struct SshKeyProvider {
    api: Arc<dyn SshKeyApi>,
}

impl SshKeyProvider {
    /// Create a provider over the ssh key API.
    pub fn new(api: Arc<dyn SshKeyApi>) -> Self {
        Self { api }
    }

    fn params(spec: &ResourceSpec) -> Result<&SshKeyParams, ProviderError> {
        spec.ssh_key().ok_or_else(|| {
            ProviderError::InvalidSpec(format!("{} spec is not an ssh key", spec.kind()))
        })
    }
}

/// Key type and body, without the trailing comment.
fn key_material(key: &str) -> Vec<&str> {
    key.split_whitespace().take(2).collect()
}

fn to_handle(key: &SshKey) -> ResourceHandle {
    let mut handle = ResourceHandle::new(key.id.to_string());
    for (name, value) in [
        ("label", &key.label),
        ("key", &key.key),
        ("fingerprint", &key.fingerprint),
    ] {
        if let Some(value) = value {
            handle = handle.with_attr(name, value.clone());
        }
    }
    if let Some(date) = key.create_date {
        handle = handle.with_attr("create_date", date.to_rfc3339());
    }
    handle
}

#[async_trait]
impl ResourceProvider for SshKeyProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SshKey
    }

    async fn find(&self, spec: &ResourceSpec) -> Result<MatchSet, ProviderError> {
        let Some(label) = Self::params(spec)?
            .label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
        else {
            return Ok(MatchSet::empty());
        };

        let keys = self.api.list_ssh_keys(label).await?;
        let found: MatchSet = keys
            .iter()
            .filter(|k| k.label.as_deref() == Some(label))
            .map(to_handle)
            .collect();
        debug!(label = %label, count = found.len(), "Matched ssh keys");
        Ok(found)
    }

    async fn get(&self, id: &str) -> Result<ResourceHandle, ProviderError> {
        let key = self.api.get_ssh_key(parse_id(id)?).await?;
        Ok(to_handle(&key))
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceHandle, ProviderError> {
        let params = Self::params(spec)?;
        let label = params.label.as_deref().unwrap_or_default();
        let key = params.key.as_deref().unwrap_or_default();
        let created = self.api.create_ssh_key(label, key.trim()).await?;
        Ok(to_handle(&created))
    }

    async fn destroy(&self, handle: &ResourceHandle) -> Result<(), ProviderError> {
        self.api.delete_ssh_key(parse_id(&handle.id)?).await
    }

    fn match_policy(&self) -> MatchPolicy {
        MatchPolicy::Unique
    }

    fn is_current(&self, spec: &ResourceSpec, handle: &ResourceHandle) -> bool {
        let Some(wanted) = spec.ssh_key().and_then(|k| k.key.as_deref()) else {
            return true;
        };
        let existing = handle.attr_str("key").unwrap_or_default();
        key_material(wanted) == key_material(existing)
    }
}
