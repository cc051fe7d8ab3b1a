//! Bare metal host provider.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{parse_id, MatchSet, Readiness, ResourceHandle, ResourceProvider};
use crate::error::ProviderError;
use crate::softlayer::models::{
    HardDrive, HardwareFilter, HardwareServer, HardwareTemplate, IdRef, NameRef, NetworkComponent,
    TemplateGroupRef, VlanPlacement,
};
use crate::softlayer::HardwareApi;
use crate::spec::{DesiredState, HostParams, ResourceKind, ResourceSpec};

/// Orders, finds and cancels bare metal servers.
pub struct HostProvider {
    api: Arc<dyn HardwareApi>,
}

impl HostProvider {
    /// Create a provider over the hardware API.
    pub fn new(api: Arc<dyn HardwareApi>) -> Self {
        Self { api }
    }

    fn params(spec: &ResourceSpec) -> Result<&HostParams, ProviderError> {
        spec.host()
            .ok_or_else(|| ProviderError::InvalidSpec(format!("{} spec is not a host", spec.kind())))
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

/// Identifying filter for a spec. Tags only narrow removal searches.
fn filter_for(spec: &ResourceSpec, params: &HostParams) -> HardwareFilter {
    let tags = if spec.state == DesiredState::Absent {
        params
            .tags
            .iter()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    HardwareFilter {
        hostname: non_blank(params.hostname.as_ref()),
        domain: non_blank(params.domain.as_ref()),
        datacenter: non_blank(params.datacenter.as_ref()),
        tags,
    }
}

fn is_empty(filter: &HardwareFilter) -> bool {
    filter.hostname.is_none()
        && filter.domain.is_none()
        && filter.datacenter.is_none()
        && filter.tags.is_empty()
}

fn matches(filter: &HardwareFilter, server: &HardwareServer) -> bool {
    let same = |want: &Option<String>, have: Option<&str>| {
        want.as_deref().map_or(true, |w| have == Some(w))
    };
    let server_tags = server.tags();
    same(&filter.hostname, server.hostname.as_deref())
        && same(&filter.domain, server.domain.as_deref())
        && same(
            &filter.datacenter,
            server.datacenter.as_ref().map(|d| d.name.as_str()),
        )
        && (filter.tags.is_empty() || filter.tags.iter().any(|t| server_tags.contains(t)))
}

/// Build the order template. Image installs carry their own disk layout.
pub(crate) fn template_for(params: &HostParams) -> HardwareTemplate {
    let image_id = non_blank(params.image_id.as_ref());
    let hard_drives = if image_id.is_some() {
        Vec::new()
    } else {
        params
            .disks
            .iter()
            .map(|&capacity| HardDrive { capacity })
            .collect()
    };

    HardwareTemplate {
        hostname: params.hostname.clone().unwrap_or_default(),
        domain: params.domain.clone().unwrap_or_default(),
        processor_core_amount: params.cpus,
        memory_capacity: params.memory,
        hourly_billing_flag: params.hourly,
        local_disk_flag: params.local_disk,
        dedicated_account_host_only_flag: params.dedicated,
        private_network_only_flag: params.private,
        operating_system_reference_code: non_blank(params.os_code.as_ref()),
        block_device_template_group: image_id
            .map(|global_identifier| TemplateGroupRef { global_identifier }),
        datacenter: NameRef {
            name: params.datacenter.clone().unwrap_or_default(),
        },
        network_components: params
            .nic_speed
            .map(|max_speed| vec![NetworkComponent { max_speed }])
            .unwrap_or_default(),
        primary_network_component: params.public_vlan.map(|id| VlanPlacement {
            network_vlan: IdRef { id },
        }),
        primary_backend_network_component: params.private_vlan.map(|id| VlanPlacement {
            network_vlan: IdRef { id },
        }),
        hard_drives,
        ssh_keys: params.ssh_keys.iter().map(|&id| IdRef { id }).collect(),
        post_install_script_uri: non_blank(params.post_uri.as_ref()),
    }
}

/// Convert a server into the engine's handle.
pub(crate) fn to_handle(server: &HardwareServer) -> ResourceHandle {
    let mut handle = ResourceHandle::new(server.id.to_string());
    if let Some(status) = &server.hardware_status {
        handle = handle.with_status(status.status.clone());
    }
    let optional = [
        ("hostname", &server.hostname),
        ("domain", &server.domain),
        ("fqdn", &server.fully_qualified_domain_name),
        ("primary_ip", &server.primary_ip_address),
        ("backend_ip", &server.primary_backend_ip_address),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            handle = handle.with_attr(key, value.clone());
        }
    }
    if let Some(dc) = &server.datacenter {
        handle = handle.with_attr("datacenter", dc.name.clone());
    }
    if let Some(date) = server.provision_date {
        handle = handle.with_attr("provision_date", date.to_rfc3339());
    }
    handle
        .with_attr("tags", server.tags())
        .with_attr("ready", server.is_ready())
}

#[async_trait]
impl ResourceProvider for HostProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Host
    }

    async fn find(&self, spec: &ResourceSpec) -> Result<MatchSet, ProviderError> {
        let params = Self::params(spec)?;
        let filter = filter_for(spec, params);
        if is_empty(&filter) {
            debug!("No identifying host attributes, nothing to match");
            return Ok(MatchSet::empty());
        }

        let servers = self.api.list_hardware(&filter).await?;
        let found: MatchSet = servers
            .iter()
            .filter(|s| matches(&filter, s))
            .map(to_handle)
            .collect();
        debug!(count = found.len(), "Matched hosts");
        Ok(found)
    }

    async fn get(&self, id: &str) -> Result<ResourceHandle, ProviderError> {
        let server = self.api.get_hardware(parse_id(id)?).await?;
        Ok(to_handle(&server))
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceHandle, ProviderError> {
        let params = Self::params(spec)?;
        let server = self.api.create_hardware(&template_for(params)).await?;
        let mut handle = to_handle(&server);

        let tags: Vec<String> = params
            .tags
            .iter()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect();
        if !tags.is_empty() {
            match self.api.set_hardware_tags(server.id, &tags).await {
                Ok(()) => handle = handle.with_attr("tags", tags),
                Err(e) => {
                    warn!(hardware_id = server.id, error = %e, "Failed to tag new host");
                    handle = handle.with_attr("tagging_error", e.to_string());
                }
            }
        }

        info!(hardware_id = server.id, "Host ordered");
        Ok(handle)
    }

    async fn destroy(&self, handle: &ResourceHandle) -> Result<(), ProviderError> {
        self.api.cancel_hardware(parse_id(&handle.id)?).await
    }

    fn readiness(&self) -> Option<&dyn Readiness> {
        Some(self)
    }
}

#[async_trait]
impl Readiness for HostProvider {
    async fn is_ready(&self, handle: &ResourceHandle) -> Result<bool, ProviderError> {
        let server = self.api.get_hardware(parse_id(&handle.id)?).await?;
        debug!(
            hardware_id = server.id,
            provisioned = server.provision_date.is_some(),
            busy = server.active_transaction.is_some(),
            "Readiness check"
        );
        Ok(server.is_ready())
    }
}
