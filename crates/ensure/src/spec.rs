//! Desired-state input for a single reconciliation.
//!
//! A [`ResourceSpec`] is built once per invocation (from CLI flags or a spec
//! file) and is never mutated while the engine runs.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Default wait timeout in seconds.
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 600;

/// NIC speeds accepted for bare metal hosts (Mbps).
pub const NIC_SPEEDS: [u32; 3] = [10, 100, 1000];

/// Disk layout ordered when none is given, in GB.
pub const DEFAULT_HOST_DISKS: [u32; 1] = [25];

/// Desired lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    /// The resource should exist.
    #[default]
    Present,
    /// The resource should not exist.
    Absent,
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// Resource kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Bare metal host.
    Host,
    /// SSH public key.
    SshKey,
    /// Portable subnet.
    Subnet,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::SshKey => write!(f, "ssh_key"),
            Self::Subnet => write!(f, "subnet"),
        }
    }
}

/// Subnet address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetType {
    /// Private (backend) network.
    Private,
    /// Public network.
    Public,
    /// Global IP, routable to any host in the account.
    Global,
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Public => write!(f, "public"),
            Self::Global => write!(f, "global"),
        }
    }
}

impl std::str::FromStr for SubnetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            "global" => Ok(Self::Global),
            other => Err(format!("unknown subnet type '{other}'")),
        }
    }
}

/// Bare metal host attributes.
///
/// Unset fields fall back to an hourly server with one 25 GB local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostParams {
    /// Hostname (identifying).
    pub hostname: Option<String>,
    /// Domain (identifying).
    pub domain: Option<String>,
    /// Datacenter short name, e.g. `dal10` (identifying).
    pub datacenter: Option<String>,
    /// Tags. Narrow absent searches; applied after creation.
    pub tags: Vec<String>,
    /// Processor core count.
    pub cpus: Option<u32>,
    /// Memory in GB.
    pub memory: Option<u32>,
    /// Disk capacities in GB.
    pub disks: Vec<u32>,
    /// Use local disks instead of SAN.
    pub local_disk: bool,
    /// Hourly billing.
    pub hourly: bool,
    /// Private network only.
    pub private: bool,
    /// Dedicated host.
    pub dedicated: bool,
    /// Operating system reference code.
    pub os_code: Option<String>,
    /// Image template global identifier.
    pub image_id: Option<String>,
    /// Max NIC speed in Mbps.
    pub nic_speed: Option<u32>,
    /// Public VLAN id.
    pub public_vlan: Option<u64>,
    /// Private VLAN id.
    pub private_vlan: Option<u64>,
    /// SSH key ids to install.
    pub ssh_keys: Vec<u64>,
    /// Post provisioning script URI.
    pub post_uri: Option<String>,
}

impl Default for HostParams {
    fn default() -> Self {
        Self {
            hostname: None,
            domain: None,
            datacenter: None,
            tags: Vec::new(),
            cpus: None,
            memory: None,
            disks: DEFAULT_HOST_DISKS.to_vec(),
            local_disk: true,
            hourly: true,
            private: false,
            dedicated: false,
            os_code: None,
            image_id: None,
            nic_speed: None,
            public_vlan: None,
            private_vlan: None,
            ssh_keys: Vec::new(),
            post_uri: None,
        }
    }
}

/// SSH key attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshKeyParams {
    /// Key label (identifying).
    #[serde(alias = "name")]
    pub label: Option<String>,
    /// Public key material.
    pub key: Option<String>,
}

/// Subnet attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubnetParams {
    /// VLAN the subnet is routed to (identifying).
    pub vlan_id: Option<u64>,
    /// Address space (identifying).
    pub subnet_type: Option<SubnetType>,
    /// IP version, 4 or 6 (identifying).
    pub version: u8,
    /// Number of addresses to order.
    pub quantity: Option<u32>,
}

impl Default for SubnetParams {
    fn default() -> Self {
        Self {
            vlan_id: None,
            subnet_type: None,
            version: 4,
            quantity: None,
        }
    }
}

/// Kind-specific attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceParams {
    /// Bare metal host.
    Host(HostParams),
    /// SSH key.
    SshKey(SshKeyParams),
    /// Subnet.
    Subnet(SubnetParams),
}

impl ResourceParams {
    /// The kind tag of these attributes.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Host(_) => ResourceKind::Host,
            Self::SshKey(_) => ResourceKind::SshKey,
            Self::Subnet(_) => ResourceKind::Subnet,
        }
    }

    /// Whether at least one identifying attribute was supplied.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        match self {
            Self::Host(h) => {
                is_set(h.hostname.as_deref())
                    || is_set(h.domain.as_deref())
                    || is_set(h.datacenter.as_deref())
                    || h.tags.iter().any(|t| !t.trim().is_empty())
            }
            Self::SshKey(k) => is_set(k.label.as_deref()),
            // version has a default, so it does not count on its own
            Self::Subnet(s) => s.vlan_id.is_some() || s.subnet_type.is_some(),
        }
    }
}

/// Full desired-state input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Explicit provider id. Sole target on the absent path.
    #[serde(default, alias = "instance_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Desired lifecycle state.
    #[serde(default)]
    pub state: DesiredState,
    /// Wait for readiness after creation.
    #[serde(default = "default_wait")]
    pub wait: bool,
    /// Wait timeout in seconds.
    #[serde(default = "default_wait_timeout", alias = "wait_time")]
    pub wait_timeout: u64,
    /// Kind-specific attributes.
    #[serde(flatten)]
    pub params: ResourceParams,
}

fn default_wait() -> bool {
    true
}

fn default_wait_timeout() -> u64 {
    DEFAULT_WAIT_TIMEOUT_SECS
}

fn is_set(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

impl ResourceSpec {
    /// Create a spec with default lifecycle settings.
    #[must_use]
    pub fn new(state: DesiredState, params: ResourceParams) -> Self {
        Self {
            id: None,
            state,
            wait: default_wait(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT_SECS,
            params,
        }
    }

    /// Set the explicit target id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Configure waiting.
    #[must_use]
    pub fn with_wait(mut self, wait: bool, timeout_secs: u64) -> Self {
        self.wait = wait;
        self.wait_timeout = timeout_secs;
        self
    }

    /// The kind tag.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.params.kind()
    }

    /// Wait timeout as a duration.
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout)
    }

    /// Explicit id, ignoring blank values.
    #[must_use]
    pub fn explicit_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Host attributes, if this is a host spec.
    #[must_use]
    pub fn host(&self) -> Option<&HostParams> {
        match &self.params {
            ResourceParams::Host(h) => Some(h),
            _ => None,
        }
    }

    /// SSH key attributes, if this is an ssh key spec.
    #[must_use]
    pub fn ssh_key(&self) -> Option<&SshKeyParams> {
        match &self.params {
            ResourceParams::SshKey(k) => Some(k),
            _ => None,
        }
    }

    /// Subnet attributes, if this is a subnet spec.
    #[must_use]
    pub fn subnet(&self) -> Option<&SubnetParams> {
        match &self.params {
            ResourceParams::Subnet(s) => Some(s),
            _ => None,
        }
    }

    /// Check for contradictory or out-of-range attributes.
    ///
    /// Independent of desired state and of what exists at the provider, so
    /// it runs before any provider call.
    ///
    /// # Errors
    /// Returns [`ProviderError::InvalidSpec`] describing the first problem.
    pub fn validate(&self) -> Result<(), ProviderError> {
        match &self.params {
            ResourceParams::Host(h) => check_host_values(h),
            ResourceParams::SshKey(_) => Ok(()),
            ResourceParams::Subnet(s) => check_subnet_values(s),
        }
    }

    /// Check the attributes needed to create the resource.
    ///
    /// Includes everything [`ResourceSpec::validate`] checks.
    ///
    /// # Errors
    /// Returns [`ProviderError::InvalidSpec`] describing the first problem.
    pub fn validate_for_create(&self) -> Result<(), ProviderError> {
        self.validate()?;
        match &self.params {
            ResourceParams::Host(h) => require_host(h),
            ResourceParams::SshKey(k) => require_ssh_key(k),
            ResourceParams::Subnet(s) => require_subnet(s),
        }
    }
}

fn invalid(msg: impl Into<String>) -> ProviderError {
    ProviderError::InvalidSpec(msg.into())
}

fn check_host_values(h: &HostParams) -> Result<(), ProviderError> {
    if is_set(h.os_code.as_deref()) && is_set(h.image_id.as_deref()) {
        return Err(invalid("os_code and image_id are mutually exclusive"));
    }
    if let Some(speed) = h.nic_speed {
        if !NIC_SPEEDS.contains(&speed) {
            return Err(invalid(format!(
                "nic_speed {speed} not in {NIC_SPEEDS:?}"
            )));
        }
    }
    if h.cpus == Some(0) {
        return Err(invalid("cpus must be greater than zero"));
    }
    if h.memory == Some(0) {
        return Err(invalid("memory must be greater than zero"));
    }
    if h.disks.contains(&0) {
        return Err(invalid("disk capacities must be greater than zero"));
    }
    Ok(())
}

fn require_host(h: &HostParams) -> Result<(), ProviderError> {
    for (name, value) in [
        ("hostname", &h.hostname),
        ("domain", &h.domain),
        ("datacenter", &h.datacenter),
    ] {
        if !is_set(value.as_deref()) {
            return Err(invalid(format!("{name} is required to create a host")));
        }
    }
    if !is_set(h.os_code.as_deref()) && !is_set(h.image_id.as_deref()) {
        return Err(invalid("one of os_code or image_id is required"));
    }
    Ok(())
}

fn require_ssh_key(k: &SshKeyParams) -> Result<(), ProviderError> {
    if !is_set(k.label.as_deref()) {
        return Err(invalid("label is required to add an ssh key"));
    }
    if !is_set(k.key.as_deref()) {
        return Err(invalid("key material is required to add an ssh key"));
    }
    Ok(())
}

fn check_subnet_values(s: &SubnetParams) -> Result<(), ProviderError> {
    if s.version != 4 && s.version != 6 {
        return Err(invalid(format!("ip version must be 4 or 6, got {}", s.version)));
    }
    Ok(())
}

fn require_subnet(s: &SubnetParams) -> Result<(), ProviderError> {
    let Some(subnet_type) = s.subnet_type else {
        return Err(invalid("subnet_type is required to order a subnet"));
    };
    if subnet_type != SubnetType::Global {
        if s.vlan_id.is_none() {
            return Err(invalid(format!("vlan_id is required for {subnet_type} subnets")));
        }
        if s.quantity.unwrap_or(0) == 0 {
            return Err(invalid(format!(
                "quantity is required for {subnet_type} subnets"
            )));
        }
    }
    Ok(())
}
