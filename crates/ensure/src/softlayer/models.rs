//! SoftLayer REST request and response models.
//!
//! SoftLayer serializes objects with camelCase property names and wraps
//! method arguments in a `parameters` array.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Common wrapper types
// ============================================================================

/// Method call body: `{"parameters": [...]}`.
#[derive(Debug, Serialize)]
pub struct Parameters<T> {
    /// Positional method arguments.
    pub parameters: T,
}

impl<T> Parameters<T> {
    /// Wrap arguments.
    pub fn new(parameters: T) -> Self {
        Self { parameters }
    }
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    /// Error message.
    pub error: String,
    /// Exception class, e.g. `SoftLayer_Exception_ObjectNotFound`.
    pub code: Option<String>,
}

/// Reference to an object by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdRef {
    /// Object id.
    pub id: u64,
}

/// Reference to an object by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameRef {
    /// Object name.
    pub name: String,
}

/// Billing item, the handle used for cancellation.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingItem {
    /// Billing item id.
    pub id: u64,
}

// ============================================================================
// Hardware
// ============================================================================

/// Bare metal server as returned by `getHardware` / `getObject`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareServer {
    /// Hardware id.
    pub id: u64,
    /// Hostname.
    pub hostname: Option<String>,
    /// Domain.
    pub domain: Option<String>,
    /// Fully qualified domain name.
    pub fully_qualified_domain_name: Option<String>,
    /// Public IP.
    pub primary_ip_address: Option<String>,
    /// Private IP.
    pub primary_backend_ip_address: Option<String>,
    /// Set once provisioning completed.
    pub provision_date: Option<DateTime<Utc>>,
    /// Running transaction, if any.
    pub active_transaction: Option<Transaction>,
    /// Hardware status.
    pub hardware_status: Option<HardwareStatus>,
    /// Datacenter.
    pub datacenter: Option<NameRef>,
    /// Tag references.
    #[serde(default)]
    pub tag_references: Vec<TagReference>,
}

impl HardwareServer {
    /// Provisioned and idle.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.provision_date.is_some() && self.active_transaction.is_none()
    }

    /// Tag names.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.tag_references
            .iter()
            .filter_map(|r| r.tag.as_ref().map(|t| t.name.clone()))
            .collect()
    }
}

/// Hardware status.
#[derive(Debug, Clone, Deserialize)]
pub struct HardwareStatus {
    /// Status name, e.g. `ACTIVE`.
    pub status: String,
}

/// Provisioning transaction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction id.
    pub id: u64,
    /// Status.
    pub transaction_status: Option<NameRef>,
}

/// Tag reference.
#[derive(Debug, Clone, Deserialize)]
pub struct TagReference {
    /// Referenced tag.
    pub tag: Option<NameRef>,
}

/// `SoftLayer_Hardware_Server` template for `createObject`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareTemplate {
    /// Hostname.
    pub hostname: String,
    /// Domain.
    pub domain: String,
    /// Processor cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_core_amount: Option<u32>,
    /// Memory in GB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_capacity: Option<u32>,
    /// Hourly billing.
    pub hourly_billing_flag: bool,
    /// Local disks.
    pub local_disk_flag: bool,
    /// Dedicated host.
    pub dedicated_account_host_only_flag: bool,
    /// Private network only.
    pub private_network_only_flag: bool,
    /// Operating system reference code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_system_reference_code: Option<String>,
    /// Image template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_device_template_group: Option<TemplateGroupRef>,
    /// Datacenter.
    pub datacenter: NameRef,
    /// Network components (NIC speed).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub network_components: Vec<NetworkComponent>,
    /// Public VLAN placement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_network_component: Option<VlanPlacement>,
    /// Private VLAN placement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_backend_network_component: Option<VlanPlacement>,
    /// Disks.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hard_drives: Vec<HardDrive>,
    /// SSH keys.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<IdRef>,
    /// Post install script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_install_script_uri: Option<String>,
}

/// Image template reference.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateGroupRef {
    /// Image global identifier.
    pub global_identifier: String,
}

/// Network component speed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkComponent {
    /// Max speed in Mbps.
    pub max_speed: u32,
}

/// VLAN placement for a network component.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VlanPlacement {
    /// VLAN.
    pub network_vlan: IdRef,
}

/// Disk capacity.
#[derive(Debug, Clone, Serialize)]
pub struct HardDrive {
    /// Capacity in GB.
    pub capacity: u32,
}

/// Identifying attributes for a hardware search.
#[derive(Debug, Clone, Default)]
pub struct HardwareFilter {
    /// Hostname.
    pub hostname: Option<String>,
    /// Domain.
    pub domain: Option<String>,
    /// Datacenter short name.
    pub datacenter: Option<String>,
    /// Any of these tags.
    pub tags: Vec<String>,
}

// ============================================================================
// SSH keys
// ============================================================================

/// `SoftLayer_Security_Ssh_Key`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKey {
    /// Key id.
    pub id: u64,
    /// Label.
    pub label: Option<String>,
    /// Public key material.
    pub key: Option<String>,
    /// Fingerprint.
    pub fingerprint: Option<String>,
    /// Creation time.
    pub create_date: Option<DateTime<Utc>>,
}

/// Template for creating an ssh key.
#[derive(Debug, Clone, Serialize)]
pub struct SshKeyTemplate {
    /// Label.
    pub label: String,
    /// Public key material.
    pub key: String,
}

// ============================================================================
// Subnets and orders
// ============================================================================

/// `SoftLayer_Network_Subnet`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    /// Subnet id.
    pub id: u64,
    /// Network address.
    pub network_identifier: Option<String>,
    /// Prefix length.
    pub cidr: Option<u32>,
    /// e.g. `SECONDARY_ON_VLAN`, `GLOBAL_IP`, `PRIMARY`.
    pub subnet_type: Option<String>,
    /// IP version.
    pub version: Option<u8>,
    /// `PRIVATE` or `PUBLIC`.
    pub address_space: Option<String>,
    /// VLAN id.
    pub network_vlan_id: Option<u64>,
    /// Address count.
    pub total_ip_addresses: Option<u64>,
}

impl Subnet {
    /// Primary subnets come with their VLAN and cannot be ordered or cancelled.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        matches!(self.subnet_type.as_deref(), Some("PRIMARY" | "PRIMARY_6"))
    }

    /// Global IP subnet.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.subnet_type
            .as_deref()
            .is_some_and(|t| t.starts_with("GLOBAL_IP"))
    }
}

/// Identifying attributes for a subnet search.
#[derive(Debug, Clone, Default)]
pub struct SubnetFilter {
    /// VLAN id.
    pub vlan_id: Option<u64>,
    /// IP version.
    pub version: Option<u8>,
}

/// Product package item.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageItem {
    /// Item id.
    pub id: u64,
    /// Capacity (address count for subnets).
    pub capacity: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Prices.
    #[serde(default)]
    pub prices: Vec<ItemPrice>,
}

impl PackageItem {
    /// Capacity as an integer.
    #[must_use]
    pub fn capacity(&self) -> Option<u32> {
        self.capacity
            .as_deref()
            .and_then(|c| c.split('.').next())
            .and_then(|c| c.parse().ok())
    }
}

/// Item price.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemPrice {
    /// Price id.
    pub id: u64,
    /// Categories.
    #[serde(default)]
    pub categories: Vec<ItemCategory>,
}

/// Item category.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCategory {
    /// Category code.
    pub category_code: String,
}

/// `SoftLayer_Container_Product_Order_Network_Subnet`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetOrder {
    /// Container type.
    pub complex_type: String,
    /// Package id (0 for subnets).
    pub package_id: u64,
    /// Prices.
    pub prices: Vec<IdRef>,
    /// Order quantity.
    pub quantity: u32,
    /// Target VLAN; absent for global subnets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_point_vlan_id: Option<u64>,
}

impl SubnetOrder {
    /// Order one subnet at `price_id`.
    #[must_use]
    pub fn new(price_id: u64, vlan_id: Option<u64>) -> Self {
        Self {
            complex_type: "SoftLayer_Container_Product_Order_Network_Subnet".to_string(),
            package_id: 0,
            prices: vec![IdRef { id: price_id }],
            quantity: 1,
            end_point_vlan_id: vlan_id,
        }
    }
}

/// Receipt from `placeOrder`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    /// Order id.
    pub order_id: u64,
    /// Placed order details.
    pub placed_order: Option<PlacedOrder>,
}

/// Placed order.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacedOrder {
    /// Order id.
    pub id: u64,
    /// Order status, e.g. `PENDING_AUTO_APPROVAL`.
    pub status: Option<String>,
}
