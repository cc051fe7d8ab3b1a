//! Capability traits over the SoftLayer API.
//!
//! Adapters depend on these rather than on [`SoftLayerClient`] so that tests
//! can substitute in-memory fakes.
//!
//! [`SoftLayerClient`]: super::SoftLayerClient

use async_trait::async_trait;

use super::models::{
    HardwareFilter, HardwareServer, HardwareTemplate, OrderReceipt, SshKey, Subnet, SubnetFilter,
    SubnetOrder,
};
use crate::error::ProviderError;

/// Bare metal hardware operations.
#[async_trait]
pub trait HardwareApi: Send + Sync {
    /// List hardware matching the filter.
    async fn list_hardware(&self, filter: &HardwareFilter) -> Result<Vec<HardwareServer>, ProviderError>;

    /// Get hardware by id.
    async fn get_hardware(&self, id: u64) -> Result<HardwareServer, ProviderError>;

    /// Order a server.
    async fn create_hardware(&self, template: &HardwareTemplate) -> Result<HardwareServer, ProviderError>;

    /// Replace the tags on a server.
    async fn set_hardware_tags(&self, id: u64, tags: &[String]) -> Result<(), ProviderError>;

    /// Cancel a server through its billing item.
    async fn cancel_hardware(&self, id: u64) -> Result<(), ProviderError>;
}

/// SSH key operations.
#[async_trait]
pub trait SshKeyApi: Send + Sync {
    /// List keys with this label.
    async fn list_ssh_keys(&self, label: &str) -> Result<Vec<SshKey>, ProviderError>;

    /// Get a key by id.
    async fn get_ssh_key(&self, id: u64) -> Result<SshKey, ProviderError>;

    /// Add a key.
    async fn create_ssh_key(&self, label: &str, key: &str) -> Result<SshKey, ProviderError>;

    /// Delete a key.
    async fn delete_ssh_key(&self, id: u64) -> Result<(), ProviderError>;
}

/// Subnet and order operations.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// List account subnets matching the filter.
    async fn list_subnets(&self, filter: &SubnetFilter) -> Result<Vec<Subnet>, ProviderError>;

    /// Get a subnet by id.
    async fn get_subnet(&self, id: u64) -> Result<Subnet, ProviderError>;

    /// Price id for a subnet of `quantity` addresses in `category`.
    async fn subnet_price_id(&self, category: &str, quantity: Option<u32>) -> Result<u64, ProviderError>;

    /// Check an order without placing it.
    async fn verify_subnet_order(&self, order: &SubnetOrder) -> Result<(), ProviderError>;

    /// Place an order.
    async fn place_subnet_order(&self, order: &SubnetOrder) -> Result<OrderReceipt, ProviderError>;

    /// Cancel a subnet through its billing item.
    async fn cancel_subnet(&self, id: u64) -> Result<(), ProviderError>;
}
