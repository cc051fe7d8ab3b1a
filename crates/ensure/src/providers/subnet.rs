//! Subnet provider.
//!
//! Subnets are ordered through the product order service and cancelled
//! through their billing item. Primary subnets belong to their VLAN and are
//! never matched.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{parse_id, MatchSet, ResourceHandle, ResourceProvider};
use crate::error::ProviderError;
use crate::softlayer::models::{Subnet, SubnetFilter, SubnetOrder};
use crate::softlayer::NetworkApi;
use crate::spec::{ResourceKind, ResourceSpec, SubnetParams, SubnetType};

/// Status reported for a subnet whose order was just placed.
pub const PENDING_STATUS: &str = "PENDING";

/// Orders, finds and cancels secondary and global subnets.
pub struct SubnetProvider {
    api: Arc<dyn NetworkApi>,
}

impl SubnetProvider {
    /// Create a provider over the network API.
    pub fn new(api: Arc<dyn NetworkApi>) -> Self {
        Self { api }
    }

    fn params(spec: &ResourceSpec) -> Result<&SubnetParams, ProviderError> {
        spec.subnet()
            .ok_or_else(|| ProviderError::InvalidSpec(format!("{} spec is not a subnet", spec.kind())))
    }
}

/// Package item category for a subnet type and ip version.
#[must_use]
pub fn category_code(subnet_type: SubnetType, version: u8) -> &'static str {
    match (version, subnet_type) {
        (6, SubnetType::Global) => "global_ipv6",
        (6, _) => "static_ipv6_addresses",
        (_, SubnetType::Global) => "global_ipv4",
        (_, SubnetType::Public) => "sov_sec_ip_addresses_pub",
        (_, SubnetType::Private) => "sov_sec_ip_addresses_priv",
    }
}

fn is_type(subnet: &Subnet, wanted: SubnetType) -> bool {
    let space = subnet.address_space.as_deref().unwrap_or_default();
    match wanted {
        SubnetType::Global => subnet.is_global(),
        SubnetType::Public => !subnet.is_global() && space.eq_ignore_ascii_case("PUBLIC"),
        SubnetType::Private => !subnet.is_global() && space.eq_ignore_ascii_case("PRIVATE"),
    }
}

fn matches(params: &SubnetParams, subnet: &Subnet) -> bool {
    if subnet.is_primary() {
        return false;
    }
    if params.vlan_id.is_some() && subnet.network_vlan_id != params.vlan_id {
        return false;
    }
    if subnet.version.is_some_and(|v| v != params.version) {
        return false;
    }
    // quantity is sizing, not identity
    params.subnet_type.map_or(true, |wanted| is_type(subnet, wanted))
}

fn to_handle(subnet: &Subnet) -> ResourceHandle {
    let mut handle = ResourceHandle::new(subnet.id.to_string());
    if let Some(kind) = &subnet.subnet_type {
        handle = handle.with_status(kind.clone());
    }
    if let (Some(net), Some(cidr)) = (&subnet.network_identifier, subnet.cidr) {
        handle = handle.with_attr("network", format!("{net}/{cidr}"));
    }
    if let Some(space) = &subnet.address_space {
        handle = handle.with_attr("address_space", space.clone());
    }
    if let Some(version) = subnet.version {
        handle = handle.with_attr("version", version);
    }
    if let Some(vlan_id) = subnet.network_vlan_id {
        handle = handle.with_attr("vlan_id", vlan_id);
    }
    if let Some(total) = subnet.total_ip_addresses {
        handle = handle.with_attr("total_ip_addresses", total);
    }
    handle
}

#[async_trait]
impl ResourceProvider for SubnetProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Subnet
    }

    async fn find(&self, spec: &ResourceSpec) -> Result<MatchSet, ProviderError> {
        let params = Self::params(spec)?;
        if params.vlan_id.is_none() && params.subnet_type.is_none() {
            return Ok(MatchSet::empty());
        }

        let filter = SubnetFilter {
            vlan_id: params.vlan_id,
            version: Some(params.version),
        };
        let subnets = self.api.list_subnets(&filter).await?;
        let found: MatchSet = subnets
            .iter()
            .filter(|s| matches(params, s))
            .map(to_handle)
            .collect();
        debug!(vlan_id = ?params.vlan_id, count = found.len(), "Matched subnets");
        Ok(found)
    }

    async fn get(&self, id: &str) -> Result<ResourceHandle, ProviderError> {
        let subnet = self.api.get_subnet(parse_id(id)?).await?;
        Ok(to_handle(&subnet))
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceHandle, ProviderError> {
        let params = Self::params(spec)?;
        let subnet_type = params.subnet_type.ok_or_else(|| {
            ProviderError::InvalidSpec("subnet_type is required to order a subnet".into())
        })?;
        let global = subnet_type == SubnetType::Global;
        let category = category_code(subnet_type, params.version);

        let quantity = if global { None } else { params.quantity };
        let vlan_id = if global { None } else { params.vlan_id };
        let price_id = self.api.subnet_price_id(category, quantity).await?;
        let order = SubnetOrder::new(price_id, vlan_id);

        self.api.verify_subnet_order(&order).await?;
        let receipt = self.api.place_subnet_order(&order).await?;
        info!(order_id = receipt.order_id, category = %category, "Subnet order placed");

        let mut handle = ResourceHandle::new(receipt.order_id.to_string())
            .with_status(PENDING_STATUS)
            .with_attr("order_id", receipt.order_id)
            .with_attr("category", category)
            .with_attr("subnet_type", subnet_type.to_string())
            .with_attr("version", params.version);
        if let Some(vlan_id) = vlan_id {
            handle = handle.with_attr("vlan_id", vlan_id);
        }
        if let Some(quantity) = quantity {
            handle = handle.with_attr("quantity", quantity);
        }
        if let Some(status) = receipt.placed_order.and_then(|o| o.status) {
            handle = handle.with_attr("order_status", status);
        }
        Ok(handle)
    }

    async fn destroy(&self, handle: &ResourceHandle) -> Result<(), ProviderError> {
        self.api.cancel_subnet(parse_id(&handle.id)?).await
    }
}
