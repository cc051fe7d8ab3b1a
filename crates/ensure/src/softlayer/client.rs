//! SoftLayer REST client implementation.
//!
//! API Documentation: <https://sldn.softlayer.com/article/rest/>

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::api::{HardwareApi, NetworkApi, SshKeyApi};
use super::models::{
    ApiError, BillingItem, HardwareFilter, HardwareServer, HardwareTemplate, OrderReceipt,
    PackageItem, Parameters, SshKey, SshKeyTemplate, Subnet, SubnetFilter, SubnetOrder,
};
use crate::config::{ClientConfig, ConfigError};
use crate::error::ProviderError;

/// Object mask for hardware lookups.
const HARDWARE_MASK: &str = "mask[id,hostname,domain,fullyQualifiedDomainName,\
primaryIpAddress,primaryBackendIpAddress,provisionDate,activeTransaction[id,transactionStatus[name]],\
hardwareStatus[status],datacenter[name],tagReferences[tag[name]]]";

/// Object mask for ssh key lookups.
const SSH_KEY_MASK: &str = "mask[id,label,key,fingerprint,createDate]";

/// Object mask for subnet lookups.
const SUBNET_MASK: &str = "mask[id,networkIdentifier,cidr,subnetType,version,addressSpace,\
networkVlanId,totalIpAddresses]";

/// Object mask for package item lookups.
const ITEM_MASK: &str = "mask[id,capacity,description,prices[id,categories[categoryCode]]]";

/// Subnets are ordered from the generic package.
const SUBNET_PACKAGE_ID: u64 = 0;

/// SoftLayer REST API client.
#[derive(Clone)]
pub struct SoftLayerClient {
    /// HTTP client.
    client: Client,
    /// Connection settings.
    config: ClientConfig,
}

impl SoftLayerClient {
    /// Create a new client.
    ///
    /// This is the capability check: it fails when credentials are missing
    /// or the endpoint is malformed.
    ///
    /// # Errors
    /// Returns error if the config is invalid or the HTTP client cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = Client::builder().timeout(config.request_timeout).build()?;
        debug!(endpoint = %config.base_url(), "SoftLayer client ready");
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url())
    }

    /// Make an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = self.url(path);
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.api_key))
            .query(query)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated POST request.
    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ProviderError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        let url = self.url(path);
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.api_key))
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated DELETE request.
    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        let url = self.url(path);
        debug!(url = %url, "DELETE request");

        let response = self
            .client
            .delete(&url)
            .basic_auth(&self.config.username, Some(&self.config.api_key))
            .send()
            .await?;

        let _: Value = Self::handle_response(response).await?;
        Ok(())
    }

    /// Handle API response, parsing JSON or mapping the SoftLayer exception.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            // some methods answer with an empty body instead of null
            let body = if text.trim().is_empty() {
                "null"
            } else {
                text.as_str()
            };
            return serde_json::from_str(body).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                ProviderError::Serialization(e)
            });
        }

        Err(Self::map_error(status, &text))
    }

    fn map_error(status: StatusCode, text: &str) -> ProviderError {
        let (message, code) = match serde_json::from_str::<ApiError>(text) {
            Ok(err) => (err.error, err.code.unwrap_or_default()),
            Err(_) => (text.to_string(), String::new()),
        };

        if status == StatusCode::NOT_FOUND || code == "SoftLayer_Exception_ObjectNotFound" {
            ProviderError::NotFound(message)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // auth failures share SoftLayer_Exception_Public with user errors
            ProviderError::Api {
                status: status.as_u16(),
                message,
            }
        } else if status == StatusCode::BAD_REQUEST
            || code.starts_with("SoftLayer_Exception_Order")
            || code == "SoftLayer_Exception_Public"
        {
            ProviderError::Validation(message)
        } else {
            ProviderError::Api {
                status: status.as_u16(),
                message: if code.is_empty() {
                    message
                } else {
                    format!("{code}: {message}")
                },
            }
        }
    }

    /// Look up the billing item of an object; `None` means nothing left to cancel.
    async fn billing_item(&self, service: &str, id: u64) -> Result<BillingItem, ProviderError> {
        let item: Option<BillingItem> = self
            .get(&format!("{service}/{id}/getBillingItem.json"), &[])
            .await?;
        item.ok_or_else(|| ProviderError::NotFound(format!("{service} {id} has no billing item")))
    }

    async fn cancel_billing_item(&self, item: &BillingItem) -> Result<(), ProviderError> {
        let accepted: bool = self
            .get(&format!("SoftLayer_Billing_Item/{}/cancelService.json", item.id), &[])
            .await?;
        if accepted {
            Ok(())
        } else {
            Err(ProviderError::Api {
                status: 200,
                message: format!("cancellation of billing item {} was refused", item.id),
            })
        }
    }
}

fn equals(value: &str) -> Value {
    json!({ "operation": format!("_= {value}") })
}

/// Build the `objectFilter` for a hardware search.
pub(crate) fn hardware_filter(filter: &HardwareFilter) -> Value {
    let mut hardware = serde_json::Map::new();
    if let Some(hostname) = &filter.hostname {
        hardware.insert("hostname".into(), equals(hostname));
    }
    if let Some(domain) = &filter.domain {
        hardware.insert("domain".into(), equals(domain));
    }
    if let Some(datacenter) = &filter.datacenter {
        hardware.insert("datacenter".into(), json!({ "name": equals(datacenter) }));
    }
    if !filter.tags.is_empty() {
        hardware.insert(
            "tagReferences".into(),
            json!({
                "tag": {
                    "name": {
                        "operation": "in",
                        "options": [{ "name": "data", "value": filter.tags }]
                    }
                }
            }),
        );
    }
    json!({ "hardware": hardware })
}

/// Build the `objectFilter` for a subnet search.
pub(crate) fn subnet_filter(filter: &SubnetFilter) -> Value {
    let mut subnets = serde_json::Map::new();
    if let Some(vlan_id) = filter.vlan_id {
        subnets.insert("networkVlanId".into(), json!({ "operation": vlan_id }));
    }
    if let Some(version) = filter.version {
        subnets.insert("version".into(), json!({ "operation": version }));
    }
    json!({ "subnets": subnets })
}

#[async_trait]
impl HardwareApi for SoftLayerClient {
    async fn list_hardware(
        &self,
        filter: &HardwareFilter,
    ) -> Result<Vec<HardwareServer>, ProviderError> {
        let query = [
            ("objectMask", HARDWARE_MASK.to_string()),
            ("objectFilter", hardware_filter(filter).to_string()),
        ];
        let servers: Vec<HardwareServer> =
            self.get("SoftLayer_Account/getHardware.json", &query).await?;
        debug!(count = servers.len(), "Listed hardware");
        Ok(servers)
    }

    async fn get_hardware(&self, id: u64) -> Result<HardwareServer, ProviderError> {
        self.get(
            &format!("SoftLayer_Hardware_Server/{id}/getObject.json"),
            &[("objectMask", HARDWARE_MASK.to_string())],
        )
        .await
    }

    async fn create_hardware(
        &self,
        template: &HardwareTemplate,
    ) -> Result<HardwareServer, ProviderError> {
        info!(
            hostname = %template.hostname,
            domain = %template.domain,
            datacenter = %template.datacenter.name,
            "Ordering hardware"
        );
        let server: HardwareServer = self
            .post(
                "SoftLayer_Hardware_Server/createObject.json",
                &Parameters::new([template]),
            )
            .await?;
        info!(hardware_id = server.id, "Hardware ordered");
        Ok(server)
    }

    async fn set_hardware_tags(&self, id: u64, tags: &[String]) -> Result<(), ProviderError> {
        let _: Value = self
            .post(
                &format!("SoftLayer_Hardware_Server/{id}/setTags.json"),
                &Parameters::new([tags.join(",")]),
            )
            .await?;
        Ok(())
    }

    async fn cancel_hardware(&self, id: u64) -> Result<(), ProviderError> {
        info!(hardware_id = id, "Cancelling hardware");
        let item = self.billing_item("SoftLayer_Hardware_Server", id).await?;
        self.cancel_billing_item(&item).await?;
        info!(hardware_id = id, "Hardware cancelled");
        Ok(())
    }
}

#[async_trait]
impl SshKeyApi for SoftLayerClient {
    async fn list_ssh_keys(&self, label: &str) -> Result<Vec<SshKey>, ProviderError> {
        let filter = json!({ "sshKeys": { "label": equals(label) } });
        let query = [
            ("objectMask", SSH_KEY_MASK.to_string()),
            ("objectFilter", filter.to_string()),
        ];
        self.get("SoftLayer_Account/getSshKeys.json", &query).await
    }

    async fn get_ssh_key(&self, id: u64) -> Result<SshKey, ProviderError> {
        self.get(
            &format!("SoftLayer_Security_Ssh_Key/{id}/getObject.json"),
            &[("objectMask", SSH_KEY_MASK.to_string())],
        )
        .await
    }

    async fn create_ssh_key(&self, label: &str, key: &str) -> Result<SshKey, ProviderError> {
        info!(label = %label, "Adding ssh key");
        let template = SshKeyTemplate {
            label: label.to_string(),
            key: key.to_string(),
        };
        self.post(
            "SoftLayer_Security_Ssh_Key/createObject.json",
            &Parameters::new([template]),
        )
        .await
    }

    async fn delete_ssh_key(&self, id: u64) -> Result<(), ProviderError> {
        info!(key_id = id, "Deleting ssh key");
        self.delete(&format!("SoftLayer_Security_Ssh_Key/{id}.json"))
            .await
    }
}

#[async_trait]
impl NetworkApi for SoftLayerClient {
    async fn list_subnets(&self, filter: &SubnetFilter) -> Result<Vec<Subnet>, ProviderError> {
        let query = [
            ("objectMask", SUBNET_MASK.to_string()),
            ("objectFilter", subnet_filter(filter).to_string()),
        ];
        self.get("SoftLayer_Account/getSubnets.json", &query).await
    }

    async fn get_subnet(&self, id: u64) -> Result<Subnet, ProviderError> {
        self.get(
            &format!("SoftLayer_Network_Subnet/{id}/getObject.json"),
            &[("objectMask", SUBNET_MASK.to_string())],
        )
        .await
    }

    async fn subnet_price_id(
        &self,
        category: &str,
        quantity: Option<u32>,
    ) -> Result<u64, ProviderError> {
        let items: Vec<PackageItem> = self
            .get(
                &format!("SoftLayer_Product_Package/{SUBNET_PACKAGE_ID}/getItems.json"),
                &[("objectMask", ITEM_MASK.to_string())],
            )
            .await?;

        items
            .iter()
            .filter(|item| quantity.is_none() || item.capacity() == quantity)
            .flat_map(|item| item.prices.iter())
            .find(|price| price.categories.iter().any(|c| c.category_code == category))
            .map(|price| price.id)
            .ok_or_else(|| {
                ProviderError::Validation(match quantity {
                    Some(q) => format!("no {category} offering with {q} addresses"),
                    None => format!("no {category} offering"),
                })
            })
    }

    async fn verify_subnet_order(&self, order: &SubnetOrder) -> Result<(), ProviderError> {
        debug!(vlan_id = ?order.end_point_vlan_id, "Verifying subnet order");
        let _: Value = self
            .post(
                "SoftLayer_Product_Order/verifyOrder.json",
                &Parameters::new([order]),
            )
            .await?;
        Ok(())
    }

    async fn place_subnet_order(&self, order: &SubnetOrder) -> Result<OrderReceipt, ProviderError> {
        info!(vlan_id = ?order.end_point_vlan_id, "Placing subnet order");
        let receipt: OrderReceipt = self
            .post(
                "SoftLayer_Product_Order/placeOrder.json",
                &Parameters::new((order, false)),
            )
            .await?;
        info!(order_id = receipt.order_id, "Subnet ordered");
        Ok(receipt)
    }

    async fn cancel_subnet(&self, id: u64) -> Result<(), ProviderError> {
        info!(subnet_id = id, "Cancelling subnet");
        let item = self.billing_item("SoftLayer_Network_Subnet", id).await?;
        self.cancel_billing_item(&item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_hardware_filter_shape() {
        let filter = hardware_filter(&HardwareFilter {
            hostname: Some("web1".into()),
            datacenter: Some("dal10".into()),
            tags: vec!["web".into(), "prod".into()],
            ..HardwareFilter::default()
        });
        assert_eq!(filter["hardware"]["hostname"]["operation"], "_= web1");
        assert_eq!(
            filter["hardware"]["datacenter"]["name"]["operation"],
            "_= dal10"
        );
        assert_eq!(
            filter["hardware"]["tagReferences"]["tag"]["name"]["options"][0]["value"][1],
            "prod"
        );
        assert!(filter["hardware"].get("domain").is_none());
    }

    #[test]
    fn test_subnet_filter_shape() {
        let filter = subnet_filter(&SubnetFilter {
            vlan_id: Some(42),
            version: Some(6),
        });
        assert_eq!(filter["subnets"]["networkVlanId"]["operation"], 42);
        assert_eq!(filter["subnets"]["version"]["operation"], 6);
    }

    #[test]
    fn test_error_mapping() {
        let not_found = SoftLayerClient::map_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"Unable to find object with id of '5'.","code":"SoftLayer_Exception_ObjectNotFound"}"#,
        );
        assert!(matches!(not_found, ProviderError::NotFound(_)));

        let rejected = SoftLayerClient::map_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"Invalid datacenter","code":"SoftLayer_Exception_Order_InvalidLocation"}"#,
        );
        assert!(matches!(rejected, ProviderError::Validation(_)));

        let denied = SoftLayerClient::map_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":"Invalid API token.","code":"SoftLayer_Exception_Public"}"#,
        );
        assert!(matches!(denied, ProviderError::Api { status: 401, .. }));
        assert_eq!(denied.kind(), ErrorKind::ProviderRequestError);
        assert!(!denied.is_transient());

        let forbidden = SoftLayerClient::map_error(
            StatusCode::FORBIDDEN,
            r#"{"error":"Access Denied.","code":"SoftLayer_Exception_Public"}"#,
        );
        assert_eq!(forbidden.kind(), ErrorKind::ProviderRequestError);

        let user_error = SoftLayerClient::map_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"Hostname is invalid.","code":"SoftLayer_Exception_Public"}"#,
        );
        assert!(matches!(user_error, ProviderError::Validation(_)));

        let busy = SoftLayerClient::map_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(busy.is_transient());
    }
}
