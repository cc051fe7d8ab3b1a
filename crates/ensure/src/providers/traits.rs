//! Provider trait and common types shared by every resource kind.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::spec::{ResourceKind, ResourceSpec};

/// The provider's view of an existing resource.
///
/// Handles are fetched fresh on every lookup and never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Provider-assigned identifier.
    pub id: String,
    /// Provider status, if the kind has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Provider-specific attributes.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ResourceHandle {
    /// Create a handle with no status or attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: None,
            attributes: Map::new(),
        }
    }

    /// Set the status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// String attribute lookup.
    #[must_use]
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Orders ids numerically when both parse as integers, lexicographically otherwise.
pub(crate) fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Resources matching a `find` query, sorted by id ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSet(Vec<ResourceHandle>);

impl MatchSet {
    /// Build a match set, sorting by id.
    #[must_use]
    pub fn new(mut handles: Vec<ResourceHandle>) -> Self {
        handles.sort_by(|a, b| compare_ids(&a.id, &b.id));
        Self(handles)
    }

    /// An empty match set.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Number of matches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowest-id match.
    #[must_use]
    pub fn first(&self) -> Option<&ResourceHandle> {
        self.0.first()
    }

    /// Iterate over matches.
    pub fn iter(&self) -> std::slice::Iter<'_, ResourceHandle> {
        self.0.iter()
    }

    /// Ids of all matches.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.0.iter().map(|h| h.id.clone()).collect()
    }

    /// Consume into the sorted handles.
    #[must_use]
    pub fn into_vec(self) -> Vec<ResourceHandle> {
        self.0
    }
}

impl FromIterator<ResourceHandle> for MatchSet {
    fn from_iter<I: IntoIterator<Item = ResourceHandle>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// How the engine treats more than one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Report the lowest-id match, with a warning naming the choice.
    FirstById,
    /// More than one match is an ambiguity error.
    Unique,
}

/// Optional readiness capability.
#[async_trait]
pub trait Readiness: Send + Sync {
    /// Single non-blocking readiness check.
    async fn is_ready(&self, handle: &ResourceHandle) -> Result<bool, ProviderError>;
}

/// Contract every resource kind implements.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Kind served by this provider.
    fn kind(&self) -> ResourceKind;

    /// Look up resources by the spec's identifying attributes only.
    ///
    /// Must fail rather than return an empty set when the lookup itself fails.
    async fn find(&self, spec: &ResourceSpec) -> Result<MatchSet, ProviderError>;

    /// Fetch a resource by id.
    async fn get(&self, id: &str) -> Result<ResourceHandle, ProviderError>;

    /// Issue the provisioning call.
    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceHandle, ProviderError>;

    /// Issue the cancellation call. A resource that is already gone fails
    /// with [`ProviderError::NotFound`].
    async fn destroy(&self, handle: &ResourceHandle) -> Result<(), ProviderError>;

    /// Cardinality policy for matches.
    fn match_policy(&self) -> MatchPolicy {
        MatchPolicy::FirstById
    }

    /// Whether an existing match still satisfies the spec. A stale match is
    /// replaced.
    fn is_current(&self, _spec: &ResourceSpec, _handle: &ResourceHandle) -> bool {
        true
    }

    /// Readiness capability, for kinds that have one.
    fn readiness(&self) -> Option<&dyn Readiness> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_set_sorts_numeric_ids() {
        let set = MatchSet::new(vec![
            ResourceHandle::new("100"),
            ResourceHandle::new("9"),
            ResourceHandle::new("20"),
        ]);
        assert_eq!(set.ids(), vec!["9", "20", "100"]);
        assert_eq!(set.first().map(|h| h.id.as_str()), Some("9"));
    }

    #[test]
    fn test_match_set_falls_back_to_lexicographic() {
        let set: MatchSet = ["b", "a", "10"]
            .into_iter()
            .map(ResourceHandle::new)
            .collect();
        assert_eq!(set.ids(), vec!["10", "a", "b"]);
    }

    #[test]
    fn test_handle_serializes_flat() {
        let handle = ResourceHandle::new("42")
            .with_status("ACTIVE")
            .with_attr("hostname", "web1");
        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(json["id"], "42");
        assert_eq!(json["status"], "ACTIVE");
        assert_eq!(json["attributes"]["hostname"], "web1");
        assert_eq!(handle.attr_str("hostname"), Some("web1"));
    }
}
