//! Resource providers.
//!
//! Each kind implements [`ResourceProvider`] on top of a SoftLayer capability
//! trait, so the reconciler never sees API details.

pub mod host;
pub mod ssh_key;
pub mod subnet;
mod traits;

pub use host::HostProvider;
pub use ssh_key::SshKeyProvider;
pub use subnet::SubnetProvider;
pub use traits::{MatchPolicy, MatchSet, Readiness, ResourceHandle, ResourceProvider};
pub(crate) use traits::compare_ids;

use crate::error::ProviderError;

/// SoftLayer ids are integers; anything else cannot name a resource.
pub(crate) fn parse_id(id: &str) -> Result<u64, ProviderError> {
    id.trim()
        .parse()
        .map_err(|_| ProviderError::InvalidSpec(format!("'{id}' is not a valid SoftLayer id")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(" 42 ").unwrap(), 42);
        assert!(matches!(
            parse_id("web1"),
            Err(ProviderError::InvalidSpec(_))
        ));
    }
}
