//! Idempotent present/absent reconciliation for SoftLayer resources.
//!
//! A [`ResourceSpec`] describes what should exist. A [`Reconciler`] drives a
//! [`ResourceProvider`] (bare metal host, ssh key or subnet) until the
//! provider matches the spec, optionally waiting for readiness.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use ensure::providers::HostProvider;
//! use ensure::{ClientConfig, Reconciler, SoftLayerClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(SoftLayerClient::new(ClientConfig::from_env()?)?);
//!     let spec = ensure::config::load_spec("web1.yaml".as_ref())?;
//!
//!     let result = Reconciler::new(Arc::new(HostProvider::new(client)))
//!         .reconcile(&spec)
//!         .await?;
//!     println!("changed: {}", result.changed);
//!
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod poller;
pub mod providers;
pub mod reconciler;
pub mod softlayer;
pub mod spec;

pub use config::{ClientConfig, ConfigError};
pub use error::{ErrorKind, Failure, ProviderError};
pub use poller::{PollConfig, Poller};
pub use providers::{MatchPolicy, MatchSet, Readiness, ResourceHandle, ResourceProvider};
pub use reconciler::{ReconcileResult, Reconciler, ReconcilerConfig};
pub use softlayer::SoftLayerClient;
pub use spec::{DesiredState, ResourceKind, ResourceParams, ResourceSpec};
