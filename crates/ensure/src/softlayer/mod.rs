//! SoftLayer REST API client.
//!
//! Implements the [`HardwareApi`], [`SshKeyApi`] and [`NetworkApi`]
//! capabilities against `https://api.softlayer.com/rest/v3.1`.

mod api;
mod client;
pub mod models;

pub use api::{HardwareApi, NetworkApi, SshKeyApi};
pub use client::SoftLayerClient;
