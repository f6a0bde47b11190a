//! OVHcloud provider for Hostplane
//!
//! Scales workloads on OVHcloud Managed Kubernetes through `kubectl` and
//! provisions Public Cloud Databases through the signed OVHcloud REST API.
//!
//! # Requirements
//!
//! - API credentials in `OVH_APPLICATION_KEY`, `OVH_APPLICATION_SECRET` and
//!   `OVH_CONSUMER_KEY`
//! - `kubectl` for scaling operations

pub mod api;
pub mod error;
pub mod provider;

pub use api::{ApiEndpoint, Cluster, OvhClient, OvhCredentials};
pub use error::{OvhError, Result};
pub use provider::{OvhProvider, OvhSettings};
