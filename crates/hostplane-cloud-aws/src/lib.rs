//! AWS provider for Hostplane
//!
//! Scales workloads on EKS through `kubectl` and provisions RDS instances
//! through the `aws` CLI.
//!
//! # Requirements
//!
//! - `aws` CLI v2 installed and configured (profile or environment credentials)
//! - `kubectl` for scaling operations
//!
//! # Example
//!
//! ```ignore
//! use hostplane_cloud::{ScalingProvider, TokioCommandRunner};
//! use hostplane_cloud_aws::{AwsProvider, AwsSettings};
//! use std::sync::Arc;
//!
//! let provider = AwsProvider::new(
//!     AwsSettings::new("eu-west-1").with_cluster("prod"),
//!     Arc::new(TokioCommandRunner::new()),
//! );
//!
//! let auth = provider.check_auth().await?;
//! ```

pub mod aws;
pub mod error;
pub mod provider;

pub use aws::{AwsCli, CallerIdentity, DbEndpoint, DbInstance};
pub use error::{AwsError, Result};
pub use provider::{AwsProvider, AwsSettings};
