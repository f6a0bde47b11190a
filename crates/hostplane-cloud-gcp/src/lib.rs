//! Google Cloud provider for Hostplane
//!
//! Scales workloads on GKE through `kubectl` and provisions Cloud SQL
//! instances through the `gcloud` CLI.

pub mod error;
pub mod gcloud;
pub mod provider;

pub use error::{GcpError, Result};
pub use gcloud::{Gcloud, GcloudAccount, SqlInstance};
pub use provider::{GcpProvider, GcpSettings};
