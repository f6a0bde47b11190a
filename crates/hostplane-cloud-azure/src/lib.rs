//! Azure provider for Hostplane
//!
//! Scales workloads on AKS through `kubectl` and provisions Azure Database
//! flexible servers (PostgreSQL or MySQL) through the `az` CLI.
//!
//! # Requirements
//!
//! - `az` CLI installed and logged in (`az login`)
//! - A resource group for database servers
//! - `kubectl` for scaling operations

pub mod az;
pub mod error;
pub mod provider;

pub use az::{AzAccount, AzCli, FlexibleServer, FlexibleService};
pub use error::{AzureError, Result};
pub use provider::{AzureProvider, AzureSettings};
