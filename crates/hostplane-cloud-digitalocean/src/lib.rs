//! DigitalOcean provider for Hostplane
//!
//! Scales workloads on DOKS through `kubectl` and provisions managed
//! databases through `doctl`. DOKS does not ship the Vertical Pod Autoscaler,
//! so only horizontal scaling and manual replica counts are offered.
//!
//! The access token is taken from the environment variable named by the
//! `token-env` provider setting (default `DIGITALOCEAN_ACCESS_TOKEN`).

pub mod doctl;
pub mod error;
pub mod provider;

pub use doctl::{Account, Connection, Database, DatabaseUser, Doctl};
pub use error::{DigitalOceanError, Result};
pub use provider::{DigitalOceanProvider, DigitalOceanSettings};
