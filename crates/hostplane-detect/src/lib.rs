//! Hostplane deployment detection
//!
//! Inspects the local execution environment and produces an immutable
//! [`DeploymentInfo`] snapshot: where the panel runs (Kubernetes, Docker or a
//! plain host) and which cloud, if any, it runs on.
//!
//! Detection never fails. Signals that cannot be read or recognized degrade to
//! the most conservative answer (`standalone`, `none`).
//!
//! # Example
//!
//! ```ignore
//! use hostplane_detect::{DeploymentCache, DeploymentDetector, DetectorConfig};
//!
//! let cache = DeploymentCache::new(DeploymentDetector::new(DetectorConfig::default()));
//! let info = cache.get().await;
//! if info.supports_auto_scaling {
//!     println!("autoscaling available on {}", info.cloud_provider);
//! }
//!
//! // After the operator saves settings
//! cache.forget().await;
//! ```

pub mod cache;
pub mod detector;
pub mod error;
pub mod info;
pub mod metadata;

pub use cache::DeploymentCache;
pub use detector::{DeploymentDetector, DetectorConfig, EnvSource};
pub use error::{DetectError, Result};
pub use info::{CloudProvider, DeploymentInfo, DeploymentMode, ProviderKind};
pub use metadata::{HttpMetadataProbe, MetadataProbe, StaticProbe};
