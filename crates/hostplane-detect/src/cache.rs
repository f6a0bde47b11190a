//! Cached detection with explicit invalidation

use crate::detector::DeploymentDetector;
use crate::info::DeploymentInfo;
use tokio::sync::RwLock;

/// Holds the last detection result until [`DeploymentCache::forget`] is called
///
/// A stale value between invalidations is acceptable: the environment changes
/// rarely and a settings save always invalidates.
pub struct DeploymentCache {
    detector: DeploymentDetector,
    cached: RwLock<Option<DeploymentInfo>>,
}

impl DeploymentCache {
    pub fn new(detector: DeploymentDetector) -> Self {
        Self {
            detector,
            cached: RwLock::new(None),
        }
    }

    /// Cached snapshot, detecting on first use
    pub async fn get(&self) -> DeploymentInfo {
        if let Some(info) = *self.cached.read().await {
            return info;
        }

        let mut slot = self.cached.write().await;
        // Another caller may have filled the slot while we waited
        if let Some(info) = *slot {
            return info;
        }
        let info = self.detector.detect().await;
        *slot = Some(info);
        info
    }

    /// Cached snapshot without triggering detection
    pub async fn peek(&self) -> Option<DeploymentInfo> {
        *self.cached.read().await
    }

    pub async fn forget(&self) {
        tracing::debug!("Forgetting cached deployment info");
        *self.cached.write().await = None;
    }

    pub async fn refresh(&self) -> DeploymentInfo {
        self.forget().await;
        self.get().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectorConfig, EnvSource};
    use crate::info::{CloudProvider, DeploymentMode};
    use crate::metadata::StaticProbe;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cache_until_forget() {
        let root = tempfile::tempdir().unwrap();
        let detector = DeploymentDetector::new(DetectorConfig::rooted_at(root.path()))
            .with_env(EnvSource::Fixed(HashMap::new()))
            .with_probe(Arc::new(StaticProbe(CloudProvider::None)));
        let cache = DeploymentCache::new(detector);

        assert!(cache.peek().await.is_none());
        let first = cache.get().await;
        assert_eq!(first.mode, DeploymentMode::Standalone);

        // Environment changes are not seen until the cache is invalidated
        std::fs::write(root.path().join(".dockerenv"), "").unwrap();
        assert_eq!(cache.get().await.mode, DeploymentMode::Standalone);

        cache.forget().await;
        assert!(cache.peek().await.is_none());
        assert_eq!(cache.get().await.mode, DeploymentMode::Docker);
    }

    #[tokio::test]
    async fn test_refresh_recomputes() {
        let root = tempfile::tempdir().unwrap();
        let detector = DeploymentDetector::new(DetectorConfig::rooted_at(root.path()))
            .with_env(EnvSource::Fixed(HashMap::new()))
            .with_probe(Arc::new(StaticProbe(CloudProvider::None)));
        let cache = DeploymentCache::new(detector);

        cache.get().await;
        std::fs::write(root.path().join(".dockerenv"), "").unwrap();
        assert_eq!(cache.refresh().await.mode, DeploymentMode::Docker);
    }
}
