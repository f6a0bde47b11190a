//! Deployment environment detection
//!
//! Mode detection order (first match wins):
//! 1. Kubernetes: service-account directory or `KUBERNETES_SERVICE_HOST`
//! 2. Docker: `/.dockerenv` or a container runtime in the init cgroup
//! 3. Standalone
//!
//! Cloud identification runs independently of the mode.

use crate::info::{CloudProvider, DeploymentInfo, DeploymentMode, ProviderKind};
use crate::metadata::{HttpMetadataProbe, MetadataProbe};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const DOCKER_MARKER: &str = "/.dockerenv";
const KUBERNETES_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";
const CLOUD_PROVIDER_OVERRIDE: &str = "HOSTPLANE_CLOUD_PROVIDER";
const CONTAINER_CGROUP_MARKERS: [&str; 3] = ["docker", "containerd", "kubepods"];
const PROBE_GRACE: Duration = Duration::from_millis(250);

/// Filesystem signals and probe timeout used by the detector
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub service_account_dir: PathBuf,
    pub docker_marker: PathBuf,
    pub cgroup_paths: Vec<PathBuf>,
    pub metadata_timeout: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            service_account_dir: PathBuf::from(SERVICE_ACCOUNT_DIR),
            docker_marker: PathBuf::from(DOCKER_MARKER),
            cgroup_paths: vec![
                PathBuf::from("/proc/1/cgroup"),
                PathBuf::from("/proc/self/cgroup"),
            ],
            metadata_timeout: Duration::from_secs(2),
        }
    }
}

impl DetectorConfig {
    /// Config whose marker paths all live under `root`
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            service_account_dir: root.join(SERVICE_ACCOUNT_DIR.trim_start_matches('/')),
            docker_marker: root.join(DOCKER_MARKER.trim_start_matches('/')),
            cgroup_paths: vec![root.join("proc/1/cgroup")],
            ..Default::default()
        }
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }
}

/// Where environment variables are read from
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    #[default]
    Process,
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match self {
            EnvSource::Process => std::env::var(key).ok(),
            EnvSource::Fixed(vars) => vars.get(key).cloned(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

/// Deployment detector
pub struct DeploymentDetector {
    config: DetectorConfig,
    env: EnvSource,
    probe: Arc<dyn MetadataProbe>,
}

impl DeploymentDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let probe = Arc::new(HttpMetadataProbe::new(config.metadata_timeout));
        Self {
            config,
            env: EnvSource::Process,
            probe,
        }
    }

    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn MetadataProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Full detection, never fails
    #[tracing::instrument(skip(self))]
    pub async fn detect(&self) -> DeploymentInfo {
        let mode = self.detect_mode();
        let cloud_provider = self.detect_cloud().await;
        let info = DeploymentInfo::new(mode, cloud_provider);

        info!(
            mode = %info.mode,
            cloud_provider = %info.cloud_provider,
            auto_scaling = info.supports_auto_scaling,
            "Detected deployment environment"
        );
        info
    }

    /// Execution substrate from env vars and filesystem markers
    pub fn detect_mode(&self) -> DeploymentMode {
        if self.config.service_account_dir.is_dir() {
            debug!(path = %self.config.service_account_dir.display(), "Found service-account directory");
            return DeploymentMode::Kubernetes;
        }
        if self.env.get(KUBERNETES_SERVICE_HOST).is_some() {
            debug!("Found {} in environment", KUBERNETES_SERVICE_HOST);
            return DeploymentMode::Kubernetes;
        }

        if self.config.docker_marker.exists() {
            debug!(path = %self.config.docker_marker.display(), "Found container marker file");
            return DeploymentMode::Docker;
        }
        if self.cgroup_mentions_container() {
            return DeploymentMode::Docker;
        }

        DeploymentMode::Standalone
    }

    fn cgroup_mentions_container(&self) -> bool {
        for path in &self.config.cgroup_paths {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    if let Some(marker) = CONTAINER_CGROUP_MARKERS
                        .iter()
                        .find(|m| content.contains(*m))
                    {
                        debug!(path = %path.display(), marker, "Found container runtime in cgroup");
                        return true;
                    }
                }
                Err(e) => {
                    debug!(
                        signal = "DetectionDegraded",
                        path = %path.display(),
                        error = %e,
                        "Cannot read cgroup file"
                    );
                }
            }
        }
        false
    }

    /// Cloud vendor from the override variable or the metadata probe
    pub async fn detect_cloud(&self) -> CloudProvider {
        if let Some(value) = self.env.get(CLOUD_PROVIDER_OVERRIDE) {
            return match value.parse::<ProviderKind>() {
                Ok(kind) => kind.into(),
                Err(e) => {
                    debug!(signal = "DetectionDegraded", error = %e, "Ignoring cloud provider override");
                    CloudProvider::Unknown
                }
            };
        }

        // The HTTP probe enforces the timeout itself; this only bounds probes that do not
        let limit = self.config.metadata_timeout + PROBE_GRACE;
        match tokio::time::timeout(limit, self.probe.identify()).await {
            Ok(provider) => provider,
            Err(_) => {
                debug!(
                    signal = "DetectionDegraded",
                    timeout_ms = self.config.metadata_timeout.as_millis() as u64,
                    "Metadata probe timed out"
                );
                CloudProvider::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::StaticProbe;
    use async_trait::async_trait;
    use serial_test::serial;
    use std::fs;

    struct SlowProbe;

    #[async_trait]
    impl MetadataProbe for SlowProbe {
        async fn identify(&self) -> CloudProvider {
            tokio::time::sleep(Duration::from_secs(5)).await;
            CloudProvider::Aws
        }
    }

    fn detector(root: &Path, env: &[(&str, &str)], cloud: CloudProvider) -> DeploymentDetector {
        let vars = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DeploymentDetector::new(DetectorConfig::rooted_at(root))
            .with_env(EnvSource::Fixed(vars))
            .with_probe(Arc::new(StaticProbe(cloud)))
    }

    #[tokio::test]
    async fn test_no_markers_is_standalone() {
        let root = tempfile::tempdir().unwrap();
        let info = detector(root.path(), &[], CloudProvider::Aws).detect().await;

        assert_eq!(info.mode, DeploymentMode::Standalone);
        assert!(info.is_standalone);
        assert!(!info.supports_auto_scaling);
    }

    #[tokio::test]
    async fn test_kubernetes_env_with_aws_metadata() {
        let root = tempfile::tempdir().unwrap();
        let info = detector(
            root.path(),
            &[("KUBERNETES_SERVICE_HOST", "10.96.0.1")],
            CloudProvider::Aws,
        )
        .detect()
        .await;

        assert_eq!(info.mode, DeploymentMode::Kubernetes);
        assert_eq!(info.cloud_provider, CloudProvider::Aws);
        assert!(info.supports_auto_scaling);
    }

    #[tokio::test]
    async fn test_service_account_dir_wins_over_docker_marker() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("var/run/secrets/kubernetes.io/serviceaccount")).unwrap();
        fs::write(root.path().join(".dockerenv"), "").unwrap();

        let det = detector(root.path(), &[], CloudProvider::None);
        assert_eq!(det.detect_mode(), DeploymentMode::Kubernetes);
    }

    #[tokio::test]
    async fn test_docker_marker_and_cgroup() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join(".dockerenv"), "").unwrap();
        assert_eq!(
            detector(root.path(), &[], CloudProvider::None).detect_mode(),
            DeploymentMode::Docker
        );

        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("proc/1")).unwrap();
        fs::write(
            root.path().join("proc/1/cgroup"),
            "0::/system.slice/containerd.service\n",
        )
        .unwrap();
        let info = detector(root.path(), &[], CloudProvider::Gcp).detect().await;
        assert_eq!(info.mode, DeploymentMode::Docker);
        assert!(!info.supports_auto_scaling);
    }

    #[tokio::test]
    async fn test_empty_service_host_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        let det = detector(root.path(), &[("KUBERNETES_SERVICE_HOST", " ")], CloudProvider::None);
        assert_eq!(det.detect_mode(), DeploymentMode::Standalone);
    }

    #[tokio::test]
    async fn test_cloud_override() {
        let root = tempfile::tempdir().unwrap();
        let det = detector(
            root.path(),
            &[("HOSTPLANE_CLOUD_PROVIDER", "ovh")],
            CloudProvider::None,
        );
        assert_eq!(det.detect_cloud().await, CloudProvider::Ovh);

        let det = detector(
            root.path(),
            &[("HOSTPLANE_CLOUD_PROVIDER", "hetzner")],
            CloudProvider::Aws,
        );
        assert_eq!(det.detect_cloud().await, CloudProvider::Unknown);
    }

    #[tokio::test]
    async fn test_probe_timeout_degrades_to_none() {
        let root = tempfile::tempdir().unwrap();
        let det = DeploymentDetector::new(
            DetectorConfig::rooted_at(root.path()).with_metadata_timeout(Duration::from_millis(50)),
        )
        .with_env(EnvSource::Fixed(HashMap::from([(
            "KUBERNETES_SERVICE_HOST".to_string(),
            "10.0.0.1".to_string(),
        )])))
        .with_probe(Arc::new(SlowProbe));

        let info = det.detect().await;
        assert_eq!(info.cloud_provider, CloudProvider::None);
        assert!(info.is_kubernetes);
        assert!(!info.supports_auto_scaling);
    }

    #[tokio::test]
    async fn test_kubernetes_on_aws_with_unresponsive_gcp_endpoint() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let imds = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/instance-id"))
            .respond_with(ResponseTemplate::new(200).set_body_string("i-0abc123def"))
            .mount(&imds)
            .await;
        let gcp = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&gcp)
            .await;

        let root = tempfile::tempdir().unwrap();
        let timeout = Duration::from_secs(1);
        let det = DeploymentDetector::new(
            DetectorConfig::rooted_at(root.path()).with_metadata_timeout(timeout),
        )
        .with_env(EnvSource::Fixed(HashMap::from([(
            "KUBERNETES_SERVICE_HOST".to_string(),
            "10.96.0.1".to_string(),
        )])))
        .with_probe(Arc::new(HttpMetadataProbe::with_endpoints(
            timeout,
            imds.uri(),
            gcp.uri(),
        )));

        let info = det.detect().await;
        assert_eq!(info.cloud_provider, CloudProvider::Aws);
        assert!(info.supports_auto_scaling);
    }

    #[test]
    #[serial]
    fn test_process_env_source() {
        let root = tempfile::tempdir().unwrap();
        let det = DeploymentDetector::new(DetectorConfig::rooted_at(root.path()))
            .with_probe(Arc::new(StaticProbe(CloudProvider::None)));

        temp_env::with_var("KUBERNETES_SERVICE_HOST", Some("10.96.0.1"), || {
            assert_eq!(det.detect_mode(), DeploymentMode::Kubernetes);
        });
        temp_env::with_var_unset("KUBERNETES_SERVICE_HOST", || {
            assert_eq!(det.detect_mode(), DeploymentMode::Standalone);
        });
    }
}
