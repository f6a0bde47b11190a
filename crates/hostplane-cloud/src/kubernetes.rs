//! kubectl-backed scaling shared by all adapters
//!
//! Managed Kubernetes offerings differ in how credentials are obtained, not in
//! how HPA/VPA objects are managed. Adapters configure a [`KubernetesScaler`]
//! with their kube context and delegate the [`crate::ScalingProvider`]
//! operations to it.

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::{CloudError, Result};
use crate::scaling::{
    HorizontalScaling, ScalingConfig, ScalingTarget, UpdateMode, VerticalScaling,
};
use hostplane_detect::ProviderKind;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const KUBECTL: &str = "kubectl";
const MANAGED_BY: &str = "hostplane";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Kubernetes default for HPAs created without a CPU metric
const DEFAULT_CPU_TARGET: u8 = 80;

pub struct KubernetesScaler {
    provider: ProviderKind,
    runner: Arc<dyn CommandRunner>,
    context: Option<String>,
    kubeconfig: Option<PathBuf>,
    timeout: Duration,
    vertical_supported: bool,
}

impl KubernetesScaler {
    pub fn new(provider: ProviderKind, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            provider,
            runner,
            context: None,
            kubeconfig: None,
            timeout: DEFAULT_TIMEOUT,
            vertical_supported: false,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_vertical_support(mut self, supported: bool) -> Self {
        self.vertical_supported = supported;
        self
    }

    pub fn supports_vertical_scaling(&self) -> bool {
        self.vertical_supported
    }

    fn kubectl(&self, namespace: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(KUBECTL).timeout(self.timeout);
        if let Some(context) = &self.context {
            spec = spec.arg("--context").arg(context);
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            spec = spec.env("KUBECONFIG", kubeconfig.to_string_lossy());
        }
        spec.arg("-n").arg(namespace)
    }

    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.runner
            .run(spec)
            .await
            .map_err(|e| e.into_cloud(self.provider.as_str()))
    }

    async fn run_checked(&self, spec: &CommandSpec) -> Result<String> {
        self.run(spec).await?.into_stdout(self.provider.as_str())
    }

    /// Fetches an object as JSON; `None` when it (or its CRD) does not exist
    async fn get_optional(&self, target: &ScalingTarget, resource: &str) -> Result<Option<Value>> {
        let spec = self
            .kubectl(&target.namespace)
            .args(["get", resource, target.name.as_str(), "-o", "json"]);
        let output = self.run(&spec).await?;

        if !output.is_success() {
            if is_not_found(&output.stderr) {
                debug!(%target, resource, "Scaling object not configured");
                return Ok(None);
            }
            return Err(CloudError::operation_failed(
                self.provider.as_str(),
                output.error_message(),
            ));
        }
        Ok(Some(serde_json::from_str(&output.stdout)?))
    }

    fn ensure_vertical(&self) -> Result<()> {
        if self.vertical_supported {
            Ok(())
        } else {
            Err(CloudError::ProviderNotSupported(format!(
                "{} does not support vertical pod autoscaling",
                self.provider
            )))
        }
    }

    pub async fn get_scaling_config(&self, target: &ScalingTarget) -> Result<ScalingConfig> {
        let horizontal = self
            .get_optional(target, "hpa")
            .await?
            .map(|hpa| parse_hpa(&hpa));

        let vertical = if self.vertical_supported {
            self.get_optional(target, "vpa")
                .await?
                .and_then(|vpa| parse_vpa(&vpa))
        } else {
            None
        };

        Ok(ScalingConfig {
            horizontal,
            vertical,
        })
    }

    pub async fn get_current_replicas(&self, target: &ScalingTarget) -> Result<u32> {
        let spec = self.kubectl(&target.namespace).args([
            "get",
            target.workload.resource(),
            target.name.as_str(),
            "-o",
            "jsonpath={.status.replicas}",
        ]);
        let stdout = self.run_checked(&spec).await?;

        let value = stdout.trim().trim_matches('\'');
        if value.is_empty() {
            // Scaled to zero: the status field is omitted
            return Ok(0);
        }
        value.parse::<u32>().map_err(|_| {
            CloudError::operation_failed(
                self.provider.as_str(),
                format!("unexpected replica count '{}'", value),
            )
        })
    }

    pub async fn enable_horizontal_scaling(
        &self,
        target: &ScalingTarget,
        policy: &HorizontalScaling,
    ) -> Result<()> {
        policy.validate()?;

        let manifest = hpa_manifest(target, policy);
        let spec = self
            .kubectl(&target.namespace)
            .args(["apply", "-f", "-"])
            .stdin(serde_json::to_string(&manifest)?);
        self.run_checked(&spec).await?;

        info!(
            %target,
            min = policy.min_replicas,
            max = policy.max_replicas,
            cpu = policy.target_cpu_percent,
            "Enabled horizontal scaling"
        );
        Ok(())
    }

    pub async fn disable_horizontal_scaling(&self, target: &ScalingTarget) -> Result<()> {
        let spec = self.kubectl(&target.namespace).args([
            "delete",
            "hpa",
            target.name.as_str(),
            "--ignore-not-found",
        ]);
        self.run_checked(&spec).await?;
        info!(%target, "Disabled horizontal scaling");
        Ok(())
    }

    pub async fn enable_vertical_scaling(
        &self,
        target: &ScalingTarget,
        policy: &VerticalScaling,
    ) -> Result<()> {
        self.ensure_vertical()?;

        let manifest = vpa_manifest(target, policy);
        let spec = self
            .kubectl(&target.namespace)
            .args(["apply", "-f", "-"])
            .stdin(serde_json::to_string(&manifest)?);
        self.run_checked(&spec).await?;

        info!(%target, mode = %policy.update_mode, "Enabled vertical scaling");
        Ok(())
    }

    pub async fn disable_vertical_scaling(&self, target: &ScalingTarget) -> Result<()> {
        self.ensure_vertical()?;

        let spec = self.kubectl(&target.namespace).args([
            "delete",
            "vpa",
            target.name.as_str(),
            "--ignore-not-found",
        ]);
        self.run_checked(&spec).await?;
        info!(%target, "Disabled vertical scaling");
        Ok(())
    }

    pub async fn scale_to_replicas(&self, target: &ScalingTarget, replicas: u32) -> Result<()> {
        let resource = format!("{}/{}", target.workload.resource(), target.name);
        let spec = self.kubectl(&target.namespace).args([
            "scale".to_string(),
            resource,
            "--replicas".to_string(),
            replicas.to_string(),
        ]);
        self.run_checked(&spec).await?;
        info!(%target, replicas, "Scaled workload");
        Ok(())
    }
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("NotFound")
        || stderr.contains("not found")
        || stderr.contains("doesn't have a resource type")
}

fn managed_metadata(target: &ScalingTarget) -> Value {
    json!({
        "name": target.name,
        "namespace": target.namespace,
        "labels": { "app.kubernetes.io/managed-by": MANAGED_BY },
    })
}

/// `autoscaling/v2` HorizontalPodAutoscaler for a target
pub fn hpa_manifest(target: &ScalingTarget, policy: &HorizontalScaling) -> Value {
    json!({
        "apiVersion": "autoscaling/v2",
        "kind": "HorizontalPodAutoscaler",
        "metadata": managed_metadata(target),
        "spec": {
            "scaleTargetRef": {
                "apiVersion": "apps/v1",
                "kind": target.workload.kind(),
                "name": target.name,
            },
            "minReplicas": policy.min_replicas,
            "maxReplicas": policy.max_replicas,
            "metrics": [{
                "type": "Resource",
                "resource": {
                    "name": "cpu",
                    "target": {
                        "type": "Utilization",
                        "averageUtilization": policy.target_cpu_percent,
                    },
                },
            }],
        },
    })
}

/// `autoscaling.k8s.io/v1` VerticalPodAutoscaler for a target
pub fn vpa_manifest(target: &ScalingTarget, policy: &VerticalScaling) -> Value {
    json!({
        "apiVersion": "autoscaling.k8s.io/v1",
        "kind": "VerticalPodAutoscaler",
        "metadata": managed_metadata(target),
        "spec": {
            "targetRef": {
                "apiVersion": "apps/v1",
                "kind": target.workload.kind(),
                "name": target.name,
            },
            "updatePolicy": { "updateMode": policy.update_mode.as_k8s() },
        },
    })
}

fn parse_hpa(hpa: &Value) -> HorizontalScaling {
    let spec = &hpa["spec"];
    let min_replicas = spec["minReplicas"].as_u64().unwrap_or(1) as u32;
    let max_replicas = spec["maxReplicas"].as_u64().unwrap_or(min_replicas as u64) as u32;

    let cpu_v2 = spec["metrics"].as_array().and_then(|metrics| {
        metrics.iter().find_map(|m| {
            if m["type"] == "Resource" && m["resource"]["name"] == "cpu" {
                m["resource"]["target"]["averageUtilization"].as_u64()
            } else {
                None
            }
        })
    });
    let cpu = cpu_v2
        .or_else(|| spec["targetCPUUtilizationPercentage"].as_u64())
        .map(|v| v.min(100) as u8)
        .unwrap_or(DEFAULT_CPU_TARGET);

    HorizontalScaling::new(min_replicas, max_replicas, cpu)
}

fn parse_vpa(vpa: &Value) -> Option<VerticalScaling> {
    // The VPA default update mode is Auto
    let mode = vpa["spec"]["updatePolicy"]["updateMode"]
        .as_str()
        .unwrap_or("Auto");
    UpdateMode::from_k8s(mode).map(|update_mode| VerticalScaling { update_mode })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;

    fn scaler(runner: &Arc<RecordingRunner>, vertical: bool) -> KubernetesScaler {
        KubernetesScaler::new(ProviderKind::Aws, runner.clone())
            .with_context(Some("prod".into()))
            .with_vertical_support(vertical)
    }

    fn target() -> ScalingTarget {
        ScalingTarget::new("shop", "tenant-1")
    }

    #[tokio::test]
    async fn test_invalid_parameters_issue_no_command() {
        let runner = Arc::new(RecordingRunner::new());
        let err = scaler(&runner, true)
            .enable_horizontal_scaling(&target(), &HorizontalScaling::new(5, 2, 80))
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::InvalidScalingParameters(_)));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_enable_horizontal_applies_manifest() {
        let runner = Arc::new(RecordingRunner::new());
        scaler(&runner, false)
            .enable_horizontal_scaling(&target(), &HorizontalScaling::new(2, 6, 70))
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            vec!["--context", "prod", "-n", "tenant-1", "apply", "-f", "-"]
        );
        let applied: Value = serde_json::from_str(calls[0].stdin.as_deref().unwrap()).unwrap();
        assert_eq!(applied["spec"]["minReplicas"], 2);
        assert_eq!(applied["spec"]["maxReplicas"], 6);
        assert_eq!(
            applied["spec"]["metrics"][0]["resource"]["target"]["averageUtilization"],
            70
        );
    }

    #[tokio::test]
    async fn test_vertical_unsupported_issues_no_command() {
        let runner = Arc::new(RecordingRunner::new());
        let scaler = scaler(&runner, false);

        let err = scaler
            .enable_vertical_scaling(&target(), &VerticalScaling::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::ProviderNotSupported(_)));
        assert!(scaler.disable_vertical_scaling(&target()).await.is_err());
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_scaling_config_not_configured() {
        let runner = Arc::new(RecordingRunner::new());
        runner
            .push_failure(
                1,
                r#"Error from server (NotFound): horizontalpodautoscalers.autoscaling "shop" not found"#,
            )
            .push_failure(1, r#"error: the server doesn't have a resource type "vpa""#);

        let config = scaler(&runner, true).get_scaling_config(&target()).await.unwrap();
        assert_eq!(config, ScalingConfig::default());
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scaling_config_reads_hpa_and_vpa() {
        let runner = Arc::new(RecordingRunner::new());
        runner
            .push_success(
                json!({"spec": {"minReplicas": 2, "maxReplicas": 8, "metrics": [
                    {"type": "Resource", "resource": {"name": "cpu", "target": {"type": "Utilization", "averageUtilization": 65}}}
                ]}})
                .to_string(),
            )
            .push_success(json!({"spec": {"updatePolicy": {"updateMode": "Initial"}}}).to_string());

        let config = scaler(&runner, true).get_scaling_config(&target()).await.unwrap();
        assert_eq!(config.horizontal, Some(HorizontalScaling::new(2, 8, 65)));
        assert_eq!(config.vertical.unwrap().update_mode, UpdateMode::Initial);
    }

    #[tokio::test]
    async fn test_scale_to_zero() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_success("deployment.apps/shop scaled").push_success("");
        let scaler = scaler(&runner, false);

        scaler.scale_to_replicas(&target(), 0).await.unwrap();
        assert_eq!(scaler.get_current_replicas(&target()).await.unwrap(), 0);

        let line = &runner.command_lines()[0];
        assert!(line.ends_with("scale deployment/shop --replicas 0"), "{}", line);
    }

    #[tokio::test]
    async fn test_command_failure_surfaces_stderr() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_failure(1, "Error from server (Forbidden): cannot patch");

        let err = scaler(&runner, false)
            .disable_horizontal_scaling(&target())
            .await
            .unwrap_err();
        match err {
            CloudError::ProviderOperationFailed { provider, cause } => {
                assert_eq!(provider, "aws");
                assert!(cause.contains("Forbidden"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_distinct() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_timeout();

        let err = scaler(&runner, false)
            .scale_to_replicas(&target(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Timeout(_)));
    }

    #[test]
    fn test_parse_legacy_hpa() {
        let hpa = json!({"spec": {"minReplicas": 1, "maxReplicas": 4, "targetCPUUtilizationPercentage": 50}});
        assert_eq!(parse_hpa(&hpa), HorizontalScaling::new(1, 4, 50));
    }
}
