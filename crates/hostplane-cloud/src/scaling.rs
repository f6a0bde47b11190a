//! Scaling configuration types

use crate::error::{CloudError, Result};
use hostplane_detect::ProviderKind;
use serde::{Deserialize, Serialize};

/// Kubernetes workload kind backing a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    #[default]
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    /// Resource name understood by kubectl
    pub fn resource(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::StatefulSet => "statefulset",
        }
    }

    /// Kind used in `scaleTargetRef` / `targetRef`
    pub fn kind(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
        }
    }
}

/// A deployable unit whose scaling is managed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingTarget {
    /// Workload name (also used for the HPA/VPA objects)
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub workload: WorkloadKind,
    /// Provider configured for this target, overriding detection
    #[serde(default)]
    pub provider_hint: Option<ProviderKind>,
}

impl ScalingTarget {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            workload: WorkloadKind::Deployment,
            provider_hint: None,
        }
    }

    pub fn with_workload(mut self, workload: WorkloadKind) -> Self {
        self.workload = workload;
        self
    }

    pub fn with_provider_hint(mut self, provider: ProviderKind) -> Self {
        self.provider_hint = Some(provider);
        self
    }
}

impl std::fmt::Display for ScalingTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.workload.resource(), self.name)
    }
}

/// Horizontal pod autoscaling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizontalScaling {
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub target_cpu_percent: u8,
}

impl HorizontalScaling {
    pub fn new(min_replicas: u32, max_replicas: u32, target_cpu_percent: u8) -> Self {
        Self {
            min_replicas,
            max_replicas,
            target_cpu_percent,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_replicas < 1 {
            return Err(CloudError::InvalidScalingParameters(format!(
                "min_replicas must be at least 1 (got {})",
                self.min_replicas
            )));
        }
        if self.max_replicas < self.min_replicas {
            return Err(CloudError::InvalidScalingParameters(format!(
                "max_replicas ({}) must be >= min_replicas ({})",
                self.max_replicas, self.min_replicas
            )));
        }
        if self.target_cpu_percent == 0 || self.target_cpu_percent > 100 {
            return Err(CloudError::InvalidScalingParameters(format!(
                "target_cpu_percent must be within 1..=100 (got {})",
                self.target_cpu_percent
            )));
        }
        Ok(())
    }
}

/// VPA update mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    Off,
    Initial,
    Recreate,
    #[default]
    Auto,
}

impl UpdateMode {
    /// Value of `spec.updatePolicy.updateMode`
    pub fn as_k8s(&self) -> &'static str {
        match self {
            UpdateMode::Off => "Off",
            UpdateMode::Initial => "Initial",
            UpdateMode::Recreate => "Recreate",
            UpdateMode::Auto => "Auto",
        }
    }

    pub fn from_k8s(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "off" => Some(UpdateMode::Off),
            "initial" => Some(UpdateMode::Initial),
            "recreate" => Some(UpdateMode::Recreate),
            "auto" => Some(UpdateMode::Auto),
            _ => None,
        }
    }
}

impl std::fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_k8s().to_ascii_lowercase())
    }
}

impl std::str::FromStr for UpdateMode {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        UpdateMode::from_k8s(s.trim()).ok_or_else(|| {
            CloudError::InvalidScalingParameters(format!(
                "unknown update mode '{}' (expected off, initial, recreate or auto)",
                s
            ))
        })
    }
}

/// Vertical pod autoscaling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerticalScaling {
    pub update_mode: UpdateMode,
}

/// Current scaling state of a target; `None` means not configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScalingConfig {
    pub horizontal: Option<HorizontalScaling>,
    pub vertical: Option<VerticalScaling>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bounds() {
        assert!(HorizontalScaling::new(1, 1, 100).validate().is_ok());
        assert!(HorizontalScaling::new(2, 10, 80).validate().is_ok());

        for invalid in [
            HorizontalScaling::new(0, 3, 50),
            HorizontalScaling::new(5, 2, 80),
            HorizontalScaling::new(1, 3, 0),
            HorizontalScaling::new(1, 3, 101),
        ] {
            assert!(
                matches!(invalid.validate(), Err(CloudError::InvalidScalingParameters(_))),
                "{:?} should be rejected",
                invalid
            );
        }
    }

    #[test]
    fn test_update_mode_parse() {
        assert_eq!("Recreate".parse::<UpdateMode>().unwrap(), UpdateMode::Recreate);
        assert_eq!(UpdateMode::Initial.as_k8s(), "Initial");
        assert!("sometimes".parse::<UpdateMode>().is_err());
    }

    #[test]
    fn test_target_display() {
        let target = ScalingTarget::new("shop", "tenant-42").with_workload(WorkloadKind::StatefulSet);
        assert_eq!(target.to_string(), "tenant-42/statefulset/shop");
    }
}
