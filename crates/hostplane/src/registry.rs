//! Builds the provider registries from `hostplane.kdl`
//!
//! Every adapter is registered; a missing `provider` block means the adapter
//! runs on defaults and the CLI's own configuration.

use anyhow::Context;
use hostplane_cloud::{CloudProviderManager, CommandRunner, ManagedDatabaseManager};
use hostplane_cloud_aws::{AwsProvider, AwsSettings};
use hostplane_cloud_azure::{AzureProvider, AzureSettings};
use hostplane_cloud_digitalocean::{DigitalOceanProvider, DigitalOceanSettings};
use hostplane_cloud_gcp::{GcpProvider, GcpSettings};
use hostplane_cloud_ovh::{ApiEndpoint, OvhCredentials, OvhProvider, OvhSettings};
use hostplane_config::{PanelConfig, ProviderConfig, Timeouts};
use hostplane_detect::ProviderKind;
use std::sync::Arc;

const DEFAULT_TOKEN_ENV: &str = "DIGITALOCEAN_ACCESS_TOKEN";

pub fn build(
    config: &PanelConfig,
    runner: Arc<dyn CommandRunner>,
) -> anyhow::Result<(CloudProviderManager, ManagedDatabaseManager)> {
    let timeouts = &config.timeouts;
    let mut scaling = CloudProviderManager::new();
    let mut databases = ManagedDatabaseManager::new();

    let aws = Arc::new(AwsProvider::new(
        aws_settings(config.provider(ProviderKind::Aws), timeouts),
        runner.clone(),
    ));
    scaling.register(aws.clone());
    databases.register(aws)?;

    let azure = Arc::new(AzureProvider::new(
        azure_settings(config.provider(ProviderKind::Azure), timeouts),
        runner.clone(),
    ));
    scaling.register(azure.clone());
    databases.register(azure)?;

    let gcp = Arc::new(GcpProvider::new(
        gcp_settings(config.provider(ProviderKind::Gcp), timeouts),
        runner.clone(),
    ));
    scaling.register(gcp.clone());
    databases.register(gcp)?;

    let digitalocean = Arc::new(DigitalOceanProvider::new(
        digitalocean_settings(config.provider(ProviderKind::DigitalOcean), timeouts),
        runner.clone(),
    ));
    scaling.register(digitalocean.clone());
    databases.register(digitalocean)?;

    let ovh = Arc::new(OvhProvider::new(
        ovh_settings(config.provider(ProviderKind::Ovh), timeouts)?,
        runner,
    ));
    scaling.register(ovh.clone());
    databases.register(ovh)?;

    Ok((scaling, databases))
}

fn aws_settings(provider: Option<&ProviderConfig>, timeouts: &Timeouts) -> AwsSettings {
    let mut settings = AwsSettings {
        command_timeout: timeouts.command,
        provisioning_timeout: timeouts.provisioning,
        ..AwsSettings::default()
    };
    if let Some(p) = provider {
        if let Some(region) = &p.region {
            settings.region = region.clone();
        }
        settings.cluster = p.cluster.clone();
        settings.profile = p.setting("profile").map(str::to_string);
        settings.context = p.context.clone();
        settings.kubeconfig = p.kubeconfig.clone();
    }
    settings
}

fn azure_settings(provider: Option<&ProviderConfig>, timeouts: &Timeouts) -> AzureSettings {
    let mut settings = AzureSettings {
        command_timeout: timeouts.command,
        provisioning_timeout: timeouts.provisioning,
        ..AzureSettings::default()
    };
    if let Some(p) = provider {
        settings.resource_group = p.setting("resource-group").map(str::to_string);
        settings.subscription = p.setting("subscription").map(str::to_string);
        settings.cluster = p.cluster.clone();
        settings.context = p.context.clone();
        settings.kubeconfig = p.kubeconfig.clone();
    }
    settings
}

fn gcp_settings(provider: Option<&ProviderConfig>, timeouts: &Timeouts) -> GcpSettings {
    let mut settings = GcpSettings {
        command_timeout: timeouts.command,
        provisioning_timeout: timeouts.provisioning,
        ..GcpSettings::default()
    };
    if let Some(p) = provider {
        settings.project = p.setting("project").map(str::to_string);
        settings.region = p.region.clone();
        settings.cluster = p.cluster.clone();
        settings.context = p.context.clone();
        settings.kubeconfig = p.kubeconfig.clone();
    }
    settings
}

fn digitalocean_settings(
    provider: Option<&ProviderConfig>,
    timeouts: &Timeouts,
) -> DigitalOceanSettings {
    let token_env = provider
        .and_then(|p| p.setting("token-env"))
        .unwrap_or(DEFAULT_TOKEN_ENV);

    let mut settings = DigitalOceanSettings {
        access_token: std::env::var(token_env).ok().filter(|t| !t.is_empty()),
        command_timeout: timeouts.command,
        provisioning_timeout: timeouts.provisioning,
        ..DigitalOceanSettings::default()
    };
    if let Some(p) = provider {
        settings.cluster = p.cluster.clone();
        settings.auth_context = p.setting("auth-context").map(str::to_string);
        settings.context = p.context.clone();
        settings.kubeconfig = p.kubeconfig.clone();
    }
    settings
}

fn ovh_settings(
    provider: Option<&ProviderConfig>,
    timeouts: &Timeouts,
) -> anyhow::Result<OvhSettings> {
    let mut settings = OvhSettings {
        credentials: OvhCredentials::from_env(),
        command_timeout: timeouts.command,
        provisioning_timeout: timeouts.provisioning,
        ..OvhSettings::default()
    };
    if let Some(p) = provider {
        if let Some(endpoint) = p.setting("endpoint") {
            settings.endpoint = endpoint
                .parse::<ApiEndpoint>()
                .context("invalid OVH endpoint in hostplane.kdl")?;
        }
        if let Some(plan) = p.setting("plan") {
            settings.plan = plan.to_string();
        }
        if let Some(ips) = p.setting("allowed-ips") {
            settings.allowed_ips = ips
                .split(',')
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(str::to_string)
                .collect();
        }
        settings.service_name = p.setting("service-name").map(str::to_string);
        settings.kube_id = p.setting("kube-id").map(str::to_string);
        settings.context = p.context.clone();
        settings.kubeconfig = p.kubeconfig.clone();
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostplane_cloud::TokioCommandRunner;
    use serial_test::serial;
    use std::time::Duration;

    fn provider(kind: ProviderKind, settings: &[(&str, &str)]) -> ProviderConfig {
        let mut config = ProviderConfig::new(kind);
        for (key, value) in settings {
            config.settings.insert(key.to_string(), value.to_string());
        }
        config
    }

    #[test]
    fn test_every_adapter_registered() {
        let (scaling, databases) =
            build(&PanelConfig::default(), Arc::new(TokioCommandRunner::new())).unwrap();

        assert_eq!(scaling.registered(), ProviderKind::ALL.to_vec());
        assert_eq!(databases.get_providers().len(), ProviderKind::ALL.len());
        assert!(databases.is_provider_supported("ovh"));
    }

    #[test]
    fn test_aws_settings() {
        let mut config = provider(ProviderKind::Aws, &[("profile", "deploy")]);
        config.region = Some("eu-west-1".to_string());
        config.cluster = Some("prod".to_string());

        let settings = aws_settings(Some(&config), &Timeouts::default());
        assert_eq!(settings.region, "eu-west-1");
        assert_eq!(settings.cluster.as_deref(), Some("prod"));
        assert_eq!(settings.profile.as_deref(), Some("deploy"));
    }

    #[test]
    fn test_aws_default_region() {
        let settings = aws_settings(None, &Timeouts::default());
        assert_eq!(settings.region, "us-east-1");
        assert!(settings.cluster.is_none());
    }

    #[test]
    fn test_timeouts_applied() {
        let timeouts = Timeouts {
            command: Duration::from_secs(30),
            provisioning: Duration::from_secs(900),
            metadata: Duration::from_secs(1),
        };
        let settings = gcp_settings(None, &timeouts);
        assert_eq!(settings.command_timeout, Duration::from_secs(30));
        assert_eq!(settings.provisioning_timeout, Duration::from_secs(900));
    }

    #[test]
    fn test_azure_settings() {
        let config = provider(
            ProviderKind::Azure,
            &[("resource-group", "rg-prod"), ("subscription", "sub-1")],
        );
        let settings = azure_settings(Some(&config), &Timeouts::default());
        assert_eq!(settings.resource_group.as_deref(), Some("rg-prod"));
        assert_eq!(settings.subscription.as_deref(), Some("sub-1"));
    }

    #[test]
    #[serial]
    fn test_digitalocean_token_env() {
        let config = provider(ProviderKind::DigitalOcean, &[("token-env", "DO_TOKEN_TEST")]);
        let settings = temp_env::with_var("DO_TOKEN_TEST", Some("dop_v1_abc"), || {
            digitalocean_settings(Some(&config), &Timeouts::default())
        });
        assert_eq!(settings.access_token.as_deref(), Some("dop_v1_abc"));
    }

    #[test]
    #[serial]
    fn test_digitalocean_default_token_env() {
        let settings = temp_env::with_var(DEFAULT_TOKEN_ENV, None::<&str>, || {
            digitalocean_settings(None, &Timeouts::default())
        });
        assert!(settings.access_token.is_none());
    }

    #[test]
    fn test_ovh_settings() {
        let config = provider(
            ProviderKind::Ovh,
            &[
                ("endpoint", "ovh-ca"),
                ("service-name", "proj-1"),
                ("plan", "business"),
                ("allowed-ips", "10.0.0.0/8, 192.168.1.0/24,"),
            ],
        );
        let settings = ovh_settings(Some(&config), &Timeouts::default()).unwrap();
        assert_eq!(settings.endpoint, ApiEndpoint::Canada);
        assert_eq!(settings.service_name.as_deref(), Some("proj-1"));
        assert_eq!(settings.plan, "business");
        assert_eq!(settings.allowed_ips, vec!["10.0.0.0/8", "192.168.1.0/24"]);
    }

    #[test]
    fn test_ovh_invalid_endpoint() {
        let config = provider(ProviderKind::Ovh, &[("endpoint", "ovh-mars")]);
        assert!(ovh_settings(Some(&config), &Timeouts::default()).is_err());
    }
}
