use crate::context::AppContext;
use crate::utils;
use anyhow::{anyhow, bail};
use colored::Colorize;
use hostplane_cloud::{DatabaseCredentials, DatabaseEngine, ManagedDatabaseRequest};
use hostplane_detect::ProviderKind;
use std::collections::BTreeMap;

/// Flags of `db create`
pub struct CreateArgs {
    pub name: String,
    pub provider: String,
    pub region: String,
    pub instance_type: String,
    pub storage_gb: u32,
    pub engine: String,
    pub engine_version: Option<String>,
    pub username: String,
    pub password: Option<String>,
    pub ssl_required: bool,
}

/// Providers that generate the admin password themselves
fn generates_password(provider: ProviderKind) -> bool {
    matches!(provider, ProviderKind::DigitalOcean | ProviderKind::Ovh)
}

pub fn build_request(args: CreateArgs) -> anyhow::Result<ManagedDatabaseRequest> {
    let provider = utils::parse_provider(&args.provider)?;
    let engine: DatabaseEngine = args.engine.parse()?;

    let password = match args.password.filter(|p| !p.is_empty()) {
        Some(password) => password,
        None if generates_password(provider) => String::new(),
        None => bail!(
            "{} needs an admin password\n  Pass --password or set HOSTPLANE_DB_PASSWORD",
            provider
        ),
    };

    Ok(ManagedDatabaseRequest {
        name: args.name,
        provider,
        region: args.region,
        instance_type: args.instance_type,
        storage_gb: args.storage_gb,
        engine,
        engine_version: args.engine_version,
        credentials: DatabaseCredentials {
            username: args.username,
            password,
        },
        ssl_required: args.ssl_required,
    })
}

fn print_offerings(title: &str, offerings: &BTreeMap<String, String>) {
    utils::print_header(format!("{:<28} {}", title, "DESCRIPTION"));
    for (code, label) in offerings {
        println!("{:<28} {}", code.cyan(), label);
    }
}

fn supported(app: &AppContext, provider: &str) -> anyhow::Result<()> {
    if app.databases.is_provider_supported(provider) {
        return Ok(());
    }
    // Surfaces the list of valid names
    utils::parse_provider(provider)?;
    Err(anyhow!("{} does not offer managed databases", provider))
}

pub fn providers(app: &AppContext) -> anyhow::Result<()> {
    utils::print_header(format!(
        "{:<14} {:<28} {:>6} {:>8}",
        "PROVIDER", "NAME", "TYPES", "REGIONS"
    ));
    for (kind, provider) in app.databases.get_providers() {
        println!(
            "{:<14} {:<28} {:>6} {:>8}",
            kind.as_str().cyan(),
            provider.display_name(),
            provider.instance_types().len(),
            provider.regions().len()
        );
    }
    Ok(())
}

pub fn types(app: &AppContext, provider: &str) -> anyhow::Result<()> {
    supported(app, provider)?;
    print_offerings("INSTANCE TYPE", &app.databases.get_available_instance_types(provider));
    Ok(())
}

pub fn regions(app: &AppContext, provider: &str) -> anyhow::Result<()> {
    supported(app, provider)?;
    print_offerings("REGION", &app.databases.get_available_regions(provider));
    Ok(())
}

pub async fn create(app: &AppContext, request: &ManagedDatabaseRequest) -> anyhow::Result<()> {
    let orchestrator = app.database_orchestrator()?;

    println!(
        "Provisioning {} {} on {} ({}, {})...",
        request.engine,
        request.name.cyan(),
        request.provider.as_str().cyan(),
        request.region,
        request.instance_type
    );
    println!("{}", "This can take several minutes".dimmed());

    let instance = orchestrator.provision(request).await?;

    println!();
    println!("{}", "✓ Database available".green());
    println!("  ID:       {}", instance.id.cyan());
    if let Some(provider_id) = &instance.provider_id {
        println!("  Provider: {}", provider_id);
    }
    if let (Some(host), Some(port)) = (&instance.host, instance.port) {
        println!("  Endpoint: {}:{}", host, port);
    }
    if let Some(database) = &instance.database {
        println!("  Database: {}", database);
    }
    println!("  User:     {}", instance.username);
    println!(
        "  Password: run {}",
        format!("hostplane db password {}", instance.id).cyan()
    );
    Ok(())
}

pub async fn delete(app: &AppContext, id: &str) -> anyhow::Result<()> {
    let orchestrator = app.database_orchestrator()?;
    println!("Deleting {}...", id.cyan());
    orchestrator.deprovision(id).await?;
    println!("{}", "✓ Database deleted".green());
    Ok(())
}

pub async fn test(app: &AppContext, id: &str) -> anyhow::Result<()> {
    let orchestrator = app.database_orchestrator()?;
    if orchestrator.test_connection(id).await? {
        println!("{} {} accepts connections", "✓".green(), id.cyan());
        Ok(())
    } else {
        bail!("{} is not reachable", id)
    }
}

pub async fn status(app: &AppContext, id: &str) -> anyhow::Result<()> {
    let orchestrator = app.database_orchestrator()?;
    let status = orchestrator.refresh_status(id).await?;
    println!("{} {}", id.cyan(), utils::colored_status(status));
    Ok(())
}

/// Reads the instance store directly; no key is needed to list
pub async fn list(app: &AppContext, json: bool) -> anyhow::Result<()> {
    let instances = app.instance_store().list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&instances)?);
        return Ok(());
    }

    if instances.is_empty() {
        println!("{}", "No managed databases".dimmed());
        return Ok(());
    }

    utils::print_header(format!(
        "{:<20} {:<14} {:<12} {:<14} {:<28} {}",
        "ID", "PROVIDER", "ENGINE", "STATUS", "ENDPOINT", "REGION"
    ));
    for instance in &instances {
        let endpoint = match (&instance.host, instance.port) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            _ => "-".to_string(),
        };
        println!(
            "{:<20} {:<14} {:<12} {:<14} {:<28} {}",
            instance.id.cyan(),
            instance.provider.as_str(),
            instance.engine.to_string(),
            utils::colored_status(instance.status),
            endpoint,
            instance.region
        );
        if let Some(error) = &instance.last_error {
            println!("  {}", error.dimmed());
        }
    }
    Ok(())
}

pub async fn password(app: &AppContext, id: &str) -> anyhow::Result<()> {
    let password = app.database_orchestrator()?.connection_password(id).await?;
    println!("{}", password);
    Ok(())
}
