mod commands;
mod context;
mod registry;
mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use context::AppContext;
use hostplane_cloud::{ScalingTarget, WorkloadKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hostplane", version)]
#[command(
    about = "Deployment detection, workload scaling and managed databases across clouds",
    long_about = None
)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show where hostplane is running
    Detect {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
        /// Re-run detection and update the saved snapshot
        #[arg(long)]
        refresh: bool,
    },
    /// Installation settings
    #[command(subcommand)]
    Settings(SettingsCommands),
    /// List cloud adapters and their authentication status
    Providers,
    /// Write cluster credentials into the kubeconfig
    Kubeconfig {
        /// Provider (aws, azure, gcp, digitalocean, ovh)
        provider: String,
    },
    /// Workload autoscaling
    #[command(subcommand)]
    Scaling(ScalingCommands),
    /// Managed databases
    #[command(subcommand)]
    Db(DbCommands),
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show saved settings
    Show,
    /// Save the current detection snapshot
    Save {
        /// Additional setting (key=value), repeatable
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Workload {
    Deployment,
    Statefulset,
}

impl From<Workload> for WorkloadKind {
    fn from(value: Workload) -> Self {
        match value {
            Workload::Deployment => WorkloadKind::Deployment,
            Workload::Statefulset => WorkloadKind::StatefulSet,
        }
    }
}

#[derive(clap::Args)]
struct TargetArgs {
    /// Workload name
    name: String,
    #[arg(short, long, default_value = "default")]
    namespace: String,
    #[arg(short, long, value_enum, default_value = "deployment")]
    kind: Workload,
    /// Use this provider instead of the detected one
    #[arg(short, long)]
    provider: Option<String>,
}

impl TargetArgs {
    fn into_target(self) -> anyhow::Result<ScalingTarget> {
        let mut target =
            ScalingTarget::new(self.name, self.namespace).with_workload(self.kind.into());
        if let Some(provider) = self.provider {
            target = target.with_provider_hint(utils::parse_provider(&provider)?);
        }
        Ok(target)
    }
}

#[derive(Subcommand)]
enum ScalingCommands {
    /// Show the autoscaling configuration of a workload
    Show {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        json: bool,
    },
    /// Change the autoscaling configuration of a workload
    Apply {
        #[command(flatten)]
        target: TargetArgs,
        /// Minimum replicas
        #[arg(long, requires_all = ["max", "cpu"], conflicts_with = "disable_hpa")]
        min: Option<u32>,
        /// Maximum replicas
        #[arg(long, requires_all = ["min", "cpu"])]
        max: Option<u32>,
        /// Target CPU utilization (percent)
        #[arg(long, requires_all = ["min", "max"])]
        cpu: Option<u8>,
        /// Remove the horizontal autoscaler
        #[arg(long)]
        disable_hpa: bool,
        /// Vertical autoscaler mode (off, initial, recreate, auto)
        #[arg(long, conflicts_with = "disable_vpa")]
        vpa_mode: Option<String>,
        /// Remove the vertical autoscaler
        #[arg(long)]
        disable_vpa: bool,
        /// Set the replica count directly
        #[arg(long)]
        replicas: Option<u32>,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// List providers offering managed databases
    Providers,
    /// List instance types of a provider
    Types { provider: String },
    /// List regions of a provider
    Regions { provider: String },
    /// Provision a managed database
    Create {
        /// Instance name
        name: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        region: String,
        /// Instance type code (see `db types`)
        #[arg(long = "type")]
        instance_type: String,
        /// Storage in GB
        #[arg(long, default_value_t = 20)]
        storage: u32,
        /// postgresql or mysql
        #[arg(long, default_value = "postgresql")]
        engine: String,
        #[arg(long)]
        engine_version: Option<String>,
        /// Admin user
        #[arg(long)]
        user: String,
        /// Admin password; generated by DigitalOcean and OVH when omitted
        #[arg(long, env = "HOSTPLANE_DB_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Allow unencrypted connections
        #[arg(long)]
        no_ssl: bool,
    },
    /// Delete a managed database
    Delete { id: String },
    /// Check that a database accepts connections
    Test { id: String },
    /// Query the provider for the current status
    Status { id: String },
    /// List tracked databases
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print the stored password of a database
    Password { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let app = AppContext::load()?;

    match command {
        Commands::Detect { json, refresh } => commands::detect::handle(&app, json, refresh).await,
        Commands::Settings(SettingsCommands::Show) => commands::settings::show(&app).await,
        Commands::Settings(SettingsCommands::Save { set }) => {
            commands::settings::save(&app, &set).await
        }
        Commands::Providers => commands::providers::handle(&app).await,
        Commands::Kubeconfig { provider } => commands::kubeconfig::handle(&app, &provider).await,
        Commands::Scaling(ScalingCommands::Show { target, json }) => {
            let target = target.into_target()?;
            commands::scaling::show(&app, &target, json).await
        }
        Commands::Scaling(ScalingCommands::Apply {
            target,
            min,
            max,
            cpu,
            disable_hpa,
            vpa_mode,
            disable_vpa,
            replicas,
        }) => {
            let target = target.into_target()?;
            let form = commands::scaling::build_form(
                min.zip(max).zip(cpu).map(|((min, max), cpu)| (min, max, cpu)),
                disable_hpa,
                vpa_mode.as_deref(),
                disable_vpa,
                replicas,
            )?;
            commands::scaling::apply(&app, &target, &form).await
        }
        Commands::Db(command) => match command {
            DbCommands::Providers => commands::db::providers(&app),
            DbCommands::Types { provider } => commands::db::types(&app, &provider),
            DbCommands::Regions { provider } => commands::db::regions(&app, &provider),
            DbCommands::Create {
                name,
                provider,
                region,
                instance_type,
                storage,
                engine,
                engine_version,
                user,
                password,
                no_ssl,
            } => {
                let request = commands::db::build_request(commands::db::CreateArgs {
                    name,
                    provider,
                    region,
                    instance_type,
                    storage_gb: storage,
                    engine,
                    engine_version,
                    username: user,
                    password,
                    ssl_required: !no_ssl,
                })?;
                commands::db::create(&app, &request).await
            }
            DbCommands::Delete { id } => commands::db::delete(&app, &id).await,
            DbCommands::Test { id } => commands::db::test(&app, &id).await,
            DbCommands::Status { id } => commands::db::status(&app, &id).await,
            DbCommands::List { json } => commands::db::list(&app, json).await,
            DbCommands::Password { id } => commands::db::password(&app, &id).await,
        },
    }
}
