use clap::{Parser, Subcommand};

mod client;
mod commands;

use client::ApiClient;
use commands::tunables::Target;

#[derive(Parser)]
#[command(
    name = "dbgrid",
    about = "dbgrid — operate a database provider",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Provider API address (host:port)
    #[arg(long, env = "DBGRID_API", default_value = "127.0.0.1:3000", global = true)]
    api: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision or remove tenant databases
    Resource {
        #[command(subcommand)]
        action: ResourceAction,
    },
    /// Read and edit cluster tunables.
    ///
    /// Edits read the current version, apply the change locally and submit
    /// it on top of that version. Conflicting concurrent edits are retried.
    Tunables {
        /// Provider name passed through to the API
        #[arg(long, default_value = "")]
        provider: String,
        /// Resource id passed through to the API
        #[arg(long, default_value = "")]
        resource: String,
        #[command(subcommand)]
        action: TunablesAction,
    },
    /// Show provider health
    Status,
}

#[derive(Subcommand)]
enum ResourceAction {
    /// Create a tenant database and print its connection env
    Provision,
    /// Remove a tenant database by id (/databases/USER:DB)
    Deprovision { id: String },
}

#[derive(Subcommand)]
enum TunablesAction {
    /// Print all tunables with their version
    List,
    /// Print one tunable
    Get { key: String },
    /// Set KEY=VALUE pairs
    Set {
        #[arg(required = true)]
        pairs: Vec<String>,
        /// Attempts before giving up on conflicts
        #[arg(long, default_value_t = 3)]
        retries: u32,
    },
    /// Remove keys
    Unset {
        #[arg(required = true)]
        keys: Vec<String>,
        /// Attempts before giving up on conflicts
        #[arg(long, default_value_t = 3)]
        retries: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dbgrid=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let client = ApiClient::new(&cli.api);

    match cli.command {
        Commands::Resource { action } => match action {
            ResourceAction::Provision => commands::resource::provision(&client).await,
            ResourceAction::Deprovision { id } => commands::resource::deprovision(&client, &id).await,
        },
        Commands::Tunables {
            provider,
            resource,
            action,
        } => {
            let target = Target { provider, resource };
            match action {
                TunablesAction::List => {
                    for line in commands::tunables::list(&client, &target).await? {
                        println!("{line}");
                    }
                }
                TunablesAction::Get { key } => {
                    println!("{}", commands::tunables::get(&client, &target, &key).await?);
                }
                TunablesAction::Set { pairs, retries } => {
                    let updated = commands::tunables::set(&client, &target, &pairs, retries).await?;
                    println!("✓ Tunables at version {}", updated.version);
                }
                TunablesAction::Unset { keys, retries } => {
                    let updated = commands::tunables::unset(&client, &target, &keys, retries).await?;
                    println!("✓ Tunables at version {}", updated.version);
                }
            }
            Ok(())
        }
        Commands::Status => {
            if !commands::status::status(&client).await? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
