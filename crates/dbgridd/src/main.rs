//! dbgridd — the dbgrid database provider daemon.
//!
//! Serves the provider API for one store cluster (PostgreSQL or MariaDB):
//! tenant provisioning, tunables and status.
//!
//! # Usage
//!
//! ```text
//! dbgridd serve --flavor postgres --port 3000
//! dbgridd serve --in-memory --log-format json
//! ```

mod server;

use clap::{Parser, Subcommand, ValueEnum};
use dbgrid_core::Flavor;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbgridd", about = "dbgrid database provider daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the provider API.
    Serve {
        /// Store flavor: postgres or mariadb.
        #[arg(long, env = "PROVIDER_FLAVOR", default_value = "postgres")]
        flavor: Flavor,

        /// Port to listen on (overrides PORT).
        #[arg(long)]
        port: Option<u16>,

        /// Log output format.
        #[arg(long, value_enum, default_value = "text")]
        log_format: LogFormat,

        /// Use an in-process store cluster and orchestrator.
        #[arg(long)]
        in_memory: bool,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dbgridd=debug"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            flavor,
            port,
            log_format,
            in_memory,
        } => {
            init_tracing(log_format);
            server::run(flavor, port, in_memory).await
        }
    }
}
