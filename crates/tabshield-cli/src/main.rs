use clap::{Parser, Subcommand};
use std::process;
use tabshield_core::BackendConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cmd;
mod reports;

/// Log level used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Cell suppression search over a remote LP solver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    backend: BackendConfig,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reports the solver server's protocol version and session limit
    Probe(cmd::probe::ProbeArgs),
    /// Runs the genetic search for a cheap suppression pattern
    Search(cmd::search::SearchArgs),
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    info!("🚀 Initializing TabShield...");
    info!("🔌 Solver server: {}", cli.backend.base_url());

    let outcome = match cli.command {
        Commands::Probe(args) => cmd::probe::run(args, &cli.backend).await,
        Commands::Search(args) => cmd::search::run(args, &cli.backend).await,
    };

    if let Err(e) = outcome {
        error!("❌ {} stage failed: {}", e.stage(), e);
        process::exit(1);
    }
}
