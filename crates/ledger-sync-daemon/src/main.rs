//! Ledger sync daemon: drives the multi-tenant sync engine from the command line.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ledger_config_and_utils::{init_logging, Config, Paths};

/// Ledger sync command-line interface.
#[derive(Parser)]
#[command(name = "ledger-sync")]
#[command(about = "Offline-first sync engine for tenant ledgers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, logs, and tenant databases. Defaults to ~/.ledger-sync
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one tenant once and exit
    Sync {
        /// Tenant to sync
        #[arg(short, long)]
        tenant: String,

        /// Discard the local watermark and re-pull everything
        #[arg(long)]
        replacement: bool,
    },
    /// Keep the given tenants in sync until interrupted
    Run {
        /// Tenants to sync (repeatable)
        #[arg(short, long = "tenant", required = true)]
        tenants: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, Some(paths.log_file()));

    match cli.command {
        Commands::Sync {
            tenant,
            replacement,
        } => app::sync_once(&config, &paths, tenant, replacement).await,
        Commands::Run { tenants } => app::run(&config, &paths, tenants).await,
    }
}
