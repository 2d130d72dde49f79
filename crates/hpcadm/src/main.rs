//! hpcadm - cluster account and repository administration.
//!
//! Subcommands cover the recurring maintenance work of the cluster:
//! moving users between groups, reconciling ZFS quotas with the
//! directory, cleaning up disabled accounts, CPU-hour usage reports,
//! and Pulp repository server reports.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod context;

/// Cluster account and repository administration.
#[derive(Parser)]
#[command(name = "hpcadm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file path; defaults to $HPCADM_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Settings environment to use
    #[arg(long, global = true, default_value = "production")]
    env: String,

    /// Enable debug-level logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move a user to a new primary group across all systems
    GroupMove(commands::group_move::GroupMoveArgs),

    /// Reconcile ZFS user quotas with the directory
    QuotaSync(commands::quota::QuotaSyncArgs),

    /// Remove or report resources of disabled accounts
    Cleanup(commands::cleanup::CleanupArgs),

    /// CPU-hour usage summaries from the accounting database
    Usage(commands::usage::UsageArgs),

    /// Pulp repository server reports
    Pulp(commands::pulp::PulpArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let ctx = context::Context::load(cli.config.as_deref(), &cli.env)?;

    match cli.command {
        Commands::GroupMove(args) => commands::group_move::execute(&ctx, args).await,
        Commands::QuotaSync(args) => commands::quota::execute(&ctx, args).await,
        Commands::Cleanup(args) => commands::cleanup::execute(&ctx, args).await,
        Commands::Usage(args) => commands::usage::execute(&ctx, args).await,
        Commands::Pulp(args) => commands::pulp::execute(&ctx, args).await,
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
