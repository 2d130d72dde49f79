//! Disabled-account cleanup subcommand.

use crate::context::Context;
use clap::Args;
use hpcadm_slurm::SacctmgrClient;
use hpcadm_storage::SystemPasswd;
use hpcadm_tasks::cleanup::CleanupTask;

/// Arguments for `hpcadm cleanup`.
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Restrict to one account
    #[arg(long)]
    pub account: Option<String>,

    /// Accounts to leave alone, comma separated
    #[arg(long, value_delimiter = ',')]
    pub exclude_accounts: Vec<String>,

    /// Tabulate what still exists instead of removing it
    #[arg(long)]
    pub report: bool,

    /// Like --report, with per-path space usage
    #[arg(long)]
    pub report_space: bool,

    /// Show what would be removed without touching anything
    #[arg(long)]
    pub noop: bool,
}

pub async fn execute(ctx: &Context, args: CleanupArgs) -> anyhow::Result<()> {
    let env = ctx.environment()?;
    let task = CleanupTask::new(
        ctx.actmgr()?,
        SacctmgrClient::new(),
        env.account_home()?.clone(),
        Box::new(SystemPasswd),
        ctx.runner(),
    )
    .with_excludes(args.exclude_accounts);

    if args.report || args.report_space {
        let table = task
            .report(args.account.as_deref(), args.report_space)
            .await?;
        println!("{table}");
        return Ok(());
    }

    let results = task.run(args.account.as_deref(), args.noop).await?;
    for result in &results {
        let verb = if args.noop { "would remove" } else { "removed" };
        println!(
            "{}: {verb} {} path(s), accounting user {}",
            result.username,
            result.outcome.paths.len(),
            if result.slurm_deleted {
                if args.noop {
                    "would be deleted"
                } else {
                    "deleted"
                }
            } else {
                "not present"
            },
        );
        if result.ownership_blocked {
            println!("{}: files left in place, ownership mismatch", result.username);
        }
    }
    Ok(())
}
