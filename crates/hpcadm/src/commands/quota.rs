//! ZFS quota reconciliation subcommand.

use crate::context::Context;
use clap::Args;
use hpcadm_tasks::quota_sync::QuotaSyncTask;

/// Arguments for `hpcadm quota-sync`.
#[derive(Args, Debug)]
pub struct QuotaSyncArgs {
    /// Include users whose login shell is disabled
    #[arg(long)]
    pub all: bool,

    /// Show what would change without setting any quota
    #[arg(long)]
    pub noop: bool,
}

pub async fn execute(ctx: &Context, args: QuotaSyncArgs) -> anyhow::Result<()> {
    let env = ctx.environment()?;
    let mut task = QuotaSyncTask::new(
        ctx.directory()?,
        ctx.zfs()?,
        env.ldap.people_base()?,
        env.account_home()?.zfs_pool.clone(),
    );
    if args.all {
        task = task.include_inactive();
    }

    let report = task.run(args.noop).await?;
    println!("{}", report.table());
    Ok(())
}
