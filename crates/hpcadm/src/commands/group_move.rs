//! Primary-group migration subcommand.

use crate::context::Context;
use clap::Args;
use hpcadm_slurm::SacctmgrClient;
use hpcadm_tasks::group_move::GroupMoveTask;

/// Arguments for `hpcadm group-move`.
#[derive(Args, Debug)]
pub struct GroupMoveArgs {
    /// User to move
    #[arg(long)]
    pub username: String,

    /// Current primary group name
    #[arg(long)]
    pub old_group: String,

    /// New primary group name
    #[arg(long)]
    pub new_group: String,

    /// Show the plan without changing anything
    #[arg(long)]
    pub noop: bool,
}

pub async fn execute(ctx: &Context, args: GroupMoveArgs) -> anyhow::Result<()> {
    let env = ctx.environment()?;
    let task = GroupMoveTask::new(
        ctx.directory()?,
        ctx.actmgr()?,
        SacctmgrClient::new(),
        ctx.runner(),
        env.account_home()?.clone(),
        env.ldap.people_base()?,
        env.ldap.group_base()?,
    );

    let report = task
        .run(&args.username, &args.old_group, &args.new_group, args.noop)
        .await?;

    for line in &report.skipped {
        println!("already done: {line}");
    }
    for line in &report.applied {
        if args.noop {
            println!("would apply: {line}");
        } else {
            println!("applied: {line}");
        }
    }
    Ok(())
}
