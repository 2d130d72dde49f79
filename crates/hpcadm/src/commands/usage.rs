//! CPU-hour usage report subcommand.

use crate::context::Context;
use anyhow::Context as _;
use chrono::NaiveDate;
use clap::Args;
use hpcadm_slurm::{ElapsedStrategy, ReportWindow, SacctClient};
use hpcadm_tasks::usage_report;

/// Arguments for `hpcadm usage`.
#[derive(Args, Debug)]
pub struct UsageArgs {
    /// Restrict to one accounting account
    #[arg(long)]
    pub account: Option<String>,

    /// Restrict to one user
    #[arg(long)]
    pub user: Option<String>,

    /// Window start date (YYYY-MM-DD); defaults to the previous month
    #[arg(long, requires = "end")]
    pub start: Option<NaiveDate>,

    /// Window end date (YYYY-MM-DD), inclusive
    #[arg(long, requires = "start")]
    pub end: Option<NaiveDate>,

    /// Charge wall time (end minus start) instead of reported elapsed
    #[arg(long, conflicts_with = "calc3")]
    pub calc2: bool,

    /// Charge wall time minus suspended time
    #[arg(long)]
    pub calc3: bool,

    /// Restrict to a named cluster
    #[arg(long)]
    pub cluster: Option<String>,
}

pub async fn execute(ctx: &Context, args: UsageArgs) -> anyhow::Result<()> {
    let window = match (args.start, args.end) {
        (Some(start), Some(end)) => ReportWindow {
            start: start
                .and_hms_opt(0, 0, 0)
                .context("invalid start date")?,
            end: end.and_hms_opt(23, 59, 59).context("invalid end date")?,
        },
        _ => ReportWindow::previous_month(),
    };

    let strategy = if args.calc3 {
        ElapsedStrategy::EndMinusStartMinusSuspended
    } else if args.calc2 {
        ElapsedStrategy::EndMinusStart
    } else {
        ElapsedStrategy::Reported
    };

    let mut sacct = SacctClient::with_runner(ctx.runner());
    if let Some(cluster) = &args.cluster {
        sacct = sacct.with_cluster(cluster.clone());
    }

    let summary = usage_report::summarize(
        &sacct,
        &window,
        args.account.as_deref(),
        args.user.as_deref(),
        strategy,
    )
    .await?;
    println!("{}", usage_report::usage_table(&summary));
    Ok(())
}
