//! Pulp repository server subcommands.

use crate::context::Context;
use clap::{Args, Subcommand};
use hpcadm_pulp::reports::{self, RepoFields};

/// Arguments for `hpcadm pulp`.
#[derive(Args, Debug)]
pub struct PulpArgs {
    #[command(subcommand)]
    pub command: PulpCommands,
}

#[derive(Subcommand, Debug)]
pub enum PulpCommands {
    /// List repositories with sync/publish state
    Repos(ReposArgs),

    /// List a repository's packages, or diff two repositories
    Content(ContentArgs),

    /// List server tasks
    Tasks(TasksArgs),
}

#[derive(Args, Debug)]
pub struct ReposArgs {
    /// Restrict to these repository ids
    #[arg(long = "repo")]
    pub repos: Vec<String>,

    /// Show flags and unit counts instead of sync state
    #[arg(long)]
    pub details: bool,
}

#[derive(Args, Debug)]
pub struct ContentArgs {
    #[command(subcommand)]
    pub command: ContentCommands,
}

#[derive(Subcommand, Debug)]
pub enum ContentCommands {
    /// List the rpm packages of one repository
    List(ContentListArgs),

    /// Packages present in one repository but not another
    Diff(ContentDiffArgs),
}

#[derive(Args, Debug)]
pub struct ContentListArgs {
    /// Repository to list
    #[arg(long)]
    pub repo_id: String,

    /// Regex filter on package name
    #[arg(long = "match")]
    pub name_match: Option<String>,
}

#[derive(Args, Debug)]
pub struct ContentDiffArgs {
    /// Repository whose extra packages are reported
    #[arg(long)]
    pub from_repo_id: String,

    /// Repository to compare against
    #[arg(long)]
    pub to_repo_id: String,

    /// Regex filter on package name
    #[arg(long = "match")]
    pub name_match: Option<String>,
}

#[derive(Args, Debug)]
pub struct TasksArgs {
    /// Restrict to these task states
    #[arg(long = "state")]
    pub states: Vec<String>,
}

pub async fn execute(ctx: &Context, args: PulpArgs) -> anyhow::Result<()> {
    let pulp = ctx.pulp()?;

    match args.command {
        PulpCommands::Repos(args) => {
            let fields = if args.details {
                RepoFields::Details
            } else {
                RepoFields::Summary
            };
            let table = reports::repository_table(&pulp, &args.repos, fields).await?;
            println!("{table}");
        }
        PulpCommands::Content(args) => match args.command {
            ContentCommands::List(args) => {
                let table =
                    reports::content_table(&pulp, &args.repo_id, args.name_match.as_deref())
                        .await?;
                println!("{table}");
            }
            ContentCommands::Diff(args) => {
                let missing = reports::content_diff(
                    &pulp,
                    &args.from_repo_id,
                    &args.to_repo_id,
                    args.name_match.as_deref(),
                )
                .await?;
                for label in missing {
                    println!("{label}");
                }
            }
        },
        PulpCommands::Tasks(args) => {
            let table = reports::task_table(&pulp, &args.states).await?;
            println!("{table}");
        }
    }
    Ok(())
}
