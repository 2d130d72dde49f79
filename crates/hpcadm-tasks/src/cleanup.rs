//! Removal and reporting of disabled accounts' leftover resources.
//!
//! An account is eligible for cleanup when the billing backend marks it
//! CLOSED, it is not on an exclusion list, and its login shell has been
//! set to the disabled shell. Cleanup removes home/scratch trees and the
//! accounting-database user; report mode tabulates what still exists.

use crate::Result;
use comfy_table::{presets, Table};
use hpcadm_actmgr::{Account, AccountFilter, ActmgrClient};
use hpcadm_core::bytes::format_bytes;
use hpcadm_core::run::CommandRunner;
use hpcadm_core::settings::AccountHomeSettings;
use hpcadm_slurm::{SacctmgrClient, UsernameCache};
use hpcadm_storage::{AccountHome, CleanupOutcome, PasswdLookup, UsageResolver};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Billing status name marking deprovisioned accounts.
const CLOSED_STATUS: &str = "CLOSED";

/// Login shell expected on a disabled account.
const DISABLED_SHELL: &str = "/sbin/nologin";

/// Why an account was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// On the configured exclusion list.
    Excluded,
    /// Login shell is not the disabled shell; the named shell is live.
    ActiveShell(String),
}

/// Accounts split into cleanup candidates and skipped entries.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    /// Usernames safe to act on.
    pub eligible: Vec<String>,
    /// Usernames left alone, with the reason.
    pub skipped: Vec<(String, SkipReason)>,
}

/// Splits CLOSED accounts into eligible and skipped sets.
///
/// Accounts with no passwd entry at all are eligible: they have already
/// been removed from the directory and only their files remain.
pub fn select_candidates(
    accounts: &[Account],
    excludes: &BTreeSet<String>,
    passwd: &dyn PasswdLookup,
) -> Result<Candidates> {
    let mut candidates = Candidates::default();
    for account in accounts {
        let username = account.username.clone();
        if excludes.contains(&username) {
            candidates.skipped.push((username, SkipReason::Excluded));
            continue;
        }
        match passwd.shell(&username)? {
            Some(shell) if shell != DISABLED_SHELL => {
                warn!(user = %username, shell = %shell, "login shell is still active, skipping");
                candidates
                    .skipped
                    .push((username, SkipReason::ActiveShell(shell)));
            }
            _ => candidates.eligible.push(username),
        }
    }
    Ok(candidates)
}

/// Result of cleaning up one account.
#[derive(Debug, Clone)]
pub struct AccountCleanup {
    /// Account acted on.
    pub username: String,
    /// Filesystem paths touched, empty when nothing existed.
    pub outcome: CleanupOutcome,
    /// True when the accounting-database user was (or would be) deleted.
    pub slurm_deleted: bool,
    /// True when an ownership mismatch blocked filesystem removal.
    pub ownership_blocked: bool,
}

/// Cleans up resources of CLOSED accounts.
pub struct CleanupTask {
    actmgr: ActmgrClient,
    sacctmgr: SacctmgrClient,
    storage: AccountHomeSettings,
    passwd: Box<dyn PasswdLookup>,
    runner: Arc<dyn CommandRunner>,
    extra_excludes: Vec<String>,
}

impl CleanupTask {
    /// Assembles the task from per-system handles.
    #[must_use]
    pub fn new(
        actmgr: ActmgrClient,
        sacctmgr: SacctmgrClient,
        storage: AccountHomeSettings,
        passwd: Box<dyn PasswdLookup>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            actmgr,
            sacctmgr,
            storage,
            passwd,
            runner,
            extra_excludes: Vec::new(),
        }
    }

    /// Adds usernames to the exclusion list for this run.
    #[must_use]
    pub fn with_excludes(mut self, usernames: Vec<String>) -> Self {
        self.extra_excludes = usernames;
        self
    }

    fn excludes(&self) -> BTreeSet<String> {
        self.storage
            .cleanup_exclude
            .iter()
            .chain(self.extra_excludes.iter())
            .cloned()
            .collect()
    }

    async fn disabled_accounts(&self, username: Option<&str>) -> Result<Vec<Account>> {
        let closed = self.actmgr.get_status(CLOSED_STATUS).await?;
        let filter = match username {
            Some(name) => AccountFilter::by_username(name).with_status(closed.id),
            None => AccountFilter::by_status(closed.id),
        };
        self.actmgr.list_accounts(&filter).await
    }

    /// Removes home/scratch trees and accounting users of eligible
    /// accounts. With `dry_run`, plans are reported and nothing changes.
    pub async fn run(
        &self,
        username: Option<&str>,
        dry_run: bool,
    ) -> Result<Vec<AccountCleanup>> {
        let accounts = self.disabled_accounts(username).await?;
        let candidates = select_candidates(&accounts, &self.excludes(), self.passwd.as_ref())?;

        let mut cache = UsernameCache::new();
        let mut results = Vec::new();
        for username in candidates.eligible {
            let home = AccountHome::new(&username, &self.storage);

            let mut owned = true;
            let mut targets = vec![home.home().to_path_buf(), home.scratch().to_path_buf()];
            targets.extend(home.extra_directories());
            for path in &targets {
                owned &= home.check_owner(path, self.passwd.as_ref())?;
            }
            let outcome = if owned {
                home.cleanup(dry_run)?
            } else {
                warn!(user = %username, "ownership mismatch, leaving files in place");
                CleanupOutcome::default()
            };

            let in_slurm = cache.contains(&self.sacctmgr, &username).await?;
            if in_slurm {
                if dry_run {
                    info!(user = %username, "would delete accounting user");
                } else {
                    self.sacctmgr.delete_user(&username).await?;
                }
            }

            results.push(AccountCleanup {
                username,
                outcome,
                slurm_deleted: in_slurm,
                ownership_blocked: !owned,
            });
        }
        Ok(results)
    }

    /// Tabulates what each CLOSED account still occupies. With
    /// `with_space`, per-path byte usage is resolved and totalled.
    pub async fn report(&self, username: Option<&str>, with_space: bool) -> Result<Table> {
        let accounts = self.disabled_accounts(username).await?;
        let excludes = self.excludes();
        let resolver = if with_space {
            Some(UsageResolver::new(&self.storage, self.runner.clone())?)
        } else {
            None
        };

        let mut cache = UsernameCache::new();
        let mut table = Table::new();
        table.load_preset(presets::ASCII_FULL);
        let mut headers = vec!["Username", "Home", "Scratch", "Extra", "Slurm"];
        if with_space {
            headers.extend(["Home Space", "Scratch Space", "Extra Space"]);
        }
        table.set_header(headers);

        let mut totals = [0_u64; 3];
        for account in &accounts {
            if excludes.contains(&account.username) {
                continue;
            }
            let home = AccountHome::new(&account.username, &self.storage);
            let extra = home.extra_directories();
            let in_slurm = cache.contains(&self.sacctmgr, &account.username).await?;

            let mut row = vec![
                account.username.clone(),
                yes_no(home.home_exists()),
                yes_no(home.scratch_exists()),
                extra.len().to_string(),
                yes_no(in_slurm),
            ];

            if let Some(resolver) = &resolver {
                let home_space = resolver.space_used(home.home(), &account.username).await?;
                let scratch_space = resolver
                    .space_used(home.scratch(), &account.username)
                    .await?;
                let mut extra_space = 0;
                for path in &extra {
                    extra_space += resolver.space_used(path, &account.username).await?;
                }
                totals[0] += home_space;
                totals[1] += scratch_space;
                totals[2] += extra_space;
                row.extend([
                    format_bytes(home_space),
                    format_bytes(scratch_space),
                    format_bytes(extra_space),
                ]);
            }
            table.add_row(row);
        }

        if with_space {
            table.add_row(vec![
                "TOTAL".to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                format_bytes(totals[0]),
                format_bytes(totals[1]),
                format_bytes(totals[2]),
            ]);
        }
        Ok(table)
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}
