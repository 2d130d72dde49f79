//! Per-account home/scratch directory management.

use crate::passwd::PasswdLookup;
use crate::Result;
use hpcadm_core::settings::AccountHomeSettings;
use hpcadm_core::Error;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Owners other than the account itself that are acceptable on its paths.
const OWNER_ALLOWLIST: [&str; 2] = ["root", "badquota"];

/// What was (or would be) done to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupAction {
    /// Directory tree removed recursively.
    Removed,
    /// Symlink unlinked.
    Unlinked,
    /// Dry run; nothing touched.
    Planned,
}

/// Per-path cleanup record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCleanup {
    /// Path acted on.
    pub path: PathBuf,
    /// Action taken.
    pub action: CleanupAction,
    /// True when the path was confirmed gone afterwards.
    pub verified: bool,
}

/// Outcome of an account cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Records for every path that existed.
    pub paths: Vec<PathCleanup>,
}

impl CleanupOutcome {
    /// True when nothing existed to clean up.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// The filesystem footprint of one account: home, scratch, and any extra
/// per-user directories.
#[derive(Debug, Clone)]
pub struct AccountHome {
    username: String,
    home: PathBuf,
    scratch: PathBuf,
    extra_bases: Vec<PathBuf>,
}

impl AccountHome {
    /// Derives the account's paths from the storage settings.
    #[must_use]
    pub fn new(username: impl Into<String>, settings: &AccountHomeSettings) -> Self {
        let username = username.into();
        Self {
            home: settings.base_dir.join(&username),
            scratch: settings.scratch_base.join(&username),
            extra_bases: settings.extra_scratch_directories.clone(),
            username,
        }
    }

    /// The account name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Home directory path.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Scratch directory path.
    #[must_use]
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// True when the home directory exists.
    #[must_use]
    pub fn home_exists(&self) -> bool {
        self.home.is_dir()
    }

    /// True when the scratch directory exists.
    #[must_use]
    pub fn scratch_exists(&self) -> bool {
        self.scratch.is_dir()
    }

    /// Extra per-user directories that currently exist.
    #[must_use]
    pub fn extra_directories(&self) -> Vec<PathBuf> {
        self.extra_bases
            .iter()
            .map(|base| base.join(&self.username))
            .filter(|path| path.is_dir())
            .collect()
    }

    /// Checks that a path is owned by the account (or an allowlisted
    /// system owner). Mismatches are logged and reported, not fatal.
    pub fn check_owner(&self, path: &Path, passwd: &dyn PasswdLookup) -> Result<bool> {
        if !path.is_dir() {
            return Ok(true);
        }
        let uid = fs::metadata(path)
            .map_err(|err| Error::IoError {
                path: path.display().to_string(),
                message: err.to_string(),
            })?
            .uid();

        match passwd.name_for_uid(uid)? {
            Some(owner)
                if owner == self.username || OWNER_ALLOWLIST.contains(&owner.as_str()) =>
            {
                debug!(path = %path.display(), owner, "ownership check passed");
                Ok(true)
            }
            Some(owner) => {
                warn!(
                    path = %path.display(),
                    owner,
                    expected = self.username,
                    "OWNERSHIP MISMATCH"
                );
                Ok(false)
            }
            None => {
                warn!(
                    path = %path.display(),
                    uid,
                    expected = self.username,
                    "OWNERSHIP MISMATCH: uid has no passwd entry"
                );
                Ok(false)
            }
        }
    }

    /// Removes the account's home, scratch, and extra directories.
    ///
    /// Paths that do not exist are skipped, so re-running after a
    /// successful cleanup is a no-op. Symlinks are unlinked rather than
    /// followed. With `dry_run` every existing path is recorded as
    /// planned and nothing is touched.
    pub fn cleanup(&self, dry_run: bool) -> Result<CleanupOutcome> {
        let mut outcome = CleanupOutcome::default();

        let mut targets = Vec::new();
        if self.home_exists() {
            targets.push(self.home.clone());
        } else {
            debug!(username = self.username, "home not found, skipping");
        }
        if self.scratch_exists() {
            targets.push(self.scratch.clone());
        } else {
            debug!(username = self.username, "scratch not found, skipping");
        }
        targets.extend(self.extra_directories());

        for path in targets {
            outcome.paths.push(remove_path(&path, dry_run)?);
        }

        Ok(outcome)
    }
}

fn remove_path(path: &Path, dry_run: bool) -> Result<PathCleanup> {
    let is_symlink = path
        .symlink_metadata()
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);

    if dry_run {
        info!(path = %path.display(), "would remove");
        return Ok(PathCleanup {
            path: path.to_path_buf(),
            action: CleanupAction::Planned,
            verified: false,
        });
    }

    info!(path = %path.display(), "removing");
    let result = if is_symlink {
        fs::remove_file(path)
    } else {
        fs::remove_dir_all(path)
    };
    result.map_err(|err| Error::IoError {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;

    let verified = path.symlink_metadata().is_err();
    if verified {
        info!(path = %path.display(), "removed");
    } else {
        warn!(path = %path.display(), "still present after removal");
    }

    Ok(PathCleanup {
        path: path.to_path_buf(),
        action: if is_symlink {
            CleanupAction::Unlinked
        } else {
            CleanupAction::Removed
        },
        verified,
    })
}
