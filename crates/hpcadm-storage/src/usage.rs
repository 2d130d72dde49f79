//! Space-used resolution for account directories.
//!
//! Three sources, tried in order: ZFS `userused` for home trees, the
//! BeeGFS per-user report for scratch trees, and a `du -sx` fallback for
//! anything else.

use crate::zfs::ZfsClient;
use crate::Result;
use hpcadm_core::run::CommandRunner;
use hpcadm_core::settings::AccountHomeSettings;
use hpcadm_core::Error;
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct BeegfsEntry {
    name: String,
    #[serde(deserialize_with = "de_space")]
    space: u64,
}

// Report generators emit space either as a number or a decimal string.
fn de_space<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Per-user space report exported by the BeeGFS quota tooling.
#[derive(Debug, Clone, Default)]
pub struct BeegfsReport {
    space_by_user: HashMap<String, u64>,
}

impl BeegfsReport {
    /// Loads the report from its JSON file. A missing file yields an
    /// empty report; the resolver then falls back to `du`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            debug!(path = %path.display(), "no BeeGFS report present");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|err| Error::IoError {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let entries: Vec<BeegfsEntry> = serde_json::from_str(&text)
            .map_err(|err| Error::ParseError(format!("invalid BeeGFS report: {err}")))?;

        Ok(Self {
            space_by_user: entries
                .into_iter()
                .map(|entry| (entry.name, entry.space))
                .collect(),
        })
    }

    /// Space used by a user, when the report covers them.
    #[must_use]
    pub fn space_for(&self, username: &str) -> Option<u64> {
        self.space_by_user.get(username).copied()
    }
}

/// Resolves bytes used under an account directory.
pub struct UsageResolver {
    zfs: ZfsClient,
    runner: Arc<dyn CommandRunner>,
    home_base: PathBuf,
    home_dataset: String,
    scratch_bases: Vec<PathBuf>,
    beegfs: BeegfsReport,
    // The BeeGFS report is filesystem-wide, so a user's space is counted
    // against the first scratch path queried and not again.
    beegfs_counted: Mutex<HashSet<String>>,
}

impl UsageResolver {
    /// Builds a resolver from the storage settings, loading the BeeGFS
    /// report eagerly.
    pub fn new(settings: &AccountHomeSettings, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let mut zfs = ZfsClient::with_runner(runner.clone());
        if let Some(host) = &settings.zfs_server {
            zfs = zfs.with_remote_host(host.clone());
        }

        let mut scratch_bases = vec![settings.scratch_base.clone()];
        scratch_bases.extend(settings.extra_scratch_directories.clone());

        Ok(Self {
            zfs,
            runner,
            home_base: settings.base_dir.clone(),
            home_dataset: settings.home_dataset.clone(),
            scratch_bases,
            beegfs: BeegfsReport::load(&settings.beegfs_report)?,
            beegfs_counted: Mutex::new(HashSet::new()),
        })
    }

    /// Bytes used under `path` by `username`. Missing paths use 0.
    pub async fn space_used(&self, path: &Path, username: &str) -> Result<u64> {
        if !path.is_dir() {
            return Ok(0);
        }

        if path.parent() == Some(self.home_base.as_path()) {
            return self.zfs.get_userused(username, &self.home_dataset).await;
        }

        if self
            .scratch_bases
            .iter()
            .any(|base| path.starts_with(base))
        {
            if let Some(space) = self.beegfs.space_for(username) {
                let mut counted = self
                    .beegfs_counted
                    .lock()
                    .map_err(|_| Error::InternalError("BeeGFS dedup lock poisoned".to_string()))?;
                if counted.insert(username.to_string()) {
                    return Ok(space);
                }
                return Ok(0);
            }
        }

        self.du(path).await
    }

    async fn du(&self, path: &Path) -> Result<u64> {
        let path_str = path.display().to_string();
        let args = vec!["-s".to_string(), "-x".to_string(), path_str.clone()];
        let output = self.runner.run("du", &args).await?;

        let line = output.stdout.trim();
        let mut fields = line.split_whitespace();
        let blocks = fields
            .next()
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| Error::ParseError(format!("unexpected du output: {line:?}")))?;
        let echoed = fields
            .next()
            .ok_or_else(|| Error::ParseError(format!("unexpected du output: {line:?}")))?;
        if echoed != path_str {
            return Err(Error::IntegrityError(format!(
                "du reported {echoed:?}, expected {path_str:?}"
            )));
        }
        Ok(blocks * 1024)
    }
}
