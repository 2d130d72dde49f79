//! Settings loading and client construction shared by the subcommands.

use anyhow::Context as _;
use hpcadm_actmgr::ActmgrClient;
use hpcadm_core::run::{CommandRunner, TokioCommandRunner};
use hpcadm_core::settings::{EnvironmentSettings, Settings};
use hpcadm_directory::{DirectoryClient, DirectoryConfig};
use hpcadm_pulp::PulpClient;
use hpcadm_storage::ZfsClient;
use std::path::Path;
use std::sync::Arc;

/// Loaded settings plus the selected environment name.
pub struct Context {
    settings: Settings,
    environment: String,
}

impl Context {
    /// Loads settings from the given path or from `$HPCADM_CONFIG`, and
    /// checks that the selected environment exists.
    pub fn load(config: Option<&Path>, environment: &str) -> anyhow::Result<Self> {
        let settings = match config {
            Some(path) => Settings::load(path),
            None => Settings::from_env(),
        }
        .context("failed to load settings")?;
        settings
            .environment(environment)
            .with_context(|| format!("unknown settings environment `{environment}`"))?;
        Ok(Self {
            settings,
            environment: environment.to_string(),
        })
    }

    /// The selected environment's settings.
    pub fn environment(&self) -> anyhow::Result<&EnvironmentSettings> {
        Ok(self.settings.environment(&self.environment)?)
    }

    /// Runner that executes real commands.
    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::new(TokioCommandRunner)
    }

    /// Directory client for the environment's LDAP server.
    pub fn directory(&self) -> anyhow::Result<DirectoryClient> {
        let config = DirectoryConfig::from_settings(&self.environment()?.ldap)?;
        Ok(DirectoryClient::new(config))
    }

    /// Billing API client.
    pub fn actmgr(&self) -> anyhow::Result<ActmgrClient> {
        Ok(ActmgrClient::from_settings(self.environment()?.actmgr()?)?)
    }

    /// Pulp API client.
    pub fn pulp(&self) -> anyhow::Result<PulpClient> {
        Ok(PulpClient::from_settings(self.environment()?.pulp()?)?)
    }

    /// ZFS client, remote when the environment's homes live on another
    /// host.
    pub fn zfs(&self) -> anyhow::Result<ZfsClient> {
        let home = self.environment()?.account_home()?;
        let mut zfs = ZfsClient::with_runner(self.runner());
        if let Some(host) = &home.zfs_server {
            zfs = zfs.with_remote_host(host.clone());
        }
        Ok(zfs)
    }
}
