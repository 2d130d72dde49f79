//! Per-environment settings file loading.
//!
//! The toolkit is driven by a YAML settings file holding one section per
//! environment (`production`, `staging`, ...). The file path comes from an
//! explicit argument or the `HPCADM_CONFIG` environment variable; settings
//! are loaded once and passed explicitly to each component instead of
//! living in module-level state.

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Environment variable naming the settings file.
pub const SETTINGS_PATH_VAR: &str = "HPCADM_CONFIG";

/// Default BeeGFS per-user space report location.
pub const DEFAULT_BEEGFS_REPORT: &str = "/tmp/beegfs_userspace.json";

/// Full settings file: a map of environment name to environment settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    environments: BTreeMap<String, EnvironmentSettings>,
}

impl Settings {
    /// Load settings from the given YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| Error::ConfigError(format!(
            "failed to read settings file {}: {err}",
            path.display()
        )))?;
        let settings: Self = serde_yaml::from_str(&raw)?;
        for (name, environment) in &settings.environments {
            environment.validate().map_err(|err| {
                Error::ConfigError(format!("invalid settings for environment `{name}`: {err}"))
            })?;
        }
        Ok(settings)
    }

    /// Load settings from the file named by [`SETTINGS_PATH_VAR`].
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(SETTINGS_PATH_VAR).map_err(|_| {
            Error::ConfigError(format!("{SETTINGS_PATH_VAR} is not set"))
        })?;
        Self::load(path)
    }

    /// Look up an environment by name.
    pub fn environment(&self, name: &str) -> Result<&EnvironmentSettings> {
        self.environments
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("settings environment `{name}`")))
    }

    /// Names of the configured environments.
    #[must_use]
    pub fn environment_names(&self) -> Vec<&str> {
        self.environments.keys().map(String::as_str).collect()
    }
}

/// Settings for one environment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnvironmentSettings {
    /// Directory (LDAP) connection settings.
    #[validate(nested)]
    pub ldap: LdapSettings,

    /// Account-management API settings, when the environment has one.
    #[validate(nested)]
    pub actmgr: Option<ActmgrSettings>,

    /// Account home/scratch layout, when the environment has one.
    pub account_home: Option<AccountHomeSettings>,

    /// Pulp repository-manager settings, when the environment has one.
    pub pulp: Option<PulpSettings>,
}

impl EnvironmentSettings {
    /// Account-management settings, or a config error when absent.
    pub fn actmgr(&self) -> Result<&ActmgrSettings> {
        self.actmgr
            .as_ref()
            .ok_or_else(|| Error::ConfigError("no actmgr settings for this environment".into()))
    }

    /// Account home settings, or a config error when absent.
    pub fn account_home(&self) -> Result<&AccountHomeSettings> {
        self.account_home.as_ref().ok_or_else(|| {
            Error::ConfigError("no account_home settings for this environment".into())
        })
    }

    /// Pulp settings, or a config error when absent.
    pub fn pulp(&self) -> Result<&PulpSettings> {
        self.pulp
            .as_ref()
            .ok_or_else(|| Error::ConfigError("no pulp settings for this environment".into()))
    }
}

/// Directory (LDAP) connection settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LdapSettings {
    /// Candidate server URLs; the first entry is used.
    #[validate(length(min = 1))]
    pub url: Vec<String>,

    /// Negotiate StartTLS after connecting.
    #[serde(default)]
    pub tls: bool,

    /// Bind DN; anonymous bind when absent.
    #[serde(default)]
    pub bind_dn: Option<String>,

    /// Bind password.
    #[serde(default)]
    pub bind_password: Option<SecretString>,

    /// Base DN of user entries.
    #[serde(default)]
    pub people_base: Option<String>,

    /// Base DN of group entries.
    #[serde(default)]
    pub group_base: Option<String>,
}

impl LdapSettings {
    /// The server URL to connect to.
    pub fn primary_url(&self) -> Result<&str> {
        self.url
            .first()
            .map(String::as_str)
            .ok_or_else(|| Error::ConfigError("ldap.url is empty".into()))
    }

    /// The user-entry base DN, or a config error when absent.
    pub fn people_base(&self) -> Result<&str> {
        self.people_base
            .as_deref()
            .ok_or_else(|| Error::ConfigError("ldap.people_base is not set".into()))
    }

    /// The group-entry base DN, or a config error when absent.
    pub fn group_base(&self) -> Result<&str> {
        self.group_base
            .as_deref()
            .ok_or_else(|| Error::ConfigError("ldap.group_base is not set".into()))
    }
}

/// Account-management REST API settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ActmgrSettings {
    /// API host name.
    #[validate(length(min = 1))]
    pub host: String,

    /// Optional TCP port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Use HTTPS (default true).
    #[serde(default = "default_https")]
    pub https: bool,

    /// API token, sent as `Authorization: Token token=<...>`.
    pub auth_token: SecretString,
}

const fn default_https() -> bool {
    true
}

impl ActmgrSettings {
    /// Assemble the base URL from host/port/scheme.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        match self.port {
            Some(port) => format!("{scheme}://{}:{port}/", self.host),
            None => format!("{scheme}://{}/", self.host),
        }
    }
}

/// Filesystem layout for account home directories.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountHomeSettings {
    /// Base directory of home trees (one subdirectory per username).
    pub base_dir: PathBuf,

    /// Base directory of scratch trees.
    pub scratch_base: PathBuf,

    /// Additional per-user directory bases to manage.
    #[serde(default)]
    pub extra_scratch_directories: Vec<PathBuf>,

    /// Usernames never touched by cleanup.
    #[serde(default)]
    pub cleanup_exclude: Vec<String>,

    /// Host to query for ZFS home usage, when homes live on a remote pool.
    #[serde(default)]
    pub zfs_server: Option<String>,

    /// ZFS pool backing the quota mounts.
    #[serde(default = "default_zfs_pool")]
    pub zfs_pool: String,

    /// ZFS dataset holding home directories.
    #[serde(default = "default_home_dataset")]
    pub home_dataset: String,

    /// Path of the BeeGFS per-user space report.
    #[serde(default = "default_beegfs_report")]
    pub beegfs_report: PathBuf,
}

fn default_zfs_pool() -> String {
    "tank".to_string()
}

fn default_home_dataset() -> String {
    "tank/home".to_string()
}

fn default_beegfs_report() -> PathBuf {
    PathBuf::from(DEFAULT_BEEGFS_REPORT)
}

/// Pulp repository-manager settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PulpSettings {
    /// Pulp server host name.
    pub hostname: String,

    /// API username.
    pub username: String,

    /// API password.
    pub password: SecretString,
}

impl PulpSettings {
    /// Base URL of the v2 API.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("https://{}/pulp/api/v2/", self.hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
production:
  ldap:
    url:
      - ldap://ldap1.cluster.example.edu
      - ldap://ldap2.cluster.example.edu
    tls: true
    bind_dn: cn=maintenance,dc=cluster,dc=example,dc=edu
    bind_password: hunter2
    people_base: ou=People,dc=cluster,dc=example,dc=edu
    group_base: ou=Groups,dc=cluster,dc=example,dc=edu
  actmgr:
    host: accounts.cluster.example.edu
    https: true
    auth_token: tok123
  account_home:
    base_dir: /home
    scratch_base: /fdata/scratch
    extra_scratch_directories:
      - /fdata/projects
    cleanup_exclude:
      - root
  pulp:
    hostname: repo.cluster.example.edu
    username: admin
    password: secret
staging:
  ldap:
    url:
      - ldap://ldap.staging.example.edu
"#;

    fn write_sample() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_parses_environments() {
        let file = write_sample();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.environment_names(), vec!["production", "staging"]);

        let production = settings.environment("production").unwrap();
        assert!(production.ldap.tls);
        assert_eq!(
            production.ldap.primary_url().unwrap(),
            "ldap://ldap1.cluster.example.edu"
        );
        assert_eq!(
            production.actmgr().unwrap().base_url(),
            "https://accounts.cluster.example.edu/"
        );
        assert_eq!(
            production.ldap.people_base().unwrap(),
            "ou=People,dc=cluster,dc=example,dc=edu"
        );
        let home = production.account_home().unwrap();
        assert_eq!(home.base_dir, PathBuf::from("/home"));
        assert_eq!(home.zfs_pool, "tank");
        assert_eq!(home.home_dataset, "tank/home");
        assert_eq!(
            production.pulp().unwrap().base_url(),
            "https://repo.cluster.example.edu/pulp/api/v2/"
        );
    }

    #[test]
    fn staging_lacks_optional_sections() {
        let file = write_sample();
        let settings = Settings::load(file.path()).unwrap();
        let staging = settings.environment("staging").unwrap();
        assert!(!staging.ldap.tls);
        assert!(matches!(staging.ldap.people_base(), Err(Error::ConfigError(_))));
        assert!(matches!(staging.actmgr(), Err(Error::ConfigError(_))));
        assert!(matches!(staging.account_home(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn unknown_environment_is_not_found() {
        let file = write_sample();
        let settings = Settings::load(file.path()).unwrap();
        assert!(matches!(
            settings.environment("development"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn actmgr_base_url_with_port() {
        let actmgr = ActmgrSettings {
            host: "accounts.example.edu".to_string(),
            port: Some(8443),
            https: true,
            auth_token: SecretString::from("t".to_string()),
        };
        assert_eq!(actmgr.base_url(), "https://accounts.example.edu:8443/");
    }
}
