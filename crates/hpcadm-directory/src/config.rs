//! Configuration for directory client usage.

use crate::Result;
use hpcadm_core::settings::LdapSettings;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Configuration for connecting to the directory.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    url: String,
    starttls: bool,
    bind_dn: Option<String>,
    bind_password: Option<SecretString>,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
}

impl DirectoryConfig {
    /// Creates a configuration for the given server URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            starttls: false,
            bind_dn: None,
            bind_password: None,
            tls_verify: true,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        }
    }

    /// Builds a configuration from the settings file section.
    pub fn from_settings(settings: &LdapSettings) -> Result<Self> {
        let mut config = Self::new(settings.primary_url()?).with_starttls(settings.tls);
        if let (Some(dn), Some(password)) = (&settings.bind_dn, &settings.bind_password) {
            config = config.with_simple_bind(dn.clone(), password.clone());
        }
        Ok(config)
    }

    /// Returns the directory endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns whether StartTLS is negotiated after connecting.
    #[must_use]
    pub const fn starttls(&self) -> bool {
        self.starttls
    }

    /// Returns the bind DN and password, when a simple bind is configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.bind_dn, &self.bind_password) {
            (Some(dn), Some(password)) => Some((dn.as_str(), password.expose_secret())),
            _ => None,
        }
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Enables StartTLS negotiation.
    #[must_use]
    pub const fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    /// Configures simple-bind credentials.
    #[must_use]
    pub fn with_simple_bind(mut self, dn: impl Into<String>, password: SecretString) -> Self {
        self.bind_dn = Some(dn.into());
        self.bind_password = Some(password);
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides() {
        let config = DirectoryConfig::new("ldap://directory.cluster.example.edu")
            .with_starttls(true)
            .with_simple_bind(
                "cn=maintenance,dc=cluster,dc=example,dc=edu",
                SecretString::from("secret".to_string()),
            )
            .with_connection_timeout_secs(20)
            .with_operation_timeout_secs(45)
            .with_tls_verification(false);

        assert_eq!(config.url(), "ldap://directory.cluster.example.edu");
        assert!(config.starttls());
        assert_eq!(
            config.credentials(),
            Some(("cn=maintenance,dc=cluster,dc=example,dc=edu", "secret"))
        );
        assert_eq!(config.connection_timeout(), Duration::from_secs(20));
        assert_eq!(config.operation_timeout(), Duration::from_secs(45));
        assert!(!config.tls_verify());
    }

    #[test]
    fn anonymous_when_no_credentials() {
        let config = DirectoryConfig::new("ldap://directory.cluster.example.edu");
        assert!(config.credentials().is_none());
    }
}
