//! ZFS per-user quota and usage queries.

use crate::Result;
use hpcadm_core::run::{CommandRunner, TokioCommandRunner};
use hpcadm_core::Error;
use std::sync::Arc;
use tracing::info;

/// Client for `zfs get`/`zfs set` user properties.
///
/// When a remote host is configured the command is run over ssh as root,
/// matching how home pools are reached from the admin host.
pub struct ZfsClient {
    runner: Arc<dyn CommandRunner>,
    remote_host: Option<String>,
}

impl ZfsClient {
    /// Creates a client that runs `zfs` locally.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runner: Arc::new(TokioCommandRunner),
            remote_host: None,
        }
    }

    /// Creates a client over a caller-supplied runner.
    #[must_use]
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            remote_host: None,
        }
    }

    /// Runs `zfs` on a remote host over ssh.
    #[must_use]
    pub fn with_remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = Some(host.into());
        self
    }

    /// Current `userquota@<user>` of the dataset in bytes; unset (`-`)
    /// reads as 0.
    pub async fn get_userquota(&self, user: &str, dataset: &str) -> Result<u64> {
        self.get_user_property(&format!("userquota@{user}"), dataset)
            .await
    }

    /// Current `userused@<user>` of the dataset in bytes; unset (`-`)
    /// reads as 0.
    pub async fn get_userused(&self, user: &str, dataset: &str) -> Result<u64> {
        self.get_user_property(&format!("userused@{user}"), dataset)
            .await
    }

    /// Sets `userquota@<user>` on the dataset.
    pub async fn set_userquota(&self, user: &str, bytes: u64, dataset: &str) -> Result<()> {
        info!(user, bytes, dataset, "setting ZFS user quota");
        self.run(vec![
            "set".to_string(),
            format!("userquota@{user}={bytes}"),
            dataset.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn get_user_property(&self, property: &str, dataset: &str) -> Result<u64> {
        let output = self
            .run(vec![
                "get".to_string(),
                "-H".to_string(),
                "-p".to_string(),
                "-o".to_string(),
                "value".to_string(),
                property.to_string(),
                dataset.to_string(),
            ])
            .await?;

        let value = output.stdout.trim();
        if value == "-" {
            return Ok(0);
        }
        value.parse().map_err(|_| {
            Error::ParseError(format!(
                "unexpected zfs value for {property} on {dataset}: {value:?}"
            ))
        })
    }

    async fn run(&self, zfs_args: Vec<String>) -> Result<hpcadm_core::run::CommandOutput> {
        match &self.remote_host {
            Some(host) => {
                let mut args = vec![format!("root@{host}"), "zfs".to_string()];
                args.extend(zfs_args);
                self.runner.run("ssh", &args).await
            }
            None => self.runner.run("zfs", &zfs_args).await,
        }
    }
}

impl Default for ZfsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hpcadm_core::run::CommandOutput;
    use std::sync::Mutex;

    struct FakeRunner {
        outputs: Mutex<Vec<Result<CommandOutput>>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeRunner {
        fn new(outputs: Vec<Result<CommandOutput>>) -> Self {
            Self {
                outputs: Mutex::new(outputs),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn stdout(text: &str) -> Result<CommandOutput> {
            Ok(CommandOutput {
                stdout: text.to_string(),
                stderr: String::new(),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            self.outputs.lock().unwrap().remove(0)
        }
    }

    #[tokio::test]
    async fn quota_value_parses() {
        let runner = Arc::new(FakeRunner::new(vec![FakeRunner::stdout("10737418240\n")]));
        let client = ZfsClient::with_runner(runner.clone());
        let quota = client.get_userquota("jdoe", "tank/home").await.unwrap();
        assert_eq!(quota, 10_737_418_240);

        let calls = runner.calls.lock().unwrap();
        let (program, args) = &calls[0];
        assert_eq!(program, "zfs");
        assert_eq!(
            args,
            &["get", "-H", "-p", "-o", "value", "userquota@jdoe", "tank/home"]
        );
    }

    #[tokio::test]
    async fn dash_means_zero() {
        let runner = Arc::new(FakeRunner::new(vec![FakeRunner::stdout("-\n")]));
        let client = ZfsClient::with_runner(runner);
        assert_eq!(client.get_userused("jdoe", "tank/home").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn remote_host_wraps_in_ssh() {
        let runner = Arc::new(FakeRunner::new(vec![FakeRunner::stdout("0\n")]));
        let client = ZfsClient::with_runner(runner.clone()).with_remote_host("zfs1.example.edu");
        client.get_userused("jdoe", "tank/home").await.unwrap();

        let calls = runner.calls.lock().unwrap();
        let (program, args) = &calls[0];
        assert_eq!(program, "ssh");
        assert_eq!(args[0], "root@zfs1.example.edu");
        assert_eq!(args[1], "zfs");
    }

    #[tokio::test]
    async fn set_userquota_formats_property() {
        let runner = Arc::new(FakeRunner::new(vec![FakeRunner::stdout("")]));
        let client = ZfsClient::with_runner(runner.clone());
        client
            .set_userquota("jdoe", 10_485_760 * 1024, "tank/home")
            .await
            .unwrap();

        let calls = runner.calls.lock().unwrap();
        let (_, args) = &calls[0];
        assert_eq!(args[1], "userquota@jdoe=10737418240");
    }

    #[tokio::test]
    async fn garbage_value_is_parse_error() {
        let runner = Arc::new(FakeRunner::new(vec![FakeRunner::stdout("lots\n")]));
        let client = ZfsClient::with_runner(runner);
        assert!(matches!(
            client.get_userquota("jdoe", "tank/home").await,
            Err(Error::ParseError(_))
        ));
    }
}
