//! `sacctmgr` wrappers for accounting users and associations.

use crate::Result;
use hpcadm_core::run::{CommandRunner, TokioCommandRunner};
use hpcadm_core::Error;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// One row of `sacctmgr show user ... WithAssoc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Accounting user name.
    pub user: String,
    /// Default account of the user.
    pub default_account: String,
    /// Associated account.
    pub account: String,
}

/// Client for `sacctmgr`, the SLURM accounting manager CLI.
pub struct SacctmgrClient {
    runner: Arc<dyn CommandRunner>,
}

impl SacctmgrClient {
    /// Creates a client that runs the real `sacctmgr` binary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runner: Arc::new(TokioCommandRunner),
        }
    }

    /// Creates a client over a caller-supplied runner.
    #[must_use]
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Lists the associations of `user` restricted to `account`.
    pub async fn list_user_associations(
        &self,
        user: &str,
        account: &str,
    ) -> Result<Vec<Association>> {
        let args = vec![
            "--parsable2".to_string(),
            "--noheader".to_string(),
            "show".to_string(),
            "user".to_string(),
            format!("name={user}"),
            format!("account={account}"),
            "format=User,DefaultAccount,Account".to_string(),
            "WithAssoc".to_string(),
        ];
        let output = self.runner.run("sacctmgr", &args).await?;

        let mut associations = Vec::new();
        for line in output.lines() {
            let fields: Vec<&str> = line.split('|').collect();
            let [user, default_account, account] = fields.as_slice() else {
                return Err(Error::ParseError(format!(
                    "unexpected sacctmgr association row: {line:?}"
                )));
            };
            associations.push(Association {
                user: (*user).to_string(),
                default_account: (*default_account).to_string(),
                account: (*account).to_string(),
            });
        }
        Ok(associations)
    }

    /// Returns true when `user` already has an association on `account`
    /// with that account as its default.
    pub async fn has_default_association(&self, user: &str, account: &str) -> Result<bool> {
        let associations = self.list_user_associations(user, account).await?;
        Ok(associations.iter().any(|assoc| {
            assoc.user == user && assoc.default_account == account && assoc.account == account
        }))
    }

    /// Deletes the association of `user` on `account`.
    pub async fn delete_user_from_account(&self, user: &str, account: &str) -> Result<()> {
        info!(user, account, "deleting accounting association");
        let args = vec![
            "-i".to_string(),
            "delete".to_string(),
            "user".to_string(),
            "where".to_string(),
            format!("name={user}"),
            format!("account={account}"),
        ];
        self.runner.run("sacctmgr", &args).await?;
        Ok(())
    }

    /// Deletes `user` from accounting entirely.
    pub async fn delete_user(&self, user: &str) -> Result<()> {
        info!(user, "deleting accounting user");
        let args = vec![
            "-i".to_string(),
            "delete".to_string(),
            "user".to_string(),
            "where".to_string(),
            format!("name={user}"),
        ];
        self.runner.run("sacctmgr", &args).await?;
        Ok(())
    }

    /// Creates `user` with the given account associations and default
    /// account.
    pub async fn create_user(
        &self,
        user: &str,
        accounts: &[String],
        default_account: &str,
    ) -> Result<()> {
        info!(user, default_account, "creating accounting user");
        let args = vec![
            "-i".to_string(),
            "create".to_string(),
            "user".to_string(),
            user.to_string(),
            format!("account={}", accounts.join(",")),
            format!("defaultaccount={default_account}"),
        ];
        self.runner.run("sacctmgr", &args).await?;
        Ok(())
    }

    /// Lists every accounting user name.
    pub async fn list_usernames(&self) -> Result<Vec<String>> {
        let args = vec![
            "--parsable2".to_string(),
            "--noheader".to_string(),
            "show".to_string(),
            "user".to_string(),
            "format=User".to_string(),
        ];
        let output = self.runner.run("sacctmgr", &args).await?;
        Ok(output.lines().into_iter().map(str::to_string).collect())
    }
}

impl Default for SacctmgrClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-owned cache of accounting user names.
///
/// Loads the full user list lazily on first lookup and reuses it until
/// [`UsernameCache::invalidate`] is called, so a batch of existence checks
/// costs one `sacctmgr` invocation.
#[derive(Debug, Default)]
pub struct UsernameCache {
    names: Option<HashSet<String>>,
}

impl UsernameCache {
    /// Creates an unloaded cache.
    #[must_use]
    pub const fn new() -> Self {
        Self { names: None }
    }

    /// Returns true when `username` is a known accounting user.
    pub async fn contains(&mut self, client: &SacctmgrClient, username: &str) -> Result<bool> {
        if self.names.is_none() {
            debug!("loading accounting user name cache");
            let names = client.list_usernames().await?;
            self.names = Some(names.into_iter().collect());
        }
        // load above guarantees Some
        Ok(self
            .names
            .as_ref()
            .is_some_and(|names| names.contains(username)))
    }

    /// Drops the cached list; the next lookup reloads it.
    pub fn invalidate(&mut self) {
        self.names = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hpcadm_core::run::CommandOutput;
    use std::sync::Mutex;

    /// Scripted runner that records invocations and replays canned output.
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

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
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
    async fn parses_association_rows() {
        let runner = Arc::new(FakeRunner::new(vec![FakeRunner::stdout(
            "jdoe|phys-acct|phys-acct\njdoe|phys-acct|chem-acct\n",
        )]));
        let client = SacctmgrClient::with_runner(runner.clone());

        let associations = client
            .list_user_associations("jdoe", "phys-acct")
            .await
            .unwrap();
        assert_eq!(associations.len(), 2);
        assert_eq!(
            associations[0],
            Association {
                user: "jdoe".to_string(),
                default_account: "phys-acct".to_string(),
                account: "phys-acct".to_string(),
            }
        );

        let (program, args) = &runner.calls()[0];
        assert_eq!(program, "sacctmgr");
        assert!(args.contains(&"name=jdoe".to_string()));
        assert!(args.contains(&"WithAssoc".to_string()));
    }

    #[tokio::test]
    async fn default_association_check() {
        let runner = Arc::new(FakeRunner::new(vec![
            FakeRunner::stdout("jdoe|phys-acct|phys-acct\n"),
            FakeRunner::stdout("jdoe|phys-acct|chem-acct\n"),
        ]));
        let client = SacctmgrClient::with_runner(runner);

        assert!(client
            .has_default_association("jdoe", "phys-acct")
            .await
            .unwrap());
        assert!(!client
            .has_default_association("jdoe", "chem-acct")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn malformed_association_row_is_an_error() {
        let runner = Arc::new(FakeRunner::new(vec![FakeRunner::stdout("jdoe|only-two\n")]));
        let client = SacctmgrClient::with_runner(runner);
        assert!(matches!(
            client.list_user_associations("jdoe", "x").await,
            Err(Error::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn create_user_joins_accounts() {
        let runner = Arc::new(FakeRunner::new(vec![FakeRunner::stdout("")]));
        let client = SacctmgrClient::with_runner(runner.clone());
        client
            .create_user(
                "jdoe",
                &["phys-acct".to_string(), "chem-acct".to_string()],
                "phys-acct",
            )
            .await
            .unwrap();

        let (_, args) = &runner.calls()[0];
        assert_eq!(args[0], "-i");
        assert!(args.contains(&"account=phys-acct,chem-acct".to_string()));
        assert!(args.contains(&"defaultaccount=phys-acct".to_string()));
    }

    #[tokio::test]
    async fn username_cache_loads_once_until_invalidated() {
        let runner = Arc::new(FakeRunner::new(vec![
            FakeRunner::stdout("alice\nbob\n"),
            FakeRunner::stdout("alice\nbob\ncarol\n"),
        ]));
        let client = SacctmgrClient::with_runner(runner.clone());
        let mut cache = UsernameCache::new();

        assert!(cache.contains(&client, "alice").await.unwrap());
        assert!(!cache.contains(&client, "carol").await.unwrap());
        assert_eq!(runner.calls().len(), 1);

        cache.invalidate();
        assert!(cache.contains(&client, "carol").await.unwrap());
        assert_eq!(runner.calls().len(), 2);
    }
}
