//! Subprocess runner abstraction.
//!
//! The SLURM and storage crates shell out to `sacctmgr`, `sacct`, `zfs`,
//! `find`, `du`, and friends. Commands go through the [`CommandRunner`]
//! trait so procedures can be tested without the real binaries; the
//! executed command line is logged at debug level, and a nonzero exit
//! becomes [`Error::CommandFailed`] with captured stderr.

use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, decoded lossily as UTF-8.
    pub stdout: String,
    /// Standard error, decoded lossily as UTF-8.
    pub stderr: String,
}

impl CommandOutput {
    /// Non-empty stdout lines with surrounding whitespace trimmed.
    #[must_use]
    pub fn lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }
}

/// Executes external commands.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, returning its captured output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] when the process exits nonzero and
    /// [`Error::InternalError`] when it cannot be spawned.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runner backed by `tokio::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Executing: {} {}", program, args.join(" "));

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|err| Error::InternalError(format!("failed to spawn {program}: {err}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Convenience constructor for string argument vectors.
#[must_use]
pub fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_lines_skips_blanks() {
        let output = CommandOutput {
            stdout: "jdoe\n\n  asmith  \n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(output.lines(), vec!["jdoe", "asmith"]);
    }

    #[tokio::test]
    async fn runner_captures_stdout() {
        let runner = TokioCommandRunner;
        let output = runner
            .run("sh", &args(["-c", "printf hello"]))
            .await
            .unwrap();
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_command_failed() {
        let runner = TokioCommandRunner;
        let err = runner
            .run("sh", &args(["-c", "echo broken >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            Error::CommandFailed { status, stderr, .. } => {
                assert_eq!(status, 3);
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
