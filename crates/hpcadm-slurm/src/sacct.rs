//! `sacct` job queries and CPU-hour aggregation.

use crate::duration::parse_duration;
use crate::Result;
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use hpcadm_core::run::{CommandRunner, TokioCommandRunner};
use hpcadm_core::Error;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Job states counted toward billing summaries.
const BILLED_STATES: &str = "CANCELLED,COMPLETED,FAILED,NODE_FAIL,PREEMPTED,TIMEOUT";

const SACCT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Reporting window passed to `sacct` as start/end times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    /// Inclusive window start.
    pub start: NaiveDateTime,
    /// Inclusive window end.
    pub end: NaiveDateTime,
}

impl ReportWindow {
    /// The previous calendar month, first day 00:00:00 through last day
    /// 23:59:59. This is the default billing window.
    #[must_use]
    pub fn previous_month() -> Self {
        Self::previous_month_of(Local::now().date_naive())
    }

    fn previous_month_of(today: NaiveDate) -> Self {
        // Last day of the previous month is the day before the first of
        // the current month.
        let first_of_month = today.with_day(1).unwrap_or(today);
        let last_of_previous = first_of_month.pred_opt().unwrap_or(first_of_month);
        let first_of_previous = last_of_previous.with_day(1).unwrap_or(last_of_previous);

        Self {
            start: first_of_previous.and_hms_opt(0, 0, 0).unwrap_or_default(),
            end: last_of_previous.and_hms_opt(23, 59, 59).unwrap_or_default(),
        }
    }

    fn start_arg(&self) -> String {
        self.start.format(SACCT_TIME_FORMAT).to_string()
    }

    fn end_arg(&self) -> String {
        self.end.format(SACCT_TIME_FORMAT).to_string()
    }
}

/// How job run time is derived for CPU-hour accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElapsedStrategy {
    /// Use the elapsed duration reported by accounting.
    #[default]
    Reported,
    /// Use end time minus start time.
    EndMinusStart,
    /// Use end minus start, minus time spent suspended.
    EndMinusStartMinusSuspended,
}

/// One allocation row from `sacct`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Submitting user.
    pub user: String,
    /// Accounting account the job ran under.
    pub account: String,
    /// Reported elapsed duration string.
    pub elapsed: String,
    /// Allocated CPU count.
    pub ncpus: u64,
    /// Start timestamp.
    pub start: NaiveDateTime,
    /// End timestamp.
    pub end: NaiveDateTime,
    /// Suspended duration string.
    pub suspended: String,
}

impl JobRecord {
    /// Run time in seconds under the given strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseError`] for malformed duration fields and
    /// [`Error::IntegrityError`] when the derived time is negative.
    pub fn elapsed_seconds(&self, strategy: ElapsedStrategy) -> Result<u64> {
        let wall = || {
            let seconds = (self.end - self.start).num_seconds();
            u64::try_from(seconds).map_err(|_| {
                Error::IntegrityError(format!(
                    "job for {} ends before it starts ({} < {})",
                    self.user, self.end, self.start
                ))
            })
        };

        match strategy {
            ElapsedStrategy::Reported => parse_duration(&self.elapsed),
            ElapsedStrategy::EndMinusStart => wall(),
            ElapsedStrategy::EndMinusStartMinusSuspended => {
                let wall = wall()?;
                let suspended = parse_duration(&self.suspended)?;
                Ok(wall.saturating_sub(suspended))
            }
        }
    }

    /// CPU-hours consumed under the given strategy.
    pub fn cpu_hours(&self, strategy: ElapsedStrategy) -> Result<f64> {
        #[allow(clippy::cast_precision_loss)]
        let hours = self.elapsed_seconds(strategy)? as f64 / 3600.0;
        #[allow(clippy::cast_precision_loss)]
        Ok(hours * self.ncpus as f64)
    }
}

/// Parses `--parsable2 --noheader` job rows
/// (`user|account|elapsed|ncpus|start|end|suspended`).
pub fn parse_jobs(output: &str) -> Result<Vec<JobRecord>> {
    let mut jobs = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split('|').collect();
        let [user, account, elapsed, ncpus, start, end, suspended] = fields.as_slice() else {
            return Err(Error::ParseError(format!(
                "unexpected sacct row ({} fields): {line:?}",
                fields.len()
            )));
        };
        jobs.push(JobRecord {
            user: (*user).to_string(),
            account: (*account).to_string(),
            elapsed: (*elapsed).to_string(),
            ncpus: ncpus
                .parse()
                .map_err(|_| Error::ParseError(format!("invalid ncpus in sacct row: {line:?}")))?,
            start: parse_timestamp(start)?,
            end: parse_timestamp(end)?,
            suspended: (*suspended).to_string(),
        });
    }
    Ok(jobs)
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, SACCT_TIME_FORMAT)
        .map_err(|_| Error::ParseError(format!("invalid sacct timestamp: {text:?}")))
}

/// Per-user or per-account usage bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageBucket {
    /// Total CPU-hours.
    pub cpu_hours: f64,
    /// Number of completed jobs.
    pub num_jobs: u64,
    /// Account associated with the bucket (for user buckets, the account
    /// of the user's first job).
    pub account: String,
}

/// CPU-hour aggregation across a set of jobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageSummary {
    /// Usage keyed by user name.
    pub users: BTreeMap<String, UsageBucket>,
    /// Usage keyed by account name.
    pub accounts: BTreeMap<String, UsageBucket>,
    /// Total CPU-hours across all jobs.
    pub cpu_hours_total: f64,
    /// Total job count.
    pub num_jobs_total: u64,
}

impl UsageSummary {
    /// Aggregates jobs into per-user and per-account buckets.
    ///
    /// # Errors
    ///
    /// Propagates duration parse failures from individual records.
    pub fn from_jobs(jobs: &[JobRecord], strategy: ElapsedStrategy) -> Result<Self> {
        let mut summary = Self::default();

        for job in jobs {
            let cpu_hours = job.cpu_hours(strategy)?;

            let user = summary.users.entry(job.user.clone()).or_insert_with(|| {
                UsageBucket {
                    account: job.account.clone(),
                    ..UsageBucket::default()
                }
            });
            user.cpu_hours += cpu_hours;
            user.num_jobs += 1;

            let account = summary
                .accounts
                .entry(job.account.clone())
                .or_insert_with(|| UsageBucket {
                    account: job.account.clone(),
                    ..UsageBucket::default()
                });
            account.cpu_hours += cpu_hours;
            account.num_jobs += 1;

            summary.cpu_hours_total += cpu_hours;
            summary.num_jobs_total += 1;
        }

        Ok(summary)
    }

    /// Share of total CPU-hours consumed by an account, in percent.
    #[must_use]
    pub fn account_percent(&self, account: &str) -> Option<f64> {
        if self.cpu_hours_total == 0.0 {
            return None;
        }
        self.accounts
            .get(account)
            .map(|bucket| bucket.cpu_hours / self.cpu_hours_total * 100.0)
    }
}

/// Client for `sacct`, the accounting report CLI.
pub struct SacctClient {
    runner: Arc<dyn CommandRunner>,
    cluster: Option<String>,
}

impl SacctClient {
    /// Creates a client that runs the real `sacct` binary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runner: Arc::new(TokioCommandRunner),
            cluster: None,
        }
    }

    /// Creates a client over a caller-supplied runner.
    #[must_use]
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            cluster: None,
        }
    }

    /// Restricts queries to a named cluster.
    #[must_use]
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Fetches allocation rows for the window, optionally restricted to an
    /// account and/or user. Only billed terminal states are included.
    pub async fn jobs(
        &self,
        window: &ReportWindow,
        account: Option<&str>,
        user: Option<&str>,
    ) -> Result<Vec<JobRecord>> {
        let mut args = vec![
            "--allusers".to_string(),
            "--parsable2".to_string(),
            "--noheader".to_string(),
            "--allocations".to_string(),
        ];
        if let Some(cluster) = &self.cluster {
            args.push("--clusters".to_string());
            args.push(cluster.clone());
        }
        if let Some(account) = account {
            args.push(format!("--accounts={account}"));
        }
        if let Some(user) = user {
            args.push(format!("--user={user}"));
        }
        args.extend([
            "--format".to_string(),
            "user,account,elapsed,ncpus,start,end,suspended".to_string(),
            "--state".to_string(),
            BILLED_STATES.to_string(),
            "--starttime".to_string(),
            window.start_arg(),
            "--endtime".to_string(),
            window.end_arg(),
        ]);

        let output = self.runner.run("sacct", &args).await?;
        parse_jobs(&output.stdout)
    }
}

impl Default for SacctClient {
    fn default() -> Self {
        Self::new()
    }
}
