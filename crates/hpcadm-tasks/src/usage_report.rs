//! Monthly CPU-hour usage reports from the accounting database.

use crate::Result;
use comfy_table::{presets, Table};
use hpcadm_slurm::{ElapsedStrategy, ReportWindow, SacctClient, UsageSummary};

/// Fetches the job records for a window and aggregates them.
pub async fn summarize(
    sacct: &SacctClient,
    window: &ReportWindow,
    account: Option<&str>,
    user: Option<&str>,
    strategy: ElapsedStrategy,
) -> Result<UsageSummary> {
    let jobs = sacct.jobs(window, account, user).await?;
    UsageSummary::from_jobs(&jobs, strategy)
}

/// Renders a usage summary: per-user rows (heaviest first), then
/// per-account totals with their share of the grand total, then the
/// grand total.
#[must_use]
pub fn usage_table(summary: &UsageSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::ASCII_FULL);
    table.set_header(vec!["Username", "Account", "CPU Hours", "Completed Jobs"]);

    let mut users: Vec<_> = summary.users.iter().collect();
    users.sort_by(|a, b| {
        b.1.cpu_hours
            .partial_cmp(&a.1.cpu_hours)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    for (username, bucket) in users {
        table.add_row(vec![
            username.clone(),
            bucket.account.clone(),
            format!("{:.1}", bucket.cpu_hours),
            bucket.num_jobs.to_string(),
        ]);
    }

    table.add_row(vec![String::new(), String::new(), String::new(), String::new()]);

    for (account, bucket) in &summary.accounts {
        let percent = summary.account_percent(account).unwrap_or(0.0);
        table.add_row(vec![
            String::new(),
            account.clone(),
            format!("{:.1} ({percent:.1}%)", bucket.cpu_hours),
            bucket.num_jobs.to_string(),
        ]);
    }

    table.add_row(vec![
        String::new(),
        "TOTAL".to_string(),
        format!("{:.1}", summary.cpu_hours_total),
        summary.num_jobs_total.to_string(),
    ]);

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hpcadm_slurm::JobRecord;

    fn job(user: &str, account: &str, elapsed: &str, ncpus: u64) -> JobRecord {
        let start = NaiveDate::from_ymd_opt(2026, 7, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        JobRecord {
            user: user.to_string(),
            account: account.to_string(),
            elapsed: elapsed.to_string(),
            ncpus,
            start,
            end: start,
            suspended: "00:00:00".to_string(),
        }
    }

    fn summary() -> UsageSummary {
        UsageSummary::from_jobs(
            &[
                job("alice", "physics", "10:00:00", 4),
                job("bob", "physics", "01:00:00", 2),
                job("carol", "chemistry", "02:00:00", 8),
            ],
            ElapsedStrategy::Reported,
        )
        .unwrap()
    }

    #[test]
    fn heaviest_user_listed_first() {
        let rendered = usage_table(&summary()).to_string();
        let alice = rendered.find("alice").unwrap();
        let bob = rendered.find("bob").unwrap();
        // alice 40.0, carol 16.0, bob 2.0
        let carol = rendered.find("carol").unwrap();
        assert!(alice < carol);
        assert!(carol < bob);
    }

    #[test]
    fn account_rows_carry_percent_of_total() {
        let summary = summary();
        // physics 42.0 of 58.0 total
        let percent = summary.account_percent("physics").unwrap();
        assert!((percent - 72.4).abs() < 0.1);
        let rendered = usage_table(&summary).to_string();
        assert!(rendered.contains("42.0 (72.4%)"));
        assert!(rendered.contains("16.0 (27.6%)"));
    }

    #[test]
    fn grand_total_row_present() {
        let rendered = usage_table(&summary()).to_string();
        assert!(rendered.contains("TOTAL"));
        assert!(rendered.contains("58.0"));
    }
}
