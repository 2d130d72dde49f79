//! ZFS quota reconciliation against the directory's quota attribute.

use crate::Result;
use comfy_table::{presets, Table};
use hpcadm_core::bytes::format_bytes;
use hpcadm_directory::{
    DirectoryClient, DirectoryUser, SearchRequest, SearchScope, QUOTA_USER_ATTRIBUTES,
};
use hpcadm_storage::{QuotaAttribute, ZfsClient};
use tracing::{error, info, warn};

/// Shell marking an account as active for quota purposes.
const ACTIVE_SHELL: &str = "/bin/bash";

/// Directory filter selecting entries that carry quota attributes.
const QUOTA_FILTER: &str = "objectClass=systemQuotas";

/// One user's quota state across the directory and ZFS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRecord {
    /// Login name.
    pub username: String,
    /// Numeric uid.
    pub uid_number: Option<u32>,
    /// Contact addresses, comma-joined for reports.
    pub mail: String,
    /// ZFS dataset the quota applies to.
    pub dataset: String,
    /// Hard limit from the directory, in bytes.
    pub ldap_quota: u64,
    /// Current ZFS quota in bytes (0 when unset).
    pub zfs_quota: u64,
    /// Current ZFS usage in bytes.
    pub zfs_used: u64,
}

/// Classification of quota records into warning and corrective buckets.
#[derive(Debug, Clone, Default)]
pub struct QuotaReport {
    /// Used exceeds both the directory and ZFS limits.
    pub over_quota: Vec<QuotaRecord>,
    /// Used exceeds the directory limit only.
    pub over_ldap_quota: Vec<QuotaRecord>,
    /// Used exceeds the ZFS limit only.
    pub over_zfs_quota: Vec<QuotaRecord>,
    /// ZFS quota differs from the directory limit; one corrective set
    /// operation is planned per entry.
    pub mismatches: Vec<QuotaRecord>,
}

impl QuotaReport {
    /// Classifies records into the four buckets.
    #[must_use]
    pub fn classify(records: Vec<QuotaRecord>) -> Self {
        let mut report = Self::default();
        for record in records {
            if record.zfs_used >= record.ldap_quota && record.zfs_used >= record.zfs_quota {
                report.over_quota.push(record.clone());
            } else if record.zfs_used > 0 && record.zfs_used >= record.ldap_quota {
                report.over_ldap_quota.push(record.clone());
            } else if record.zfs_used > 0 && record.zfs_used >= record.zfs_quota {
                report.over_zfs_quota.push(record.clone());
            }
            if record.ldap_quota != record.zfs_quota {
                report.mismatches.push(record);
            }
        }
        report
    }

    /// Renders the four buckets as one table.
    #[must_use]
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(presets::ASCII_FULL);
        table.set_header(vec![
            "Condition", "Username", "UID", "Mail", "Used", "ZFS Quota", "LDAP Quota",
        ]);

        let sections: [(&str, &Vec<QuotaRecord>); 4] = [
            ("over quota", &self.over_quota),
            ("over LDAP quota", &self.over_ldap_quota),
            ("over ZFS quota", &self.over_zfs_quota),
            ("quota mismatch", &self.mismatches),
        ];
        for (label, records) in sections {
            for record in records {
                table.add_row(vec![
                    label.to_string(),
                    record.username.clone(),
                    record
                        .uid_number
                        .map(|uid| uid.to_string())
                        .unwrap_or_default(),
                    record.mail.clone(),
                    format_bytes(record.zfs_used),
                    format_bytes(record.zfs_quota),
                    format_bytes(record.ldap_quota),
                ]);
            }
        }
        table
    }
}

/// Reconciles per-user ZFS quotas with the directory.
pub struct QuotaSyncTask {
    directory: DirectoryClient,
    zfs: ZfsClient,
    people_base: String,
    pool: String,
    active_only: bool,
}

impl QuotaSyncTask {
    /// Assembles a task from per-system handles. `pool` is the ZFS pool
    /// that backs the quota mounts.
    #[must_use]
    pub fn new(
        directory: DirectoryClient,
        zfs: ZfsClient,
        people_base: impl Into<String>,
        pool: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            zfs,
            people_base: people_base.into(),
            pool: pool.into(),
            active_only: true,
        }
    }

    /// Includes users regardless of login shell.
    #[must_use]
    pub const fn include_inactive(mut self) -> Self {
        self.active_only = false;
        self
    }

    /// Fetches state, classifies it, and applies corrective quota sets.
    ///
    /// Apply failures are logged and do not abort the remaining
    /// corrections. With `dry_run` nothing is written.
    pub async fn run(&self, dry_run: bool) -> Result<QuotaReport> {
        let records = self.gather().await?;
        let report = QuotaReport::classify(records);

        for record in &report.mismatches {
            if dry_run {
                info!(
                    user = %record.username,
                    quota = record.ldap_quota,
                    dataset = %record.dataset,
                    "would set ZFS quota"
                );
                continue;
            }
            if let Err(err) = self
                .zfs
                .set_userquota(&record.username, record.ldap_quota, &record.dataset)
                .await
            {
                error!(
                    user = %record.username,
                    dataset = %record.dataset,
                    %err,
                    "failed to set ZFS quota"
                );
            }
        }

        Ok(report)
    }

    async fn gather(&self) -> Result<Vec<QuotaRecord>> {
        let request = SearchRequest::new(&self.people_base, QUOTA_FILTER)
            .with_scope(SearchScope::OneLevel)
            .with_attributes(QUOTA_USER_ATTRIBUTES);
        let entries = self.directory.search(&request).await?;

        let mut records = Vec::new();
        for entry in &entries {
            let user = DirectoryUser::from_entry(entry)?;
            if self.active_only && user.login_shell.as_deref() != Some(ACTIVE_SHELL) {
                continue;
            }
            let Some(raw_quota) = &user.quota else {
                warn!(user = %user.uid, "entry matched quota filter but has no quota");
                continue;
            };
            let quota = QuotaAttribute::parse(raw_quota)?;
            let dataset = quota.dataset(&self.pool);

            let zfs_quota = self.zfs.get_userquota(&user.uid, &dataset).await?;
            let zfs_used = self.zfs.get_userused(&user.uid, &dataset).await?;

            records.push(QuotaRecord {
                username: user.uid.clone(),
                uid_number: user.uid_number,
                mail: user.mail.join(","),
                dataset,
                ldap_quota: quota.hard_bytes(),
                zfs_quota,
                zfs_used,
            });
        }
        Ok(records)
    }
}
