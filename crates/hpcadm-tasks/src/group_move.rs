//! Primary-group migration: moves a user from one group to another
//! across the directory, the billing backend, accounting, and file
//! ownership.

use crate::Result;
use hpcadm_actmgr::{Account, AccountUpdate, ActmgrClient, Group};
use hpcadm_core::run::CommandRunner;
use hpcadm_core::settings::AccountHomeSettings;
use hpcadm_directory::{
    escape_filter_value, DirectoryClient, DirectoryGroup, DirectoryModification, DirectoryUser,
    SearchRequest, SearchScope, GROUP_ATTRIBUTES, USER_ATTRIBUTES,
};
use hpcadm_slurm::SacctmgrClient;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Authoritative state gathered before planning a migration.
#[derive(Debug, Clone)]
pub struct MigrationState {
    /// The user being moved.
    pub user: DirectoryUser,
    /// The group being left.
    pub old_group: DirectoryGroup,
    /// The group being joined.
    pub new_group: DirectoryGroup,
    /// Billing account of the user.
    pub account: Account,
    /// Billing group matching the new directory group.
    pub billing_group: Group,
    /// True when the accounting database already has the
    /// user/default/account row for the new group's account.
    pub slurm_row_exists: bool,
    /// Accounting accounts the user should end up associated with.
    pub slurm_accounts: Vec<String>,
}

/// One step of a migration plan, in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// PUT the new primary group to the billing backend.
    UpdateBillingPrimaryGroup {
        /// Billing account id.
        account_id: u64,
        /// Billing group id.
        group_id: u64,
    },
    /// Replace the user's `gidNumber` in the directory.
    ReplaceUserGid {
        /// User entry DN.
        user_dn: String,
        /// New gid.
        gid: u32,
    },
    /// Add the user to the new group's `uniqueMember`.
    AddGroupMember {
        /// Group entry DN.
        group_dn: String,
        /// User entry DN.
        user_dn: String,
    },
    /// Remove the user from the old group's `uniqueMember`.
    RemoveGroupMember {
        /// Group entry DN.
        group_dn: String,
        /// User entry DN.
        user_dn: String,
    },
    /// Recreate the accounting user under the new account set.
    RecreateSlurmUser {
        /// Accounting user name.
        user: String,
        /// Account whose association is dropped first.
        old_account: String,
        /// Accounts to associate.
        accounts: Vec<String>,
        /// Default account.
        default_account: String,
    },
    /// Re-group files under a tree from the old group to the new.
    RegroupTree {
        /// Tree root.
        path: String,
        /// Group name files currently belong to.
        old_group: String,
        /// Group name to assign.
        new_group: String,
    },
}

/// Migration plan plus the steps found already satisfied.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    /// Steps to apply, in order.
    pub steps: Vec<MigrationStep>,
    /// Human-readable notes for state already in place.
    pub already_updated: Vec<String>,
}

impl MigrationPlan {
    /// True when everything is already in the desired state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps
            .iter()
            .all(|step| matches!(step, MigrationStep::RegroupTree { .. }))
    }
}

/// Computes the minimal migration plan for the gathered state.
///
/// Directory steps keep their required order: the gid replace precedes
/// the membership edits. File re-grouping steps are always planned since
/// per-file group ownership is not known in advance.
#[must_use]
pub fn plan(state: &MigrationState, storage: &AccountHomeSettings) -> MigrationPlan {
    let mut plan = MigrationPlan::default();
    let user_dn = state.user.dn.clone();

    if state.account.primary_group.as_ref().map(|g| g.id) == Some(state.billing_group.id) {
        plan.already_updated
            .push(format!("billing primary group already {}", state.billing_group.name));
    } else {
        plan.steps.push(MigrationStep::UpdateBillingPrimaryGroup {
            account_id: state.account.id,
            group_id: state.billing_group.id,
        });
    }

    if state.user.gid_number == Some(state.new_group.gid_number) {
        plan.already_updated
            .push(format!("user gidNumber already {}", state.new_group.gid_number));
    } else {
        plan.steps.push(MigrationStep::ReplaceUserGid {
            user_dn: user_dn.clone(),
            gid: state.new_group.gid_number,
        });
    }

    if state.new_group.has_member(&user_dn) {
        plan.already_updated
            .push(format!("already a member of {}", state.new_group.cn));
    } else {
        plan.steps.push(MigrationStep::AddGroupMember {
            group_dn: state.new_group.dn.clone(),
            user_dn: user_dn.clone(),
        });
    }

    if state.old_group.has_member(&user_dn) {
        plan.steps.push(MigrationStep::RemoveGroupMember {
            group_dn: state.old_group.dn.clone(),
            user_dn,
        });
    } else {
        plan.already_updated
            .push(format!("not a member of {}", state.old_group.cn));
    }

    if state.slurm_row_exists {
        plan.already_updated
            .push("accounting association already exists".to_string());
    } else {
        plan.steps.push(MigrationStep::RecreateSlurmUser {
            user: state.user.uid.clone(),
            old_account: state.old_group.slurm_account.clone(),
            accounts: state.slurm_accounts.clone(),
            default_account: state.new_group.slurm_account.clone(),
        });
    }

    for base in [&storage.base_dir, &storage.scratch_base] {
        plan.steps.push(MigrationStep::RegroupTree {
            path: base.join(&state.user.uid).display().to_string(),
            old_group: state.old_group.cn.clone(),
            new_group: state.new_group.cn.clone(),
        });
    }

    plan
}

/// Record of an executed migration.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// Steps applied, as human-readable lines.
    pub applied: Vec<String>,
    /// State found already in place.
    pub skipped: Vec<String>,
}

/// Executes primary-group migrations against live backends.
pub struct GroupMoveTask {
    directory: DirectoryClient,
    actmgr: ActmgrClient,
    sacctmgr: SacctmgrClient,
    runner: Arc<dyn CommandRunner>,
    storage: AccountHomeSettings,
    people_base: String,
    group_base: String,
}

impl GroupMoveTask {
    /// Assembles a task from per-system handles.
    #[must_use]
    pub fn new(
        directory: DirectoryClient,
        actmgr: ActmgrClient,
        sacctmgr: SacctmgrClient,
        runner: Arc<dyn CommandRunner>,
        storage: AccountHomeSettings,
        people_base: impl Into<String>,
        group_base: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            actmgr,
            sacctmgr,
            runner,
            storage,
            people_base: people_base.into(),
            group_base: group_base.into(),
        }
    }

    /// Gathers state, plans, and applies the migration.
    ///
    /// With `dry_run` the plan is computed and reported but nothing is
    /// written anywhere.
    pub async fn run(
        &self,
        username: &str,
        old_group: &str,
        new_group: &str,
        dry_run: bool,
    ) -> Result<MigrationReport> {
        let state = self.gather(username, old_group, new_group).await?;
        let plan = plan(&state, &self.storage);

        let mut report = MigrationReport {
            skipped: plan.already_updated.clone(),
            ..MigrationReport::default()
        };
        for note in &report.skipped {
            warn!("skipping: {note}");
        }

        for step in plan.steps {
            let description = self.describe(&step);
            if dry_run {
                info!("would apply: {description}");
            } else {
                self.apply(step).await?;
                info!("applied: {description}");
            }
            report.applied.push(description);
        }

        Ok(report)
    }

    async fn gather(
        &self,
        username: &str,
        old_group: &str,
        new_group: &str,
    ) -> Result<MigrationState> {
        let group_request = |name: &str| {
            SearchRequest::new(
                &self.group_base,
                format!("cn={}", escape_filter_value(name)),
            )
            .with_scope(SearchScope::OneLevel)
            .with_attributes(GROUP_ATTRIBUTES)
        };
        let user_request = SearchRequest::new(
            &self.people_base,
            format!("uid={}", escape_filter_value(username)),
        )
        .with_scope(SearchScope::OneLevel)
        .with_attributes(USER_ATTRIBUTES);

        let new_entry = self.directory.search_one(&group_request(new_group)).await?;
        let old_entry = self.directory.search_one(&group_request(old_group)).await?;
        let user_entry = self.directory.search_one(&user_request).await?;

        let new_group = DirectoryGroup::from_entry(&new_entry)?;
        let old_group = DirectoryGroup::from_entry(&old_entry)?;
        let user = DirectoryUser::from_entry(&user_entry)?;
        user.validate_complete(&USER_ATTRIBUTES)?;

        let billing_group = self.actmgr.get_group(&new_group.cn).await?;
        let account = self.actmgr.get_account(&user.uid).await?;

        let mut slurm_accounts = account.slurm_accounts();
        let new_account = new_group.slurm_account.clone();
        if !slurm_accounts.contains(&new_account) {
            slurm_accounts.push(new_account.clone());
        }
        let slurm_row_exists = self
            .sacctmgr
            .has_default_association(&user.uid, &new_account)
            .await?;

        Ok(MigrationState {
            user,
            old_group,
            new_group,
            account,
            billing_group,
            slurm_row_exists,
            slurm_accounts,
        })
    }

    async fn apply(&self, step: MigrationStep) -> Result<()> {
        match step {
            MigrationStep::UpdateBillingPrimaryGroup { account_id, group_id } => {
                self.actmgr
                    .update_account(account_id, &AccountUpdate::primary_group(group_id))
                    .await?;
            }
            MigrationStep::ReplaceUserGid { user_dn, gid } => {
                self.directory
                    .modify(
                        &user_dn,
                        &[DirectoryModification::replace("gidNumber", gid.to_string())],
                    )
                    .await?;
            }
            MigrationStep::AddGroupMember { group_dn, user_dn } => {
                self.directory
                    .modify(
                        &group_dn,
                        &[DirectoryModification::add("uniqueMember", user_dn)],
                    )
                    .await?;
            }
            MigrationStep::RemoveGroupMember { group_dn, user_dn } => {
                self.directory
                    .modify(
                        &group_dn,
                        &[DirectoryModification::delete("uniqueMember", user_dn)],
                    )
                    .await?;
            }
            MigrationStep::RecreateSlurmUser {
                user,
                old_account,
                accounts,
                default_account,
            } => {
                self.sacctmgr
                    .delete_user_from_account(&user, &old_account)
                    .await?;
                self.sacctmgr
                    .create_user(&user, &accounts, &default_account)
                    .await?;
            }
            MigrationStep::RegroupTree {
                path,
                old_group,
                new_group,
            } => {
                self.regroup_tree(Path::new(&path), &old_group, &new_group)
                    .await?;
            }
        }
        Ok(())
    }

    async fn regroup_tree(&self, path: &Path, old_group: &str, new_group: &str) -> Result<()> {
        info!(path = %path.display(), old_group, new_group, "re-grouping files");
        let args = vec![
            path.display().to_string(),
            "-group".to_string(),
            old_group.to_string(),
            "-exec".to_string(),
            "chgrp".to_string(),
            new_group.to_string(),
            "{}".to_string(),
            ";".to_string(),
        ];
        self.runner.run("find", &args).await?;
        Ok(())
    }

    fn describe(&self, step: &MigrationStep) -> String {
        match step {
            MigrationStep::UpdateBillingPrimaryGroup { account_id, group_id } => {
                format!("billing account {account_id}: primary group -> {group_id}")
            }
            MigrationStep::ReplaceUserGid { user_dn, gid } => {
                format!("directory {user_dn}: gidNumber -> {gid}")
            }
            MigrationStep::AddGroupMember { group_dn, user_dn } => {
                format!("directory {group_dn}: add uniqueMember {user_dn}")
            }
            MigrationStep::RemoveGroupMember { group_dn, user_dn } => {
                format!("directory {group_dn}: delete uniqueMember {user_dn}")
            }
            MigrationStep::RecreateSlurmUser {
                user,
                accounts,
                default_account,
                ..
            } => format!(
                "accounting {user}: recreate with accounts {} (default {default_account})",
                accounts.join(",")
            ),
            MigrationStep::RegroupTree {
                path,
                old_group,
                new_group,
            } => format!("files under {path}: chgrp {old_group} -> {new_group}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpcadm_actmgr::GroupRef;
    use std::path::PathBuf;

    fn storage() -> AccountHomeSettings {
        AccountHomeSettings {
            base_dir: PathBuf::from("/home"),
            scratch_base: PathBuf::from("/fdata"),
            extra_scratch_directories: Vec::new(),
            cleanup_exclude: Vec::new(),
            zfs_server: None,
            zfs_pool: "tank".to_string(),
            home_dataset: "tank/home".to_string(),
            beegfs_report: PathBuf::from("/tmp/beegfs_userspace.json"),
        }
    }

    fn group(cn: &str, gid: u32, members: &[&str]) -> DirectoryGroup {
        DirectoryGroup {
            dn: format!("cn={cn},ou=Groups,dc=cluster,dc=example,dc=edu"),
            cn: cn.to_string(),
            gid_number: gid,
            unique_members: members.iter().map(|m| (*m).to_string()).collect(),
            slurm_account: format!("{cn}-acct"),
        }
    }

    fn pending_state() -> MigrationState {
        let user_dn = "uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu";
        MigrationState {
            user: DirectoryUser {
                dn: user_dn.to_string(),
                uid: "jdoe".to_string(),
                uid_number: Some(10042),
                gid_number: Some(5000),
                login_shell: None,
                mail: Vec::new(),
                quota: None,
            },
            old_group: group("chem", 5000, &[user_dn]),
            new_group: group("physics", 6000, &[]),
            account: Account {
                id: 7,
                username: "jdoe".to_string(),
                status_id: Some(1),
                primary_group: Some(GroupRef {
                    id: 20,
                    name: Some("chem".to_string()),
                    alias: Some("chem-acct".to_string()),
                }),
                groups: vec![GroupRef {
                    id: 20,
                    name: Some("chem".to_string()),
                    alias: Some("chem-acct".to_string()),
                }],
            },
            billing_group: Group {
                id: 10,
                name: "physics".to_string(),
                alias: Some("physics-acct".to_string()),
            },
            slurm_row_exists: false,
            slurm_accounts: vec!["chem-acct".to_string(), "physics-acct".to_string()],
        }
    }

    fn migrated_state() -> MigrationState {
        let mut state = pending_state();
        let user_dn = state.user.dn.clone();
        state.user.gid_number = Some(6000);
        state.new_group.unique_members = vec![user_dn];
        state.old_group.unique_members = Vec::new();
        state.account.primary_group = Some(GroupRef {
            id: 10,
            name: Some("physics".to_string()),
            alias: Some("physics-acct".to_string()),
        });
        state.slurm_row_exists = true;
        state
    }

    #[test]
    fn pending_state_plans_every_step_in_order() {
        let state = pending_state();
        let plan = plan(&state, &storage());

        let kinds: Vec<&str> = plan
            .steps
            .iter()
            .map(|step| match step {
                MigrationStep::UpdateBillingPrimaryGroup { .. } => "billing",
                MigrationStep::ReplaceUserGid { .. } => "gid",
                MigrationStep::AddGroupMember { .. } => "add",
                MigrationStep::RemoveGroupMember { .. } => "remove",
                MigrationStep::RecreateSlurmUser { .. } => "slurm",
                MigrationStep::RegroupTree { .. } => "files",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["billing", "gid", "add", "remove", "slurm", "files", "files"]
        );
        assert!(plan.already_updated.is_empty());
    }

    #[test]
    fn migrated_state_plans_nothing() {
        let state = migrated_state();
        let plan = plan(&state, &storage());
        assert!(plan.is_empty());
        assert_eq!(plan.already_updated.len(), 5);
    }

    #[test]
    fn gid_replace_precedes_membership_edits() {
        let state = pending_state();
        let plan = plan(&state, &storage());
        let gid_pos = plan
            .steps
            .iter()
            .position(|s| matches!(s, MigrationStep::ReplaceUserGid { .. }))
            .unwrap();
        let add_pos = plan
            .steps
            .iter()
            .position(|s| matches!(s, MigrationStep::AddGroupMember { .. }))
            .unwrap();
        assert!(gid_pos < add_pos);
    }

    #[test]
    fn slurm_recreate_carries_full_account_set() {
        let state = pending_state();
        let plan = plan(&state, &storage());
        let step = plan
            .steps
            .iter()
            .find(|s| matches!(s, MigrationStep::RecreateSlurmUser { .. }))
            .unwrap();
        if let MigrationStep::RecreateSlurmUser {
            accounts,
            default_account,
            old_account,
            ..
        } = step
        {
            assert_eq!(accounts, &["chem-acct", "physics-acct"]);
            assert_eq!(default_account, "physics-acct");
            assert_eq!(old_account, "chem-acct");
        }
    }
}
