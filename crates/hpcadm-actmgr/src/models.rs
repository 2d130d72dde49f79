//! Data models for the account-management API.

use serde::{Deserialize, Serialize};

/// An account status such as `ACTIVE` or `CLOSED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Status identifier.
    pub id: u64,
    /// Status name.
    pub name: String,
}

/// Group reference embedded in account responses.
///
/// Not every group carries an accounting alias; membership entries
/// without one are skipped when deriving accounting account lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    /// Group identifier.
    pub id: u64,
    /// Group name, when present in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Accounting (SLURM) account alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// A user account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: u64,
    /// Login name.
    pub username: String,
    /// Current status identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<u64>,
    /// Primary group of the account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_group: Option<GroupRef>,
    /// All group memberships.
    #[serde(default)]
    pub groups: Vec<GroupRef>,
}

impl Account {
    /// Accounting account of the primary group, when assigned.
    #[must_use]
    pub fn primary_slurm_account(&self) -> Option<&str> {
        self.primary_group
            .as_ref()
            .and_then(|group| group.alias.as_deref())
    }

    /// Accounting accounts of all group memberships that carry an alias,
    /// with the primary group's alias appended when missing.
    #[must_use]
    pub fn slurm_accounts(&self) -> Vec<String> {
        let mut accounts: Vec<String> = self
            .groups
            .iter()
            .filter_map(|group| group.alias.clone())
            .collect();
        if let Some(primary) = self.primary_slurm_account() {
            if !accounts.iter().any(|account| account == primary) {
                accounts.push(primary.to_string());
            }
        }
        accounts
    }
}

/// A group record from the groups endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier.
    pub id: u64,
    /// Group name.
    pub name: String,
    /// Accounting (SLURM) account alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Filter for account listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountFilter {
    /// Restrict to a single login name.
    pub username: Option<String>,
    /// Restrict to accounts in a given status.
    pub status_id: Option<u64>,
}

impl AccountFilter {
    /// Filter on a single login name.
    #[must_use]
    pub fn by_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    /// Filter on a status identifier.
    #[must_use]
    pub fn by_status(status_id: u64) -> Self {
        Self {
            status_id: Some(status_id),
            ..Self::default()
        }
    }

    /// Additionally restrict to a status identifier.
    #[must_use]
    pub const fn with_status(mut self, status_id: u64) -> Self {
        self.status_id = Some(status_id);
        self
    }
}

/// Fields that can be changed on an account.
///
/// Serialized inside the `{"account": {...}}` request envelope; absent
/// fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountUpdate {
    /// New primary group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_group_id: Option<u64>,
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<u64>,
}

impl AccountUpdate {
    /// Update that reassigns the primary group.
    #[must_use]
    pub const fn primary_group(group_id: u64) -> Self {
        Self {
            primary_group_id: Some(group_id),
            status_id: None,
        }
    }

    /// Update that moves the account to a status.
    #[must_use]
    pub const fn status(status_id: u64) -> Self {
        Self {
            primary_group_id: None,
            status_id: Some(status_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slurm_accounts_include_primary_alias_once() {
        let account = Account {
            id: 7,
            username: "jdoe".to_string(),
            status_id: Some(1),
            primary_group: Some(GroupRef {
                id: 1,
                name: Some("physics".to_string()),
                alias: Some("phys-acct".to_string()),
            }),
            groups: vec![
                GroupRef {
                    id: 1,
                    name: Some("physics".to_string()),
                    alias: Some("phys-acct".to_string()),
                },
                GroupRef {
                    id: 2,
                    name: Some("staff".to_string()),
                    alias: None,
                },
                GroupRef {
                    id: 3,
                    name: Some("chem".to_string()),
                    alias: Some("chem-acct".to_string()),
                },
            ],
        };

        assert_eq!(account.primary_slurm_account(), Some("phys-acct"));
        assert_eq!(account.slurm_accounts(), vec!["phys-acct", "chem-acct"]);
    }

    #[test]
    fn slurm_accounts_append_missing_primary() {
        let account = Account {
            id: 7,
            username: "jdoe".to_string(),
            status_id: None,
            primary_group: Some(GroupRef {
                id: 1,
                name: None,
                alias: Some("phys-acct".to_string()),
            }),
            groups: Vec::new(),
        };
        assert_eq!(account.slurm_accounts(), vec!["phys-acct"]);
    }

    #[test]
    fn account_update_skips_absent_fields() {
        let body = serde_json::to_value(AccountUpdate::primary_group(42)).unwrap();
        assert_eq!(body, serde_json::json!({"primary_group_id": 42}));
    }
}
