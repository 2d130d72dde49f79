//! Typed wrappers over directory entries for people and groups.

use crate::dn::DistinguishedName;
use crate::entry::{DirectoryEntry, Projection};
use crate::Result;
use hpcadm_core::Error;

/// Attributes fetched for group entries.
pub const GROUP_ATTRIBUTES: [&str; 4] = ["cn", "gidNumber", "uniqueMember", "slurmAccountName"];

/// Attributes fetched for user entries during group migration.
pub const USER_ATTRIBUTES: [&str; 2] = ["uid", "gidNumber"];

/// Attributes fetched for user entries during quota reconciliation.
pub const QUOTA_USER_ATTRIBUTES: [&str; 5] = ["uid", "uidNumber", "mail", "quota", "loginShell"];

/// A person entry projected to the fields the maintenance procedures use.
///
/// Fields absent from the directory entry are `None` (or empty for
/// `mail`); [`DirectoryUser::validate_complete`] enforces presence where a
/// procedure needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Login name (`uid`).
    pub uid: String,
    /// Numeric user id (`uidNumber`).
    pub uid_number: Option<u32>,
    /// Primary group id (`gidNumber`).
    pub gid_number: Option<u32>,
    /// Login shell.
    pub login_shell: Option<String>,
    /// Mail addresses, in directory order.
    pub mail: Vec<String>,
    /// Raw filesystem quota attribute, unparsed.
    pub quota: Option<String>,
}

impl DirectoryUser {
    /// Builds a user from a raw directory entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityError`] when `uid` is missing and
    /// [`Error::ParseError`] when a numeric attribute does not parse.
    pub fn from_entry(entry: &DirectoryEntry) -> Result<Self> {
        let projection = Projection::new(entry, &["mail"]);
        let uid = projection
            .scalar("uid")
            .ok_or_else(|| {
                Error::IntegrityError(format!("entry {} has no uid attribute", entry.dn))
            })?
            .to_string();

        Ok(Self {
            dn: projection.dn().to_string(),
            uid,
            uid_number: parse_numeric(&projection, "uidNumber")?,
            gid_number: parse_numeric(&projection, "gidNumber")?,
            login_shell: projection.scalar("loginShell").map(str::to_string),
            mail: projection.list("mail").unwrap_or_default().to_vec(),
            quota: projection.scalar("quota").map(str::to_string),
        })
    }

    /// Verifies that every named attribute was present on the entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityError`] naming the missing attributes.
    pub fn validate_complete(&self, required: &[&str]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|attribute| match *attribute {
                "uid" => false,
                "uidNumber" => self.uid_number.is_none(),
                "gidNumber" => self.gid_number.is_none(),
                "loginShell" => self.login_shell.is_none(),
                "mail" => self.mail.is_empty(),
                "quota" => self.quota.is_none(),
                _ => true,
            })
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::IntegrityError(format!(
                "user {} is missing required attributes: {}",
                self.uid,
                missing.join(", ")
            )))
        }
    }
}

/// A posix group entry projected to the fields the procedures use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryGroup {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Group name (`cn`).
    pub cn: String,
    /// Numeric group id (`gidNumber`).
    pub gid_number: u32,
    /// Member DNs, in directory order.
    pub unique_members: Vec<String>,
    /// Accounting account name; falls back to `cn` when the directory
    /// carries no `slurmAccountName`.
    pub slurm_account: String,
}

impl DirectoryGroup {
    /// Builds a group from a raw directory entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityError`] when `cn` or `gidNumber` is
    /// missing and [`Error::ParseError`] when `gidNumber` does not parse.
    pub fn from_entry(entry: &DirectoryEntry) -> Result<Self> {
        let projection = Projection::new(entry, &["uniqueMember"]);
        let cn = projection
            .scalar("cn")
            .ok_or_else(|| {
                Error::IntegrityError(format!("entry {} has no cn attribute", entry.dn))
            })?
            .to_string();
        let gid_number = parse_numeric(&projection, "gidNumber")?.ok_or_else(|| {
            Error::IntegrityError(format!("group {cn} has no gidNumber attribute"))
        })?;
        let slurm_account = projection
            .scalar("slurmAccountName")
            .unwrap_or(&cn)
            .to_string();

        Ok(Self {
            dn: projection.dn().to_string(),
            cn,
            gid_number,
            unique_members: projection.list("uniqueMember").unwrap_or_default().to_vec(),
            slurm_account,
        })
    }

    /// Returns true when the DN is already a member of this group.
    ///
    /// DNs are compared component-wise via [`DistinguishedName`], so case,
    /// spacing, and escaping differences do not produce false negatives.
    /// Member values that are not valid DNs fall back to a plain
    /// case-insensitive string comparison.
    #[must_use]
    pub fn has_member(&self, dn: &str) -> bool {
        let target = DistinguishedName::parse(dn).ok();
        self.unique_members.iter().any(|member| {
            match (&target, DistinguishedName::parse(member).ok()) {
                (Some(target), Some(member)) => member.matches(target),
                _ => member.eq_ignore_ascii_case(dn),
            }
        })
    }
}

fn parse_numeric(projection: &Projection, attribute: &str) -> Result<Option<u32>> {
    projection
        .scalar(attribute)
        .map(|value| {
            value.parse::<u32>().map_err(|_| {
                Error::ParseError(format!(
                    "attribute {attribute} of {} is not numeric: {value}",
                    projection.dn()
                ))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn user_entry() -> DirectoryEntry {
        let mut attributes = HashMap::new();
        attributes.insert("uid".to_string(), vec!["jdoe".to_string()]);
        attributes.insert("uidNumber".to_string(), vec!["10042".to_string()]);
        attributes.insert("gidNumber".to_string(), vec!["5000".to_string()]);
        attributes.insert("loginShell".to_string(), vec!["/bin/bash".to_string()]);
        attributes.insert(
            "mail".to_string(),
            vec!["jdoe@example.edu".to_string(), "jd@example.edu".to_string()],
        );
        attributes.insert(
            "quota".to_string(),
            vec!["/home:9437184,10485760,0,0".to_string()],
        );
        DirectoryEntry {
            dn: "uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu".to_string(),
            attributes,
        }
    }

    fn group_entry() -> DirectoryEntry {
        let mut attributes = HashMap::new();
        attributes.insert("cn".to_string(), vec!["physics".to_string()]);
        attributes.insert("gidNumber".to_string(), vec!["6000".to_string()]);
        attributes.insert(
            "uniqueMember".to_string(),
            vec![
                "uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu".to_string(),
                "uid=asmith,ou=People,dc=cluster,dc=example,dc=edu".to_string(),
            ],
        );
        DirectoryEntry {
            dn: "cn=physics,ou=Groups,dc=cluster,dc=example,dc=edu".to_string(),
            attributes,
        }
    }

    #[test]
    fn user_from_entry() {
        let user = DirectoryUser::from_entry(&user_entry()).unwrap();
        assert_eq!(user.uid, "jdoe");
        assert_eq!(user.uid_number, Some(10042));
        assert_eq!(user.gid_number, Some(5000));
        assert_eq!(user.login_shell.as_deref(), Some("/bin/bash"));
        assert_eq!(user.mail.len(), 2);
        assert_eq!(user.quota.as_deref(), Some("/home:9437184,10485760,0,0"));
    }

    #[test]
    fn user_without_uid_is_rejected() {
        let mut entry = user_entry();
        entry.attributes.remove("uid");
        assert!(matches!(
            DirectoryUser::from_entry(&entry),
            Err(Error::IntegrityError(_))
        ));
    }

    #[test]
    fn user_with_bad_uid_number_is_rejected() {
        let mut entry = user_entry();
        entry
            .attributes
            .insert("uidNumber".to_string(), vec!["ten".to_string()]);
        assert!(matches!(
            DirectoryUser::from_entry(&entry),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn validate_complete_reports_missing_attributes() {
        let mut entry = user_entry();
        entry.attributes.remove("quota");
        entry.attributes.remove("loginShell");
        let user = DirectoryUser::from_entry(&entry).unwrap();
        let err = user
            .validate_complete(&QUOTA_USER_ATTRIBUTES)
            .unwrap_err()
            .to_string();
        assert!(err.contains("quota"));
        assert!(err.contains("loginShell"));
    }

    #[test]
    fn group_from_entry() {
        let group = DirectoryGroup::from_entry(&group_entry()).unwrap();
        assert_eq!(group.cn, "physics");
        assert_eq!(group.gid_number, 6000);
        assert_eq!(group.unique_members.len(), 2);
        assert!(group.has_member("uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu"));
        assert!(!group.has_member("uid=nobody,ou=People,dc=cluster,dc=example,dc=edu"));
    }

    #[test]
    fn membership_survives_dn_formatting_differences() {
        let mut entry = group_entry();
        entry.attributes.insert(
            "uniqueMember".to_string(),
            vec![
                "UID=JDoe, OU=People, DC=cluster, DC=example, DC=edu".to_string(),
                "cn=Smith\\, John,ou=People,dc=cluster,dc=example,dc=edu".to_string(),
            ],
        );
        let group = DirectoryGroup::from_entry(&entry).unwrap();

        assert!(group.has_member("uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu"));
        assert!(group.has_member("CN=smith\\, john, ou=People, dc=cluster, dc=example, dc=edu"));
        assert!(!group.has_member("uid=jdoe,ou=People,dc=other,dc=example,dc=edu"));
    }

    #[test]
    fn slurm_account_falls_back_to_cn() {
        let group = DirectoryGroup::from_entry(&group_entry()).unwrap();
        assert_eq!(group.slurm_account, "physics");

        let mut entry = group_entry();
        entry
            .attributes
            .insert("slurmAccountName".to_string(), vec!["phys-acct".to_string()]);
        let group = DirectoryGroup::from_entry(&entry).unwrap();
        assert_eq!(group.slurm_account, "phys-acct");
    }

    #[test]
    fn group_without_gid_is_rejected() {
        let mut entry = group_entry();
        entry.attributes.remove("gidNumber");
        assert!(matches!(
            DirectoryGroup::from_entry(&entry),
            Err(Error::IntegrityError(_))
        ));
    }
}
