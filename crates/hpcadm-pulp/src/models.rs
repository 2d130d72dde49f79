//! Data models for Pulp v2 responses.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// A repository record from `repositories/search/`.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    /// Repository id.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Attached distributors.
    #[serde(default)]
    pub distributors: Vec<Distributor>,
    /// Attached importers.
    #[serde(default)]
    pub importers: Vec<Importer>,
    /// Unit counts keyed by content type (`rpm`, `package_group`, ...).
    #[serde(default)]
    pub content_unit_counts: HashMap<String, u64>,
}

impl Repository {
    /// The yum distributor, when attached.
    #[must_use]
    pub fn yum_distributor(&self) -> Option<&Distributor> {
        self.distributors
            .iter()
            .find(|d| d.distributor_type_id == "yum_distributor")
    }

    /// The yum importer, when attached.
    #[must_use]
    pub fn yum_importer(&self) -> Option<&Importer> {
        self.importers
            .iter()
            .find(|i| i.importer_type_id == "yum_importer")
    }

    /// Unit count for a content type, 0 when absent.
    #[must_use]
    pub fn unit_count(&self, content_type: &str) -> u64 {
        self.content_unit_counts
            .get(content_type)
            .copied()
            .unwrap_or(0)
    }
}

/// A repository distributor.
#[derive(Debug, Clone, Deserialize)]
pub struct Distributor {
    /// Distributor type, e.g. `yum_distributor`.
    pub distributor_type_id: String,
    /// Last publish timestamp.
    #[serde(default)]
    pub last_publish: Option<String>,
    /// Distributor configuration document.
    #[serde(default)]
    pub config: Value,
}

/// A repository importer.
#[derive(Debug, Clone, Deserialize)]
pub struct Importer {
    /// Importer type, e.g. `yum_importer`.
    pub importer_type_id: String,
    /// Last sync timestamp.
    #[serde(default)]
    pub last_sync: Option<String>,
    /// Importer configuration document.
    #[serde(default)]
    pub config: Value,
}

/// Rpm unit metadata from a unit search.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
pub struct RpmMetadata {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Package release.
    pub release: String,
    /// Package architecture.
    pub arch: String,
}

impl RpmMetadata {
    /// `name-version-release.arch` label.
    #[must_use]
    pub fn nvra(&self) -> String {
        format!(
            "{}-{}-{}.{}",
            self.name, self.version, self.release, self.arch
        )
    }
}

/// A content unit row from `repositories/<id>/search/units/`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentUnit {
    /// Unit metadata; absent for units of unexpected types.
    #[serde(default)]
    pub metadata: Option<RpmMetadata>,
}

/// A task record from `tasks/search/`.
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    /// Task id.
    pub task_id: String,
    /// Current state, e.g. `running`.
    pub state: String,
    /// Start timestamp.
    #[serde(default)]
    pub start_time: Option<String>,
    /// Finish timestamp.
    #[serde(default)]
    pub finish_time: Option<String>,
    /// Task tags (`pulp:repository:<id>`, `pulp:action:<name>`).
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Task {
    /// Action name derived from the `pulp:action:` tag.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.tags
            .iter()
            .find_map(|tag| tag.strip_prefix("pulp:action:"))
    }

    /// Resource label (`<id> (<kind>)`) derived from the remaining
    /// `pulp:<kind>:<id>` tag.
    #[must_use]
    pub fn resource(&self) -> Option<String> {
        self.tags
            .iter()
            .filter(|tag| !tag.starts_with("pulp:action:"))
            .find_map(|tag| {
                let rest = tag.strip_prefix("pulp:")?;
                let (kind, id) = rest.split_once(':')?;
                Some(format!("{id} ({kind})"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repository_selects_yum_plugins() {
        let repo: Repository = serde_json::from_value(json!({
            "id": "centos-7-base",
            "display_name": "centos-7-base",
            "distributors": [
                {"distributor_type_id": "export_distributor", "config": {}},
                {
                    "distributor_type_id": "yum_distributor",
                    "last_publish": "2026-08-01T00:00:00Z",
                    "config": {"relative_url": "centos/7/base", "http": false, "https": true},
                },
            ],
            "importers": [{
                "importer_type_id": "yum_importer",
                "last_sync": "2026-08-01T00:00:00Z",
                "config": {"feed": "http://mirror.example.edu/centos/7/os/x86_64/"},
            }],
            "content_unit_counts": {"rpm": 9007},
        }))
        .unwrap();

        assert_eq!(
            repo.yum_distributor().unwrap().config["relative_url"],
            json!("centos/7/base")
        );
        assert!(repo.yum_importer().is_some());
        assert_eq!(repo.unit_count("rpm"), 9007);
        assert_eq!(repo.unit_count("distribution"), 0);
    }

    #[test]
    fn task_tag_parsing() {
        let task: Task = serde_json::from_value(json!({
            "task_id": "5cfedd93",
            "state": "waiting",
            "tags": ["pulp:repository:epel-7-testing", "pulp:action:publish"],
        }))
        .unwrap();
        assert_eq!(task.action(), Some("publish"));
        assert_eq!(task.resource().as_deref(), Some("epel-7-testing (repository)"));
    }

    #[test]
    fn nvra_label() {
        let rpm = RpmMetadata {
            name: "zlib-devel".to_string(),
            version: "1.2.7".to_string(),
            release: "18.el7".to_string(),
            arch: "x86_64".to_string(),
        };
        assert_eq!(rpm.nvra(), "zlib-devel-1.2.7-18.el7.x86_64");
    }
}
