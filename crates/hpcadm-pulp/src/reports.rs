//! Report operations over the Pulp API.

use crate::client::{PulpClient, SearchCriteria};
use crate::models::{ContentUnit, Repository, RpmMetadata, Task};
use crate::Result;
use comfy_table::{presets, Table};
use serde_json::json;
use std::collections::BTreeSet;

/// Field set shown by the repository listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoFields {
    /// Sync/publish state and URLs.
    Summary,
    /// Flags and unit counts.
    Details,
}

/// Lists repositories (optionally restricted by id) as a rendered table,
/// sorted by name.
pub async fn repository_table(
    pulp: &PulpClient,
    ids: &[String],
    fields: RepoFields,
) -> Result<Table> {
    let repos: Vec<Repository> = pulp
        .search(
            "repositories/search/",
            &SearchCriteria::repositories(ids),
            Some(&json!({"importers": 1, "distributors": 1})),
        )
        .await?;

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut sorted = repos;
    sorted.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    for repo in &sorted {
        let distributor = repo.yum_distributor();
        let importer = repo.yum_importer();
        let dist_config = |key: &str| -> String {
            distributor
                .map(|d| display_value(&d.config[key]))
                .unwrap_or_default()
        };
        let imp_config = |key: &str| -> String {
            importer
                .map(|i| display_value(&i.config[key]))
                .unwrap_or_default()
        };

        let row = match fields {
            RepoFields::Summary => vec![
                repo.display_name.clone(),
                distributor
                    .and_then(|d| d.last_publish.clone())
                    .unwrap_or_default(),
                importer.and_then(|i| i.last_sync.clone()).unwrap_or_default(),
                dist_config("relative_url"),
                imp_config("feed"),
            ],
            RepoFields::Details => vec![
                repo.display_name.clone(),
                dist_config("http"),
                dist_config("https"),
                imp_config("remove_missing"),
                repo.unit_count("rpm").to_string(),
                repo.unit_count("package_group").to_string(),
                repo.unit_count("package_category").to_string(),
                repo.unit_count("distribution").to_string(),
            ],
        };
        rows.push(row);
    }

    let headers: Vec<&str> = match fields {
        RepoFields::Summary => vec!["name", "last_published", "last_sync", "relative_url", "feed"],
        RepoFields::Details => vec![
            "name",
            "http",
            "https",
            "remove_missing",
            "rpms",
            "package_group",
            "package_category",
            "distribution",
        ],
    };
    Ok(render(&headers, rows))
}

/// Fetches the rpm units of a repository, optionally filtered by a name
/// regex.
pub async fn repository_units(
    pulp: &PulpClient,
    repo_id: &str,
    name_regex: Option<&str>,
) -> Result<Vec<RpmMetadata>> {
    let path = format!("repositories/{repo_id}/search/units/");
    let units: Vec<ContentUnit> = pulp
        .search(&path, &SearchCriteria::rpm_units(name_regex), None)
        .await?;
    Ok(units.into_iter().filter_map(|unit| unit.metadata).collect())
}

/// Lists a repository's rpm units as a table sorted by
/// name/version/release.
pub async fn content_table(
    pulp: &PulpClient,
    repo_id: &str,
    name_regex: Option<&str>,
) -> Result<Table> {
    let mut units = repository_units(pulp, repo_id, name_regex).await?;
    units.sort();

    let rows = units
        .iter()
        .map(|unit| {
            vec![
                unit.name.clone(),
                unit.version.clone(),
                unit.release.clone(),
                unit.arch.clone(),
            ]
        })
        .collect();
    Ok(render(&["name", "version", "release", "arch"], rows))
}

/// Rpm labels present in `from_repo` but not in `to_repo`, sorted.
pub async fn content_diff(
    pulp: &PulpClient,
    from_repo: &str,
    to_repo: &str,
    name_regex: Option<&str>,
) -> Result<Vec<String>> {
    let from_units = repository_units(pulp, from_repo, name_regex).await?;
    let to_units = repository_units(pulp, to_repo, name_regex).await?;

    let from_labels: BTreeSet<String> = from_units.iter().map(RpmMetadata::nvra).collect();
    let to_labels: BTreeSet<String> = to_units.iter().map(RpmMetadata::nvra).collect();

    Ok(from_labels.difference(&to_labels).cloned().collect())
}

/// Lists tasks (optionally restricted to states) as a table ordered by
/// start time.
pub async fn task_table(pulp: &PulpClient, states: &[String]) -> Result<Table> {
    let tasks: Vec<Task> = pulp
        .search("tasks/search/", &SearchCriteria::tasks(states), None)
        .await?;

    let rows = tasks
        .iter()
        .filter(|task| !task.tags.is_empty())
        .map(|task| {
            vec![
                task.resource().unwrap_or_default(),
                task.action().unwrap_or_default().to_string(),
                task.state.clone(),
                task.start_time.clone().unwrap_or_default(),
                task.finish_time.clone().unwrap_or_default(),
                task.task_id.clone(),
            ]
        })
        .collect();
    Ok(render(
        &["Resource", "Action", "State", "Start", "Finish", "Task ID"],
        rows,
    ))
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::ASCII_FULL);
    table.set_header(headers.to_vec());
    for row in rows {
        table.add_row(row);
    }
    table
}
