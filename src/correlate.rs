//! Derived-entity correlation: Deployment and Incident rows.
//!
//! Neither entity is collected from any source. Deployments are inferred
//! from successful builds whose job name matches the configured pattern;
//! incidents tie each BUG issue to the deployment that most recently
//! finished before the issue was created. Both are recomputed in full
//! from the persisted base tables on every run — re-running against
//! unchanged data reproduces identical rows, regardless of the order
//! builds or issues were fetched in.

use anyhow::Result;
use serde_json::json;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::info;

use crate::models::{Entity, Record};
use crate::upsert;

#[derive(Debug, Clone)]
pub struct BuildRow {
    pub id: String,
    pub job_name: Option<String>,
    pub status: Option<String>,
    pub start_time: Option<i64>,
    pub finish_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRow {
    pub id: String,
    pub commit_sha: Option<String>,
    pub start_time: Option<i64>,
    pub finish_time: i64,
}

#[derive(Debug, Clone)]
pub struct BugIssueRow {
    pub id: String,
    pub created_date: Option<i64>,
    pub resolved_date: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncidentRow {
    pub id: String,
    pub deployment_id: Option<String>,
    pub created_date: Option<i64>,
    pub resolved_date: Option<i64>,
}

/// A build qualifies as a deployment iff its job name contains the
/// pattern and it succeeded. Builds without a finish time never qualify:
/// an unordered deployment cannot participate in incident correlation.
///
/// The representative commit is the first of the build's commits in the
/// order the CI system reported them, or `None` for an empty changeset.
pub fn detect_deployments(
    builds: &[BuildRow],
    commits_by_build: &HashMap<String, Vec<String>>,
    pattern: &str,
) -> Vec<DeploymentRow> {
    builds
        .iter()
        .filter(|build| {
            build.job_name.as_deref().is_some_and(|name| name.contains(pattern))
                && build.status.as_deref() == Some("SUCCESS")
        })
        .filter_map(|build| {
            let finish_time = build.finish_time?;
            let commit_sha = commits_by_build
                .get(&build.id)
                .and_then(|shas| shas.first())
                .cloned();
            Some(DeploymentRow {
                id: build.id.clone(),
                commit_sha,
                start_time: build.start_time,
                finish_time,
            })
        })
        .collect()
}

/// Link each BUG issue to the deployment with the latest finish strictly
/// before the issue's creation, or to nothing if none qualifies.
///
/// Deployments are sorted once by `(finish_time, id)` and each issue is
/// resolved with a binary search. When two deployments share a finish
/// instant the lexically greatest id wins — the sort puts it last among
/// the ties, and the search takes the last element before the cutoff.
pub fn correlate_incidents(
    deployments: &[DeploymentRow],
    issues: &[BugIssueRow],
) -> Vec<IncidentRow> {
    let mut ordered: Vec<(&i64, &str)> = deployments
        .iter()
        .map(|d| (&d.finish_time, d.id.as_str()))
        .collect();
    ordered.sort_unstable();

    issues
        .iter()
        .map(|issue| {
            let deployment_id = issue.created_date.and_then(|created| {
                let cutoff = ordered.partition_point(|(finish, _)| **finish < created);
                cutoff
                    .checked_sub(1)
                    .map(|index| ordered[index].1.to_string())
            });
            IncidentRow {
                id: issue.id.clone(),
                deployment_id,
                created_date: issue.created_date,
                resolved_date: issue.resolved_date,
            }
        })
        .collect()
}

/// Recompute and persist both derived tables. Each table's contents
/// are replaced wholesale, so rows whose underlying build or issue no
/// longer qualifies (a demoted build status, a re-typed issue) are
/// pruned in the same run. Returns the number of deployments and
/// incidents written.
pub async fn run_correlation(pool: &SqlitePool, pattern: &str) -> Result<(usize, usize)> {
    let builds = load_builds(pool).await?;
    let commits_by_build = load_build_commits(pool).await?;

    let deployments = detect_deployments(&builds, &commits_by_build, pattern);
    let deployment_records: Vec<Record> = deployments
        .iter()
        .map(|d| {
            json!({
                "id": d.id,
                "commit_sha": d.commit_sha,
                "start_time": d.start_time,
                "finish_time": d.finish_time,
            })
            .as_object()
            .expect("object literal")
            .clone()
        })
        .collect();
    upsert::replace(pool, Entity::Deployment, &deployment_records).await?;
    info!(count = deployments.len(), "derived deployments");

    let issues = load_bug_issues(pool).await?;
    let incidents = correlate_incidents(&deployments, &issues);
    let incident_records: Vec<Record> = incidents
        .iter()
        .map(|i| {
            json!({
                "id": i.id,
                "deployment_id": i.deployment_id,
                "created_date": i.created_date,
                "resolved_date": i.resolved_date,
            })
            .as_object()
            .expect("object literal")
            .clone()
        })
        .collect();
    upsert::replace(pool, Entity::Incident, &incident_records).await?;
    info!(count = incidents.len(), "derived incidents");

    Ok((deployments.len(), incidents.len()))
}

async fn load_builds(pool: &SqlitePool) -> Result<Vec<BuildRow>> {
    let rows = sqlx::query(
        "SELECT id, job_name, status, start_time, finish_time FROM builds ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| BuildRow {
            id: row.get("id"),
            job_name: row.get("job_name"),
            status: row.get("status"),
            start_time: row.get("start_time"),
            finish_time: row.get("finish_time"),
        })
        .collect())
}

async fn load_build_commits(pool: &SqlitePool) -> Result<HashMap<String, Vec<String>>> {
    let rows = sqlx::query(
        "SELECT build_id, commit_sha FROM build_commits ORDER BY build_id, ordinal",
    )
    .fetch_all(pool)
    .await?;

    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        map.entry(row.get("build_id"))
            .or_default()
            .push(row.get("commit_sha"));
    }
    Ok(map)
}

async fn load_bug_issues(pool: &SqlitePool) -> Result<Vec<BugIssueRow>> {
    let rows = sqlx::query(
        "SELECT id, created_date, resolved_date FROM issues WHERE type = 'BUG' ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| BugIssueRow {
            id: row.get("id"),
            created_date: row.get("created_date"),
            resolved_date: row.get("resolved_date"),
        })
        .collect())
}
