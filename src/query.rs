//! Paginated read access over the canonical tables.
//!
//! The dashboards and the read API consume these tables directly; the
//! functions here back the `devstats show` command and double as the
//! contract check that a collection run leaves the data queryable as-is.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone)]
pub struct CommitSummary {
    pub sha: String,
    pub author_name: Option<String>,
    pub authored_date: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssueSummary {
    pub id: String,
    pub issue_key: Option<String>,
    pub issue_type: Option<String>,
    pub status: Option<String>,
    pub title: Option<String>,
    pub lead_time_minutes: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct DeploymentSummary {
    pub id: String,
    pub commit_sha: Option<String>,
    pub finish_time: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IncidentSummary {
    pub id: String,
    pub deployment_id: Option<String>,
    pub created_date: Option<i64>,
}

pub async fn list_commits(pool: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<CommitSummary>> {
    let rows = sqlx::query(
        "SELECT sha, author_name, authored_date, message FROM commits \
         ORDER BY authored_date DESC, sha LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CommitSummary {
            sha: row.get("sha"),
            author_name: row.get("author_name"),
            authored_date: row.get("authored_date"),
            message: row.get("message"),
        })
        .collect())
}

pub async fn list_issues(pool: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<IssueSummary>> {
    let rows = sqlx::query(
        "SELECT id, issue_key, type, status, title, lead_time_minutes FROM issues \
         ORDER BY created_date DESC, id LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(issue_from_row).collect())
}

pub async fn get_issue(pool: &SqlitePool, key: &str) -> Result<Option<IssueSummary>> {
    let row = sqlx::query(
        "SELECT id, issue_key, type, status, title, lead_time_minutes FROM issues \
         WHERE issue_key = ?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(issue_from_row))
}

fn issue_from_row(row: sqlx::sqlite::SqliteRow) -> IssueSummary {
    IssueSummary {
        id: row.get("id"),
        issue_key: row.get("issue_key"),
        issue_type: row.get("type"),
        status: row.get("status"),
        title: row.get("title"),
        lead_time_minutes: row.get("lead_time_minutes"),
    }
}

pub async fn list_deployments(
    pool: &SqlitePool,
    skip: i64,
    limit: i64,
) -> Result<Vec<DeploymentSummary>> {
    let rows = sqlx::query(
        "SELECT id, commit_sha, finish_time FROM deployments \
         ORDER BY finish_time DESC, id LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DeploymentSummary {
            id: row.get("id"),
            commit_sha: row.get("commit_sha"),
            finish_time: row.get("finish_time"),
        })
        .collect())
}

pub async fn list_incidents(
    pool: &SqlitePool,
    skip: i64,
    limit: i64,
) -> Result<Vec<IncidentSummary>> {
    let rows = sqlx::query(
        "SELECT id, deployment_id, created_date FROM incidents \
         ORDER BY created_date DESC, id LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| IncidentSummary {
            id: row.get("id"),
            deployment_id: row.get("deployment_id"),
            created_date: row.get("created_date"),
        })
        .collect())
}
