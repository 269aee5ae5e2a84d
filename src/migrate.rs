//! Schema creation for the canonical entity tables.
//!
//! Every statement is idempotent, so `devstats init` can be re-run at
//! any time. Foreign keys between tables are deliberately not declared:
//! sources are collected as independent jobs, so a build batch may land
//! before the commits its changeset references.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commits (
            sha TEXT PRIMARY KEY,
            author_name TEXT,
            author_email TEXT,
            authored_date INTEGER,
            message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issues (
            id TEXT PRIMARY KEY,
            issue_key TEXT,
            type TEXT,
            status TEXT,
            title TEXT,
            created_date INTEGER,
            resolved_date INTEGER,
            lead_time_minutes INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS code_reviews (
            id TEXT PRIMARY KEY,
            repo_name TEXT,
            review_number INTEGER,
            title TEXT,
            author TEXT,
            created_date INTEGER,
            merged_date INTEGER,
            time_to_merge_minutes INTEGER,
            comment_count INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS builds (
            id TEXT PRIMARY KEY,
            job_name TEXT,
            number INTEGER,
            status TEXT,
            start_time INTEGER,
            finish_time INTEGER,
            duration_millis INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // ordinal preserves the order the CI system reported the commits of
    // a build; the correlator reads it back to pick the representative
    // commit of a deployment.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_commits (
            build_id TEXT NOT NULL,
            commit_sha TEXT NOT NULL,
            ordinal INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (build_id, commit_sha)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployments (
            id TEXT PRIMARY KEY,
            commit_sha TEXT,
            start_time INTEGER,
            finish_time INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS incidents (
            id TEXT PRIMARY KEY,
            deployment_id TEXT,
            created_date INTEGER,
            resolved_date INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quality_metrics (
            analysis_date TEXT NOT NULL,
            project_key TEXT NOT NULL,
            metric_name TEXT NOT NULL,
            metric_value REAL,
            PRIMARY KEY (analysis_date, project_key, metric_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_runs (
            id TEXT PRIMARY KEY,
            run_name TEXT,
            test_plan TEXT,
            start_time INTEGER,
            end_time INTEGER,
            total_tests INTEGER,
            passed_tests INTEGER,
            failed_tests INTEGER,
            pass_rate REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_issues_type ON issues(type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_builds_job_name ON builds(job_name)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deployments_finish_time ON deployments(finish_time)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_build_commits_build ON build_commits(build_id, ordinal)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
