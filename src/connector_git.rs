//! Git source connector: local repository history plus, when a hosting
//! API is configured, pull requests for the same repository.
//!
//! Commits come from the `git` CLI against a local clone (cloned or
//! pulled on each collection). Pull requests come from the hosting
//! service's REST API. Both kinds of record are returned in one payload,
//! tagged with a `kind` field; the git processor fans them out into
//! Commit and CodeReview batches.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Command;
use tracing::warn;

use crate::config::GitSourceConfig;
use crate::models::RawRecord;
use crate::traits::Connector;

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

pub struct GitConnector {
    config: Option<GitSourceConfig>,
}

impl GitConnector {
    pub fn new(config: Option<GitSourceConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for GitConnector {
    fn name(&self) -> &str {
        "git"
    }

    fn description(&self) -> &str {
        "Commits from a local git clone, pull requests from the hosting API"
    }

    fn configured(&self) -> bool {
        self.config.is_some()
    }

    async fn collect(&self) -> Result<Vec<RawRecord>> {
        let Some(config) = &self.config else {
            warn!("git source not configured, collecting nothing");
            return Ok(vec![]);
        };

        let mut records = match collect_commits(config) {
            Ok(commits) => commits,
            Err(error) => {
                warn!(%error, "git commit collection failed");
                vec![]
            }
        };

        match (&config.api_url, &config.repo, &config.token) {
            (Some(api_url), Some(repo), Some(token)) => {
                match collect_pull_requests(api_url, repo, token, config.max_reviews).await {
                    Ok(mut reviews) => records.append(&mut reviews),
                    Err(error) => warn!(%error, "pull request collection failed"),
                }
            }
            _ => warn!("hosting API not configured, skipping pull requests"),
        }

        Ok(records)
    }
}

fn collect_commits(config: &GitSourceConfig) -> Result<Vec<RawRecord>> {
    ensure_repo(config)?;

    let format = format!(
        "%H{FIELD_SEP}%an{FIELD_SEP}%ae{FIELD_SEP}%aI{FIELD_SEP}%B{RECORD_SEP}"
    );
    let output = Command::new("git")
        .args([
            "log",
            "HEAD",
            &format!("--max-count={}", config.max_commits),
            &format!("--pretty=format:{format}"),
        ])
        .current_dir(&config.repo_path)
        .output()
        .context("Failed to run git log")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git log failed: {}", stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut records = Vec::new();
    for chunk in stdout.split(RECORD_SEP) {
        let fields: Vec<&str> = chunk.trim_start().split(FIELD_SEP).collect();
        if fields.len() != 5 {
            continue;
        }
        records.push(
            json!({
                "kind": "commit",
                "hexsha": fields[0],
                "author_name": fields[1],
                "author_email": fields[2],
                "authored_at": fields[3],
                "message": fields[4].trim(),
            })
            .as_object()
            .expect("object literal")
            .clone(),
        );
    }
    Ok(records)
}

/// Clone the repository if the working copy is missing, otherwise pull
/// the configured branch.
fn ensure_repo(config: &GitSourceConfig) -> Result<()> {
    if config.repo_path.join(".git").exists() {
        // A failed pull is not fatal: collect from the existing clone.
        if let Err(error) = git_pull(&config.repo_path, &config.branch) {
            warn!(%error, "git pull failed, collecting from existing clone");
        }
        return Ok(());
    }

    let Some(url) = &config.repo_url else {
        anyhow::bail!(
            "no repository at {} and no repo_url to clone from",
            config.repo_path.display()
        );
    };
    git_clone(url, &config.branch, &config.repo_path)
}

fn git_clone(url: &str, branch: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let output = Command::new("git")
        .args(["clone", "--branch", branch, "--single-branch", url])
        .arg(dest)
        .output()
        .context("Failed to run git clone")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git clone failed: {}", stderr.trim());
    }
    Ok(())
}

fn git_pull(repo: &Path, branch: &str) -> Result<()> {
    let output = Command::new("git")
        .args(["pull", "--ff-only", "origin", branch])
        .current_dir(repo)
        .output()
        .context("Failed to run git pull")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git pull failed: {}", stderr.trim());
    }
    Ok(())
}

async fn collect_pull_requests(
    api_url: &str,
    repo: &str,
    token: &str,
    max_reviews: usize,
) -> Result<Vec<RawRecord>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent("devstats-collector")
        .build()?;

    let url = format!("{}/repos/{}/pulls", api_url.trim_end_matches('/'), repo);
    let response = client
        .get(&url)
        .bearer_auth(token)
        .query(&[
            ("state", "all"),
            ("sort", "created"),
            ("direction", "desc"),
            ("per_page", &max_reviews.min(100).to_string()),
        ])
        .send()
        .await?
        .error_for_status()?;

    let pulls: Vec<Value> = response.json().await?;
    let records = pulls
        .iter()
        .take(max_reviews)
        .map(|pr| {
            json!({
                "kind": "pull_request",
                "repo": repo,
                "number": pr.get("number").cloned().unwrap_or(Value::Null),
                "title": pr.get("title").cloned().unwrap_or(Value::Null),
                "author": pr.pointer("/user/login").cloned().unwrap_or(Value::Null),
                "created_at": pr.get("created_at").cloned().unwrap_or(Value::Null),
                "merged_at": pr.get("merged_at").cloned().unwrap_or(Value::Null),
                "comments": pr.get("comments").cloned().unwrap_or(Value::Null),
            })
            .as_object()
            .expect("object literal")
            .clone()
        })
        .collect();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir)
                .status()
                .unwrap();
            assert!(status.success(), "git {args:?} failed");
        };
        run(&["init", "--initial-branch=main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
        std::fs::write(dir.join("README.md"), "hello").unwrap();
        run(&["add", "."]);
        run(&["commit", "-m", "initial commit"]);
        std::fs::write(dir.join("README.md"), "hello again").unwrap();
        run(&["add", "."]);
        run(&["commit", "-m", "second commit"]);
    }

    #[test]
    fn collects_commits_from_a_local_repo() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let config = GitSourceConfig {
            repo_path: dir.path().to_path_buf(),
            repo_url: None,
            branch: "main".to_string(),
            max_commits: 10,
            api_url: None,
            repo: None,
            token: None,
            max_reviews: 10,
        };

        let records = collect_commits(&config).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["kind"], json!("commit"));
        assert_eq!(records[0]["message"], json!("second commit"));
        assert_eq!(records[0]["author_name"], json!("Test"));
        assert!(records[0]["hexsha"].as_str().unwrap().len() >= 40);
    }

    #[test]
    fn max_commits_caps_the_history() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let config = GitSourceConfig {
            repo_path: dir.path().to_path_buf(),
            repo_url: None,
            branch: "main".to_string(),
            max_commits: 1,
            api_url: None,
            repo: None,
            token: None,
            max_reviews: 10,
        };

        assert_eq!(collect_commits(&config).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_source_collects_nothing() {
        let connector = GitConnector::new(None);
        assert!(connector.collect().await.unwrap().is_empty());
    }

    #[test]
    fn configured_reflects_the_config_section() {
        assert!(!GitConnector::new(None).configured());

        let config = GitSourceConfig {
            repo_path: "/tmp/repo".into(),
            repo_url: None,
            branch: "main".to_string(),
            max_commits: 10,
            api_url: None,
            repo: None,
            token: None,
            max_reviews: 10,
        };
        assert!(GitConnector::new(Some(config)).configured());
    }
}
