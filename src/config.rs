use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7410".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Builds whose job name contains this pattern (and succeeded) are
    /// treated as deployments.
    #[serde(default = "default_deployment_pattern")]
    pub deployment_job_pattern: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deployment_job_pattern: default_deployment_pattern(),
        }
    }
}

fn default_deployment_pattern() -> String {
    "deploy".to_string()
}

/// Per-source connector configuration. Every section is optional; a
/// connector whose section is missing collects nothing and logs why.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub git: Option<GitSourceConfig>,
    pub tracker: Option<TrackerSourceConfig>,
    pub ci: Option<CiSourceConfig>,
    pub quality: Option<QualitySourceConfig>,
    pub tests: Option<TestResultsSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitSourceConfig {
    /// Local working copy. Cloned from `repo_url` if absent.
    pub repo_path: PathBuf,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
    /// Hosting API settings for pull-request collection. All three must
    /// be present for reviews to be collected.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_max_reviews")]
    pub max_reviews: usize,
}

fn default_branch() -> String {
    "main".to_string()
}
fn default_max_commits() -> usize {
    1000
}
fn default_max_reviews() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerSourceConfig {
    pub base_url: String,
    pub project: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct CiSourceConfig {
    pub base_url: String,
    pub job: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_max_builds")]
    pub max_builds: usize,
}

fn default_max_builds() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct QualitySourceConfig {
    pub base_url: String,
    pub project_key: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TestResultsSourceConfig {
    /// JSON file of test-run summaries exported by the test harness.
    pub results_path: PathBuf,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.pipeline.deployment_job_pattern.is_empty() {
        anyhow::bail!("pipeline.deployment_job_pattern must not be empty");
    }

    if let Some(git) = &config.sources.git {
        if git.max_commits == 0 {
            anyhow::bail!("sources.git.max_commits must be > 0");
        }
    }
    if let Some(tracker) = &config.sources.tracker {
        if tracker.max_results == 0 {
            anyhow::bail!("sources.tracker.max_results must be > 0");
        }
        if tracker.project.is_empty() {
            anyhow::bail!("sources.tracker.project must not be empty");
        }
    }
    if let Some(ci) = &config.sources.ci {
        if ci.max_builds == 0 {
            anyhow::bail!("sources.ci.max_builds must be > 0");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devstats.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn minimal_config_loads_with_defaults() {
        let (_dir, path) = write_config("[db]\npath = \"data/devstats.sqlite\"\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7410");
        assert_eq!(config.pipeline.deployment_job_pattern, "deploy");
        assert!(config.sources.git.is_none());
    }

    #[test]
    fn rejects_empty_deployment_pattern() {
        let (_dir, path) = write_config(
            "[db]\npath = \"x.sqlite\"\n[pipeline]\ndeployment_job_pattern = \"\"\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_zero_max_builds() {
        let (_dir, path) = write_config(
            "[db]\npath = \"x.sqlite\"\n[sources.ci]\nbase_url = \"http://ci\"\njob = \"deploy\"\nmax_builds = 0\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn full_sources_section_parses() {
        let (_dir, path) = write_config(
            r#"[db]
path = "data/devstats.sqlite"

[sources.git]
repo_path = "/tmp/repo"
repo_url = "https://example.com/repo.git"
branch = "develop"

[sources.tracker]
base_url = "https://tracker.example.com"
project = "PROJ"
user = "bot"
token = "secret"

[sources.ci]
base_url = "https://ci.example.com"
job = "deploy-prod"

[sources.quality]
base_url = "https://quality.example.com"
project_key = "proj"

[sources.tests]
results_path = "/tmp/results.json"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.sources.git.unwrap().branch, "develop");
        assert_eq!(config.sources.tracker.unwrap().max_results, 100);
        assert_eq!(config.sources.ci.unwrap().job, "deploy-prod");
        assert!(config.sources.quality.is_some());
        assert!(config.sources.tests.is_some());
    }
}
