//! Test-run connector: reads the summary file the test harness exports
//! after each run (a JSON array of run objects).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::config::TestResultsSourceConfig;
use crate::models::RawRecord;
use crate::traits::Connector;

pub struct TestResultsConnector {
    config: Option<TestResultsSourceConfig>,
}

impl TestResultsConnector {
    pub fn new(config: Option<TestResultsSourceConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for TestResultsConnector {
    fn name(&self) -> &str {
        "tests"
    }

    fn description(&self) -> &str {
        "Test-run summaries from a local results export"
    }

    fn configured(&self) -> bool {
        self.config.is_some()
    }

    async fn collect(&self) -> Result<Vec<RawRecord>> {
        let Some(config) = &self.config else {
            warn!("tests source not configured, collecting nothing");
            return Ok(vec![]);
        };

        match read_results(config) {
            Ok(records) => Ok(records),
            Err(error) => {
                warn!(path = %config.results_path.display(), %error, "test results unreadable");
                Ok(vec![])
            }
        }
    }
}

fn read_results(config: &TestResultsSourceConfig) -> Result<Vec<RawRecord>> {
    let content = std::fs::read_to_string(&config.results_path).with_context(|| {
        format!(
            "Failed to read results file: {}",
            config.results_path.display()
        )
    })?;

    let parsed: Value =
        serde_json::from_str(&content).context("Results file is not valid JSON")?;

    let runs = parsed
        .as_array()
        .context("Results file must contain a JSON array of runs")?;

    Ok(runs
        .iter()
        .filter_map(Value::as_object)
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reads_run_records_from_the_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(
            &path,
            json!([
                { "id": "run-1", "run_name": "nightly", "total": 10, "passed": 9, "failed": 1 }
            ])
            .to_string(),
        )
        .unwrap();

        let connector = TestResultsConnector::new(Some(TestResultsSourceConfig {
            results_path: path,
        }));
        let records = connector.collect().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], json!("run-1"));
    }

    #[tokio::test]
    async fn missing_file_degrades_to_empty() {
        let connector = TestResultsConnector::new(Some(TestResultsSourceConfig {
            results_path: "/nonexistent/results.json".into(),
        }));
        assert!(connector.collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_source_collects_nothing() {
        let connector = TestResultsConnector::new(None);
        assert!(connector.collect().await.unwrap().is_empty());
    }
}
