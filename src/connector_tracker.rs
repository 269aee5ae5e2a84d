//! Issue-tracker connector: issues for one project via the tracker's
//! REST search API, newest first.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::TrackerSourceConfig;
use crate::models::RawRecord;
use crate::traits::Connector;

pub struct TrackerConnector {
    config: Option<TrackerSourceConfig>,
}

impl TrackerConnector {
    pub fn new(config: Option<TrackerSourceConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for TrackerConnector {
    fn name(&self) -> &str {
        "tracker"
    }

    fn description(&self) -> &str {
        "Issues from the tracker's project search API"
    }

    fn configured(&self) -> bool {
        self.config.is_some()
    }

    async fn collect(&self) -> Result<Vec<RawRecord>> {
        let Some(config) = &self.config else {
            warn!("tracker source not configured, collecting nothing");
            return Ok(vec![]);
        };

        match search_issues(config).await {
            Ok(records) => Ok(records),
            Err(error) => {
                warn!(%error, "issue collection failed");
                Ok(vec![])
            }
        }
    }
}

async fn search_issues(config: &TrackerSourceConfig) -> Result<Vec<RawRecord>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let url = format!(
        "{}/rest/api/2/search",
        config.base_url.trim_end_matches('/')
    );
    let jql = format!("project = {} ORDER BY created DESC", config.project);

    let mut request = client.get(&url).query(&[
        ("jql", jql.as_str()),
        ("maxResults", &config.max_results.to_string()),
    ]);
    if let Some(user) = &config.user {
        request = request.basic_auth(user, config.token.as_deref());
    }

    let body: Value = request.send().await?.error_for_status()?.json().await?;

    let issues = body
        .get("issues")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let records = issues
        .iter()
        .map(|issue| {
            json!({
                "key": issue.get("key").cloned().unwrap_or(Value::Null),
                "issue_type": issue
                    .pointer("/fields/issuetype/name")
                    .cloned()
                    .unwrap_or(Value::Null),
                "status": issue
                    .pointer("/fields/status/name")
                    .cloned()
                    .unwrap_or(Value::Null),
                "summary": issue.pointer("/fields/summary").cloned().unwrap_or(Value::Null),
                "created": issue.pointer("/fields/created").cloned().unwrap_or(Value::Null),
                "resolved": issue
                    .pointer("/fields/resolutiondate")
                    .cloned()
                    .unwrap_or(Value::Null),
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

    #[tokio::test]
    async fn unconfigured_source_collects_nothing() {
        let connector = TrackerConnector::new(None);
        assert!(connector.collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_tracker_degrades_to_empty() {
        let connector = TrackerConnector::new(Some(TrackerSourceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            project: "PROJ".to_string(),
            user: None,
            token: None,
            max_results: 10,
        }));
        assert!(connector.collect().await.unwrap().is_empty());
    }
}
