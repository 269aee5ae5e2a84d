//! CI server connector: recent builds of one job, including each
//! build's changeset commit ids in the order the server reports them.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::CiSourceConfig;
use crate::models::RawRecord;
use crate::traits::Connector;

pub struct CiConnector {
    config: Option<CiSourceConfig>,
}

impl CiConnector {
    pub fn new(config: Option<CiSourceConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for CiConnector {
    fn name(&self) -> &str {
        "ci"
    }

    fn description(&self) -> &str {
        "Builds and changesets from the CI server's job API"
    }

    fn configured(&self) -> bool {
        self.config.is_some()
    }

    async fn collect(&self) -> Result<Vec<RawRecord>> {
        let Some(config) = &self.config else {
            warn!("ci source not configured, collecting nothing");
            return Ok(vec![]);
        };

        match fetch_builds(config).await {
            Ok(records) => Ok(records),
            Err(error) => {
                warn!(job = %config.job, %error, "build collection failed");
                Ok(vec![])
            }
        }
    }
}

async fn fetch_builds(config: &CiSourceConfig) -> Result<Vec<RawRecord>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let url = format!(
        "{}/job/{}/api/json",
        config.base_url.trim_end_matches('/'),
        config.job
    );
    let tree = "builds[number,url,result,timestamp,duration,changeSet[items[commitId]]]";

    let mut request = client.get(&url).query(&[("tree", tree)]);
    if let Some(user) = &config.user {
        request = request.basic_auth(user, config.token.as_deref());
    }

    let body: Value = request.send().await?.error_for_status()?.json().await?;

    let builds = body
        .get("builds")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let records = builds
        .iter()
        .take(config.max_builds)
        .map(|build| {
            let commit_ids: Vec<Value> = build
                .pointer("/changeSet/items")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.get("commitId").cloned())
                        .collect()
                })
                .unwrap_or_default();

            json!({
                "url": build.get("url").cloned().unwrap_or(Value::Null),
                "job_name": config.job,
                "number": build.get("number").cloned().unwrap_or(Value::Null),
                "result": build.get("result").cloned().unwrap_or(Value::Null),
                "timestamp_ms": build.get("timestamp").cloned().unwrap_or(Value::Null),
                "duration_ms": build.get("duration").cloned().unwrap_or(Value::Null),
                "commit_ids": commit_ids,
            })
            .as_object()
            .expect("object literal")
            .clone()
        })
        .collect();
    Ok(records)
}
