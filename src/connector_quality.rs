//! Code-quality server connector: current component measures for one
//! project, stamped with today's date.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::QualitySourceConfig;
use crate::models::RawRecord;
use crate::traits::Connector;

/// Measure keys requested from the server. The processor maps them to
/// canonical metric names.
const METRIC_KEYS: &str = "sqale_debt_ratio,complexity,violations";

pub struct QualityConnector {
    config: Option<QualitySourceConfig>,
}

impl QualityConnector {
    pub fn new(config: Option<QualitySourceConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for QualityConnector {
    fn name(&self) -> &str {
        "quality"
    }

    fn description(&self) -> &str {
        "Component measures from the code-quality server"
    }

    fn configured(&self) -> bool {
        self.config.is_some()
    }

    async fn collect(&self) -> Result<Vec<RawRecord>> {
        let Some(config) = &self.config else {
            warn!("quality source not configured, collecting nothing");
            return Ok(vec![]);
        };

        match fetch_measures(config).await {
            Ok(records) => Ok(records),
            Err(error) => {
                warn!(project = %config.project_key, %error, "quality collection failed");
                Ok(vec![])
            }
        }
    }
}

async fn fetch_measures(config: &QualitySourceConfig) -> Result<Vec<RawRecord>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let url = format!(
        "{}/api/measures/component",
        config.base_url.trim_end_matches('/')
    );

    let mut request = client.get(&url).query(&[
        ("component", config.project_key.as_str()),
        ("metricKeys", METRIC_KEYS),
    ]);
    if let Some(token) = &config.token {
        request = request.bearer_auth(token);
    }

    let body: Value = request.send().await?.error_for_status()?.json().await?;

    let measures = body
        .pointer("/component/measures")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let analysis_date = Utc::now().date_naive().to_string();
    let records = measures
        .iter()
        .map(|measure| {
            json!({
                "analysis_date": analysis_date,
                "project_key": config.project_key,
                "metric": measure.get("metric").cloned().unwrap_or(Value::Null),
                "value": measure.get("value").cloned().unwrap_or(Value::Null),
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
        let connector = QualityConnector::new(None);
        assert!(connector.collect().await.unwrap().is_empty());
    }
}
