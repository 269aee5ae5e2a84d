//! Collection and pipeline orchestration.
//!
//! One collection run is `connector.collect()` → processor → one upsert
//! per entity batch. A full pipeline run collects every registered
//! source and then recomputes the derived tables.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::correlate;
use crate::models::Entity;
use crate::traits::CollectorRegistry;
use crate::upsert;

/// Outcome of one source's collection run.
#[derive(Debug)]
pub struct CollectionStats {
    pub source: String,
    pub fetched: usize,
    /// Records upserted per entity table, in processor output order.
    pub upserted: Vec<(Entity, usize)>,
}

/// Collect one source end to end. Returns `Ok(None)` for a source the
/// registry does not know — deliberately not an error, so an unknown
/// source in a job payload degrades to a logged no-op.
pub async fn run_collection(
    config: &Config,
    registry: &CollectorRegistry,
    pool: &SqlitePool,
    source: &str,
) -> Result<Option<CollectionStats>> {
    let Some((factory, processor)) = registry.resolve(source) else {
        warn!(source, "unknown source, nothing collected");
        return Ok(None);
    };

    let connector = factory(config)?;
    let raw = connector.collect().await?;
    info!(source, fetched = raw.len(), "collected raw records");

    let mut upserted = Vec::new();
    for batch in processor(&raw) {
        upsert::upsert(pool, batch.entity, &batch.records).await?;
        info!(
            source,
            table = batch.entity.table(),
            count = batch.records.len(),
            "upserted batch"
        );
        upserted.push((batch.entity, batch.records.len()));
    }

    Ok(Some(CollectionStats {
        source: source.to_string(),
        fetched: raw.len(),
        upserted,
    }))
}

/// Outcome of a full pipeline run.
#[derive(Debug)]
pub struct PipelineStats {
    pub collections: Vec<CollectionStats>,
    pub deployments: usize,
    pub incidents: usize,
}

/// Collect every registered source, then derive deployments and
/// incidents from the freshly persisted base tables.
pub async fn run_pipeline(
    config: &Config,
    registry: &CollectorRegistry,
    pool: &SqlitePool,
) -> Result<PipelineStats> {
    let mut collections = Vec::new();
    for source in registry.sources() {
        if let Some(stats) = run_collection(config, registry, pool, source).await? {
            collections.push(stats);
        }
    }

    let (deployments, incidents) =
        correlate::run_correlation(pool, &config.pipeline.deployment_job_pattern).await?;

    Ok(PipelineStats {
        collections,
        deployments,
        incidents,
    })
}
