//! Job model and the queue-consuming worker loop.
//!
//! The worker pulls one job at a time, resolves the source against the
//! registry, runs the collection, and acknowledges. Every outcome is
//! acknowledged — including failures. This is a deliberate policy, not
//! an accident: collection is a cheap, idempotent full re-read, so a
//! dropped job is recovered by the next scheduled run, and retry
//! machinery would only add ways to hammer an already-unhappy source.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::pipeline;
use crate::traits::CollectorRegistry;

/// Queue payload: the source to collect. The consumer alone decides
/// what that name means, via the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub source: String,
}

/// How a job ended. All three outcomes are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    UnknownSource,
    Failed,
}

/// Transport seam between the dispatcher and the worker.
///
/// `receive` yields the next job or `None` when the queue is closed;
/// `ack` confirms the job so the transport can drop it.
#[async_trait]
pub trait JobQueue: Send {
    async fn receive(&mut self) -> Option<Job>;
    async fn ack(&mut self, job: &Job) -> Result<()>;
}

/// In-process queue over a bounded channel. Capacity one gives the
/// worker a prefetch of a single logical unit of work.
pub struct ChannelQueue {
    rx: mpsc::Receiver<Job>,
}

pub fn channel(capacity: usize) -> (mpsc::Sender<Job>, ChannelQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelQueue { rx })
}

#[async_trait]
impl JobQueue for ChannelQueue {
    async fn receive(&mut self) -> Option<Job> {
        self.rx.recv().await
    }

    async fn ack(&mut self, _job: &Job) -> Result<()> {
        // Receiving from the channel already removed the message.
        Ok(())
    }
}

/// Process one job to completion. Never returns an error: failures are
/// logged with their source and reported as [`JobOutcome::Failed`].
pub async fn process_job(
    config: &Config,
    registry: &CollectorRegistry,
    pool: &SqlitePool,
    job: &Job,
) -> JobOutcome {
    match pipeline::run_collection(config, registry, pool, &job.source).await {
        Ok(Some(stats)) => {
            info!(source = %job.source, fetched = stats.fetched, "job completed");
            JobOutcome::Completed
        }
        Ok(None) => {
            warn!(source = %job.source, "job named an unregistered source");
            JobOutcome::UnknownSource
        }
        Err(err) => {
            error!(source = %job.source, error = %err, "job failed, dropping");
            JobOutcome::Failed
        }
    }
}

/// Consume jobs until the queue closes.
pub async fn run_worker<Q: JobQueue>(
    config: &Config,
    registry: &CollectorRegistry,
    pool: &SqlitePool,
    mut queue: Q,
) -> Result<()> {
    while let Some(job) = queue.receive().await {
        let outcome = process_job(config, registry, pool, &job).await;
        queue.ack(&job).await?;
        info!(source = %job.source, ?outcome, "job acknowledged");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct VecQueue {
        jobs: VecDeque<Job>,
        acked: Vec<String>,
    }

    impl VecQueue {
        fn new(sources: &[&str]) -> Self {
            Self {
                jobs: sources
                    .iter()
                    .map(|s| Job {
                        source: s.to_string(),
                    })
                    .collect(),
                acked: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl JobQueue for VecQueue {
        async fn receive(&mut self) -> Option<Job> {
            self.jobs.pop_front()
        }

        async fn ack(&mut self, job: &Job) -> Result<()> {
            self.acked.push(job.source.clone());
            Ok(())
        }
    }

    async fn test_setup() -> (tempfile::TempDir, Config, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");
        let config: Config = toml::from_str(&format!(
            "[db]\npath = \"{}\"\n",
            db_path.display()
        ))
        .unwrap();
        let pool = crate::db::connect_path(&db_path).await.unwrap();
        crate::migrate::create_schema(&pool).await.unwrap();
        (dir, config, pool)
    }

    #[tokio::test]
    async fn unknown_source_is_acknowledged_and_mutates_nothing() {
        let (_dir, config, pool) = test_setup().await;
        let registry = CollectorRegistry::new();

        let job = Job {
            source: "nonexistent".to_string(),
        };
        let outcome = process_job(&config, &registry, &pool, &job).await;
        assert_eq!(outcome, JobOutcome::UnknownSource);

        for entity in crate::models::Entity::ALL {
            let count: i64 =
                sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", entity.table()))
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(count, 0, "{} not empty", entity.table());
        }
    }

    #[tokio::test]
    async fn worker_drains_the_queue_and_acks_every_job() {
        let (_dir, config, pool) = test_setup().await;
        let registry = CollectorRegistry::builtins().unwrap();

        // All sources are registered but unconfigured, so each job
        // completes with an empty collection.
        let queue = VecQueue::new(&["git", "nonexistent", "tracker"]);
        let mut queue = queue;
        while let Some(job) = queue.receive().await {
            process_job(&config, &registry, &pool, &job).await;
            queue.ack(&job).await.unwrap();
        }
        assert_eq!(queue.acked, vec!["git", "nonexistent", "tracker"]);
    }

    #[tokio::test]
    async fn channel_queue_delivers_and_closes() {
        let (tx, mut queue) = channel(1);
        tx.send(Job {
            source: "git".to_string(),
        })
        .await
        .unwrap();
        drop(tx);

        let job = queue.receive().await.unwrap();
        assert_eq!(job.source, "git");
        queue.ack(&job).await.unwrap();
        assert!(queue.receive().await.is_none());
    }
}
