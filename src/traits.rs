//! Connector contract and the source registry.
//!
//! A collection job names a source; the registry maps that name to a
//! connector factory and the processor that understands the connector's
//! raw record shape:
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │              CollectorRegistry                 │
//! │  "git" ──▶ (GitConnector,     process_git)     │
//! │  "tracker" ▶ (TrackerConnector, process_tracker)│
//! │  "ci" ───▶ (CiConnector,      process_ci)      │
//! │     ...                                        │
//! └──────────────────┬─────────────────────────────┘
//!                    ▼
//!     collect() → processor → upsert per entity
//! ```
//!
//! The registry is built once at process start ([`CollectorRegistry::builtins`])
//! and shared immutably afterwards; dispatch never mutates it, so
//! concurrent workers can resolve against the same instance without
//! locking.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::Config;
use crate::models::{EntityBatch, RawRecord};

/// A data source connector that produces raw records for one source.
///
/// Implementations wrap a vendor client (git CLI, tracker REST API, CI
/// server API). The contract from the pipeline's point of view:
///
/// - [`collect`](Connector::collect) returns the connector's current
///   full view of its configured scope (e.g. the last N commits on the
///   default branch). There is no delta fetching; repeated full
///   collection plus idempotent upsert is the convergence mechanism.
/// - Expected transient conditions (missing config, HTTP errors, rate
///   limits) are caught inside the connector, logged, and yield an
///   empty or partial result. Only programming errors propagate.
/// - A connector never touches persisted state.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Source name this connector serves (e.g. `"git"`, `"tracker"`).
    fn name(&self) -> &str;

    /// One-line description for `devstats sources` output.
    fn description(&self) -> &str;

    /// Whether the shared configuration carries everything this source
    /// needs to collect. Connectors backed by an optional config
    /// section override this; the default suits sources that need no
    /// configuration of their own.
    fn configured(&self) -> bool {
        true
    }

    /// Collect the source's current view as raw, source-shaped records.
    async fn collect(&self) -> Result<Vec<RawRecord>>;
}

/// Builds a connector from the shared configuration.
pub type ConnectorFactory = Box<dyn Fn(&Config) -> Result<Box<dyn Connector>> + Send + Sync>;

/// Pure per-source normalization function: raw records in, one batch
/// per target entity out.
pub type Processor = fn(&[RawRecord]) -> Vec<EntityBatch>;

struct RegistryEntry {
    factory: ConnectorFactory,
    processor: Processor,
}

/// Maps source names to `(connector factory, processor)` pairs.
pub struct CollectorRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl CollectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry pre-loaded with the built-in sources.
    ///
    /// Verifies the processors' declarative field maps against the
    /// canonical schema before registering anything, so a malformed
    /// mapping fails at startup rather than mid-job.
    pub fn builtins() -> Result<Self> {
        use crate::connector_ci::CiConnector;
        use crate::connector_git::GitConnector;
        use crate::connector_quality::QualityConnector;
        use crate::connector_tests::TestResultsConnector;
        use crate::connector_tracker::TrackerConnector;
        use crate::normalize;

        normalize::verify_field_maps()?;

        let mut registry = Self::new();
        registry.register(
            "git",
            Box::new(|config| Ok(Box::new(GitConnector::new(config.sources.git.clone())) as _)),
            normalize::process_git,
        );
        registry.register(
            "tracker",
            Box::new(|config| {
                Ok(Box::new(TrackerConnector::new(config.sources.tracker.clone())) as _)
            }),
            normalize::process_tracker,
        );
        registry.register(
            "ci",
            Box::new(|config| Ok(Box::new(CiConnector::new(config.sources.ci.clone())) as _)),
            normalize::process_ci,
        );
        registry.register(
            "quality",
            Box::new(|config| {
                Ok(Box::new(QualityConnector::new(config.sources.quality.clone())) as _)
            }),
            normalize::process_quality,
        );
        registry.register(
            "tests",
            Box::new(|config| {
                Ok(Box::new(TestResultsConnector::new(config.sources.tests.clone())) as _)
            }),
            normalize::process_test_runs,
        );
        Ok(registry)
    }

    /// Register a source. Re-registering the same name replaces the
    /// previous entry (last registration wins).
    pub fn register(&mut self, source: &str, factory: ConnectorFactory, processor: Processor) {
        self.entries.insert(
            source.to_string(),
            RegistryEntry { factory, processor },
        );
    }

    /// Resolve a source name to its factory and processor.
    pub fn resolve(&self, source: &str) -> Option<(&ConnectorFactory, Processor)> {
        self.entries
            .get(source)
            .map(|entry| (&entry.factory, entry.processor))
    }

    /// Registered source names, sorted.
    pub fn sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
