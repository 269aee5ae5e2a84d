//! # DevStats Collector
//!
//! An ETL service for engineering metrics: pluggable source connectors,
//! per-source normalization into a canonical relational schema,
//! idempotent key-based storage, and a correlator that derives
//! deployment and incident records from the collected base data.
//!
//! ## Architecture
//!
//! ```text
//!   git / tracker / ci / quality / tests
//!        │ (connector per source)
//!        ▼
//!   ┌──────────────┐   raw records   ┌──────────────┐
//!   │  Connector   │ ───────────────▶│  Processor   │
//!   └──────────────┘                 └──────┬───────┘
//!                                           │ entity batches
//!                                           ▼
//!                                    ┌──────────────┐
//!                                    │    Upsert    │──▶ SQLite
//!                                    └──────┬───────┘
//!                                           │ base tables
//!                                           ▼
//!                                    ┌──────────────┐
//!                                    │  Correlator  │──▶ deployments,
//!                                    └──────────────┘    incidents
//! ```
//!
//! Collection is a full re-read of each source's configured scope;
//! convergence comes from the idempotent upsert, not from delta
//! tracking. The correlator is pure over the persisted tables, so
//! `correlate` can be re-run at any time.
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | TOML configuration with per-source sections |
//! | [`models`] | Canonical entities, their schema, and enum vocabularies |
//! | [`db`] / [`migrate`] | SQLite pool and schema creation |
//! | [`traits`] | Connector contract and the source registry |
//! | [`connector_git`] … [`connector_tests`] | One connector per source |
//! | [`normalize`] | Field maps, enum normalization, per-source processors |
//! | [`upsert`] | Generic key-based batch upsert |
//! | [`correlate`] | Deployment detection and incident linking |
//! | [`pipeline`] | Collection and full-pipeline orchestration |
//! | [`worker`] / [`server`] | Job queue consumer and HTTP dispatch |
//! | [`query`] | Paginated reads backing `devstats show` |

pub mod config;
pub mod connector_ci;
pub mod connector_git;
pub mod connector_quality;
pub mod connector_tests;
pub mod connector_tracker;
pub mod correlate;
pub mod db;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod server;
pub mod traits;
pub mod upsert;
pub mod worker;
