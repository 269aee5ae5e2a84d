//! Canonical data model shared by every stage of the ETL pipeline.
//!
//! Each entity is keyed by a natural, source-issued identifier (a commit
//! hash, a tracker key, a CI build URL), never a generated surrogate:
//! the idempotent upsert relies on the same logical record producing the
//! same key on every collection run.

use serde_json::Value;

/// Raw record as produced by a connector, keyed by source-specific
/// field names. Only the matching processor understands its shape.
pub type RawRecord = serde_json::Map<String, Value>;

/// Normalized record ready for persistence, keyed by canonical column
/// names of one [`Entity`].
pub type Record = serde_json::Map<String, Value>;

/// A batch of normalized records targeting one entity table.
#[derive(Debug, Clone)]
pub struct EntityBatch {
    pub entity: Entity,
    pub records: Vec<Record>,
}

impl EntityBatch {
    pub fn new(entity: Entity, records: Vec<Record>) -> Self {
        Self { entity, records }
    }
}

/// Canonical issue status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueStatus {
    Todo,
    InProgress,
    Done,
}

impl IssueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Todo => "TODO",
            IssueStatus::InProgress => "IN_PROGRESS",
            IssueStatus::Done => "DONE",
        }
    }
}

/// Canonical issue type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    Bug,
    Incident,
    Requirement,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::Bug => "BUG",
            IssueType::Incident => "INCIDENT",
            IssueType::Requirement => "REQUIREMENT",
        }
    }
}

/// Canonical CI build status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    Failure,
    Aborted,
}

impl BuildStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Failure => "FAILURE",
            BuildStatus::Aborted => "ABORTED",
        }
    }
}

/// The set of persisted entity tables.
///
/// `Entity` doubles as the schema descriptor the upsert engine works
/// from: each variant declares its table name, primary-key columns, and
/// mutable (non-key) columns. Timestamps are epoch seconds stored as
/// INTEGER.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Commit,
    Issue,
    CodeReview,
    Build,
    BuildCommit,
    Deployment,
    Incident,
    QualityMetric,
    TestRun,
}

impl Entity {
    pub const ALL: [Entity; 9] = [
        Entity::Commit,
        Entity::Issue,
        Entity::CodeReview,
        Entity::Build,
        Entity::BuildCommit,
        Entity::Deployment,
        Entity::Incident,
        Entity::QualityMetric,
        Entity::TestRun,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Entity::Commit => "commits",
            Entity::Issue => "issues",
            Entity::CodeReview => "code_reviews",
            Entity::Build => "builds",
            Entity::BuildCommit => "build_commits",
            Entity::Deployment => "deployments",
            Entity::Incident => "incidents",
            Entity::QualityMetric => "quality_metrics",
            Entity::TestRun => "test_runs",
        }
    }

    /// Primary-key columns. Every record in an upsert batch must supply
    /// a value for each of these.
    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            Entity::Commit => &["sha"],
            Entity::Issue => &["id"],
            Entity::CodeReview => &["id"],
            Entity::Build => &["id"],
            Entity::BuildCommit => &["build_id", "commit_sha"],
            Entity::Deployment => &["id"],
            Entity::Incident => &["id"],
            Entity::QualityMetric => &["analysis_date", "project_key", "metric_name"],
            Entity::TestRun => &["id"],
        }
    }

    /// Non-key columns, overwritten wholesale on key collision.
    pub fn value_columns(self) -> &'static [&'static str] {
        match self {
            Entity::Commit => &["author_name", "author_email", "authored_date", "message"],
            Entity::Issue => &[
                "issue_key",
                "type",
                "status",
                "title",
                "created_date",
                "resolved_date",
                "lead_time_minutes",
            ],
            Entity::CodeReview => &[
                "repo_name",
                "review_number",
                "title",
                "author",
                "created_date",
                "merged_date",
                "time_to_merge_minutes",
                "comment_count",
            ],
            Entity::Build => &[
                "job_name",
                "number",
                "status",
                "start_time",
                "finish_time",
                "duration_millis",
            ],
            Entity::BuildCommit => &["ordinal"],
            Entity::Deployment => &["commit_sha", "start_time", "finish_time"],
            Entity::Incident => &["deployment_id", "created_date", "resolved_date"],
            Entity::QualityMetric => &["metric_value"],
            Entity::TestRun => &[
                "run_name",
                "test_plan",
                "start_time",
                "end_time",
                "total_tests",
                "passed_tests",
                "failed_tests",
                "pass_rate",
            ],
        }
    }

    /// All columns, keys first, in declaration order.
    pub fn columns(self) -> Vec<&'static str> {
        let mut cols: Vec<&'static str> = self.key_columns().to_vec();
        cols.extend_from_slice(self.value_columns());
        cols
    }
}
