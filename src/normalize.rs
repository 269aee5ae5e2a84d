//! Per-source normalization: raw connector records → canonical rows.
//!
//! Every source-specific field name and enum spelling is dealt with
//! here, declaratively where possible. Processors are pure functions —
//! no I/O, no visibility into other sources. Anything that needs data
//! from more than one source belongs in [`crate::correlate`].
//!
//! A malformed record degrades instead of aborting its batch: missing
//! fields become NULL, unmapped enum values fall back to the most
//! conservative canonical value (`TODO` / `REQUIREMENT`).

use anyhow::{bail, Result};
use chrono::DateTime;
use serde_json::{json, Value};

use crate::models::{BuildStatus, Entity, EntityBatch, IssueStatus, IssueType, RawRecord, Record};

// ───────────────────────────────────────────────────────────────────────
// Enum rule tables
// ───────────────────────────────────────────────────────────────────────

/// Tracker status → canonical status, first matching substring wins.
const STATUS_RULES: &[(&str, IssueStatus)] = &[
    ("done", IssueStatus::Done),
    ("closed", IssueStatus::Done),
    ("resolved", IssueStatus::Done),
    ("complete", IssueStatus::Done),
    ("in progress", IssueStatus::InProgress),
    ("in review", IssueStatus::InProgress),
    ("in qa", IssueStatus::InProgress),
];

const TYPE_RULES: &[(&str, IssueType)] = &[
    ("bug", IssueType::Bug),
    ("incident", IssueType::Incident),
];

/// Case-insensitive substring match against [`STATUS_RULES`], defaulting
/// to `TODO` when nothing matches.
pub fn normalize_issue_status(raw: &str) -> IssueStatus {
    let lower = raw.to_lowercase();
    STATUS_RULES
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, status)| *status)
        .unwrap_or(IssueStatus::Todo)
}

/// Case-insensitive substring match against [`TYPE_RULES`], defaulting
/// to `REQUIREMENT`.
pub fn normalize_issue_type(raw: &str) -> IssueType {
    let lower = raw.to_lowercase();
    TYPE_RULES
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, kind)| *kind)
        .unwrap_or(IssueType::Requirement)
}

/// CI result string → canonical build status. Anything that is neither
/// a success nor a failure (cancelled, unstable, null) counts as
/// aborted.
pub fn normalize_build_status(raw: Option<&str>) -> BuildStatus {
    match raw {
        Some("SUCCESS") => BuildStatus::Success,
        Some("FAILURE") => BuildStatus::Failure,
        _ => BuildStatus::Aborted,
    }
}

// ───────────────────────────────────────────────────────────────────────
// Declarative field maps
// ───────────────────────────────────────────────────────────────────────

/// Source field → canonical column mapping for one `(source, entity)`
/// pair. Checked at startup against the entity's declared columns.
pub struct FieldMap {
    pub source: &'static str,
    pub entity: Entity,
    pub fields: &'static [(&'static str, &'static str)],
}

pub const FIELD_MAPS: &[FieldMap] = &[
    FieldMap {
        source: "git",
        entity: Entity::Commit,
        fields: &[
            ("hexsha", "sha"),
            ("author_name", "author_name"),
            ("author_email", "author_email"),
            ("authored_at", "authored_date"),
            ("message", "message"),
        ],
    },
    FieldMap {
        source: "git",
        entity: Entity::CodeReview,
        fields: &[
            ("repo", "repo_name"),
            ("number", "review_number"),
            ("title", "title"),
            ("author", "author"),
            ("created_at", "created_date"),
            ("merged_at", "merged_date"),
            ("comments", "comment_count"),
        ],
    },
    FieldMap {
        source: "tracker",
        entity: Entity::Issue,
        fields: &[
            ("key", "id"),
            ("key", "issue_key"),
            ("issue_type", "type"),
            ("status", "status"),
            ("summary", "title"),
            ("created", "created_date"),
            ("resolved", "resolved_date"),
        ],
    },
    FieldMap {
        source: "ci",
        entity: Entity::Build,
        fields: &[
            ("url", "id"),
            ("job_name", "job_name"),
            ("number", "number"),
            ("result", "status"),
            ("duration_ms", "duration_millis"),
        ],
    },
    FieldMap {
        source: "quality",
        entity: Entity::QualityMetric,
        fields: &[
            ("analysis_date", "analysis_date"),
            ("project_key", "project_key"),
            ("value", "metric_value"),
        ],
    },
    FieldMap {
        source: "tests",
        entity: Entity::TestRun,
        fields: &[
            ("id", "id"),
            ("run_name", "run_name"),
            ("test_plan", "test_plan"),
            ("started_at", "start_time"),
            ("finished_at", "end_time"),
            ("total", "total_tests"),
            ("passed", "passed_tests"),
            ("failed", "failed_tests"),
        ],
    },
];

/// Check every field map target against the canonical schema. Run once
/// at registry construction; a typo in a map is a startup error, not a
/// silent NULL column at job time.
pub fn verify_field_maps() -> Result<()> {
    for map in FIELD_MAPS {
        let columns = map.entity.columns();
        for (source_field, column) in map.fields {
            if !columns.contains(column) {
                bail!(
                    "field map '{}' → {}: '{}' maps to unknown column '{}'",
                    map.source,
                    map.entity.table(),
                    source_field,
                    column
                );
            }
        }
    }
    Ok(())
}

fn field_map(source: &str, entity: Entity) -> &'static FieldMap {
    // Maps are static and verified at startup; a miss here is a
    // programming error.
    FIELD_MAPS
        .iter()
        .find(|m| m.source == source && m.entity == entity)
        .expect("field map missing for registered source")
}

/// Copy raw fields into a canonical record per the map. Fields absent
/// from the raw record are simply not set (NULL at upsert time).
fn apply_field_map(map: &FieldMap, raw: &RawRecord) -> Record {
    let mut record = Record::new();
    for (source_field, column) in map.fields {
        if let Some(value) = raw.get(*source_field) {
            if !value.is_null() {
                record.insert((*column).to_string(), value.clone());
            }
        }
    }
    record
}

// ───────────────────────────────────────────────────────────────────────
// Scalar helpers
// ───────────────────────────────────────────────────────────────────────

/// Parse a raw timestamp value into epoch seconds. Accepts epoch
/// numbers, RFC 3339 strings, and the `+0000`-style offset trackers
/// emit.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.3f%z"))
            .map(|dt| dt.timestamp())
            .ok(),
        _ => None,
    }
}

/// Whole elapsed minutes between two epoch timestamps, or `None` when
/// either endpoint is missing.
pub fn elapsed_minutes(start: Option<i64>, end: Option<i64>) -> Option<i64> {
    match (start, end) {
        (Some(start), Some(end)) => Some((end - start).div_euclid(60)),
        _ => None,
    }
}

/// Re-parse a column that was copied verbatim from the raw record into
/// epoch seconds (or remove it if unparseable).
fn canonicalize_timestamp(record: &mut Record, column: &str) -> Option<i64> {
    let parsed = record.get(column).and_then(parse_timestamp);
    match parsed {
        Some(ts) => {
            record.insert(column.to_string(), json!(ts));
        }
        None => {
            record.remove(column);
        }
    }
    parsed
}

fn raw_str<'a>(raw: &'a RawRecord, field: &str) -> Option<&'a str> {
    raw.get(field).and_then(Value::as_str)
}

// ───────────────────────────────────────────────────────────────────────
// Processors
// ───────────────────────────────────────────────────────────────────────

/// Git source fan-out: one collection payload carries both commits and
/// pull requests, distinguished by the `kind` field.
pub fn process_git(raw: &[RawRecord]) -> Vec<EntityBatch> {
    let commit_map = field_map("git", Entity::Commit);
    let review_map = field_map("git", Entity::CodeReview);

    let mut commits = Vec::new();
    let mut reviews = Vec::new();

    for item in raw {
        match raw_str(item, "kind") {
            Some("commit") => {
                let mut record = apply_field_map(commit_map, item);
                canonicalize_timestamp(&mut record, "authored_date");
                // A commit without a sha cannot be keyed; dropping it
                // keeps the rest of the batch persistable.
                if record.contains_key("sha") {
                    commits.push(record);
                }
            }
            Some("pull_request") => {
                let mut record = apply_field_map(review_map, item);
                let created = canonicalize_timestamp(&mut record, "created_date");
                let merged = canonicalize_timestamp(&mut record, "merged_date");
                if let Some(minutes) = elapsed_minutes(created, merged) {
                    record.insert("time_to_merge_minutes".to_string(), json!(minutes));
                }
                // Composite natural key: review number scoped by repo.
                if let (Some(repo), Some(number)) =
                    (raw_str(item, "repo"), item.get("number").and_then(Value::as_i64))
                {
                    record.insert("id".to_string(), json!(format!("{repo}#{number}")));
                    reviews.push(record);
                }
            }
            _ => {}
        }
    }

    vec![
        EntityBatch::new(Entity::Commit, commits),
        EntityBatch::new(Entity::CodeReview, reviews),
    ]
}

pub fn process_tracker(raw: &[RawRecord]) -> Vec<EntityBatch> {
    let map = field_map("tracker", Entity::Issue);

    let mut issues = Vec::new();
    for item in raw {
        let mut record = apply_field_map(map, item);

        let issue_type = normalize_issue_type(raw_str(item, "issue_type").unwrap_or_default());
        record.insert("type".to_string(), json!(issue_type.as_str()));

        let status = normalize_issue_status(raw_str(item, "status").unwrap_or_default());
        record.insert("status".to_string(), json!(status.as_str()));

        let created = canonicalize_timestamp(&mut record, "created_date");
        let resolved = canonicalize_timestamp(&mut record, "resolved_date");
        if let Some(minutes) = elapsed_minutes(created, resolved) {
            record.insert("lead_time_minutes".to_string(), json!(minutes));
        }

        if record.contains_key("id") {
            issues.push(record);
        }
    }

    vec![EntityBatch::new(Entity::Issue, issues)]
}

/// CI source fan-out: each build record also carries the changeset
/// commit ids, which become `build_commits` join rows. The `ordinal`
/// column preserves the order the CI system reported them.
pub fn process_ci(raw: &[RawRecord]) -> Vec<EntityBatch> {
    let map = field_map("ci", Entity::Build);

    let mut builds = Vec::new();
    let mut links = Vec::new();

    for item in raw {
        let mut record = apply_field_map(map, item);

        let status = normalize_build_status(raw_str(item, "result"));
        record.insert("status".to_string(), json!(status.as_str()));

        let start_ms = item.get("timestamp_ms").and_then(Value::as_i64);
        let duration_ms = item.get("duration_ms").and_then(Value::as_i64);
        if let Some(start_ms) = start_ms {
            record.insert("start_time".to_string(), json!(start_ms / 1000));
            if let Some(duration_ms) = duration_ms {
                record.insert(
                    "finish_time".to_string(),
                    json!((start_ms + duration_ms) / 1000),
                );
            }
        }

        let build_id = match raw_str(item, "url") {
            Some(url) => url.to_string(),
            None => continue,
        };

        if let Some(shas) = item.get("commit_ids").and_then(Value::as_array) {
            for (ordinal, sha) in shas.iter().filter_map(Value::as_str).enumerate() {
                links.push(
                    json!({
                        "build_id": build_id,
                        "commit_sha": sha,
                        "ordinal": ordinal as i64,
                    })
                    .as_object()
                    .expect("object literal")
                    .clone(),
                );
            }
        }

        builds.push(record);
    }

    vec![
        EntityBatch::new(Entity::Build, builds),
        EntityBatch::new(Entity::BuildCommit, links),
    ]
}

/// Quality-server metric key → canonical metric name. Unmapped metrics
/// are dropped; there is no conservative default name to give them.
const METRIC_NAMES: &[(&str, &str)] = &[
    ("sqale_debt_ratio", "TECHNICAL_DEBT_RATIO"),
    ("complexity", "CYCLOMATIC_COMPLEXITY"),
    ("violations", "RULE_VIOLATIONS"),
];

pub fn process_quality(raw: &[RawRecord]) -> Vec<EntityBatch> {
    let map = field_map("quality", Entity::QualityMetric);

    let mut metrics = Vec::new();
    for item in raw {
        let canonical = raw_str(item, "metric")
            .and_then(|key| METRIC_NAMES.iter().find(|(m, _)| *m == key))
            .map(|(_, name)| *name);
        let Some(metric_name) = canonical else {
            continue;
        };

        let mut record = apply_field_map(map, item);
        if !record.contains_key("analysis_date") || !record.contains_key("project_key") {
            continue;
        }
        record.insert("metric_name".to_string(), json!(metric_name));
        if let Some(value) = record.get("metric_value").cloned() {
            // Quality servers report measures as strings.
            if let Some(text) = value.as_str() {
                match text.parse::<f64>() {
                    Ok(number) => {
                        record.insert("metric_value".to_string(), json!(number));
                    }
                    Err(_) => {
                        record.remove("metric_value");
                    }
                }
            }
        }
        metrics.push(record);
    }

    vec![EntityBatch::new(Entity::QualityMetric, metrics)]
}

pub fn process_test_runs(raw: &[RawRecord]) -> Vec<EntityBatch> {
    let map = field_map("tests", Entity::TestRun);

    let mut runs = Vec::new();
    for item in raw {
        let mut record = apply_field_map(map, item);
        canonicalize_timestamp(&mut record, "start_time");
        canonicalize_timestamp(&mut record, "end_time");

        let total = record.get("total_tests").and_then(Value::as_i64);
        let passed = record.get("passed_tests").and_then(Value::as_i64);
        if let (Some(total), Some(passed)) = (total, passed) {
            if total > 0 {
                record.insert(
                    "pass_rate".to_string(),
                    json!(passed as f64 / total as f64),
                );
            }
        }

        if record.contains_key("id") {
            runs.push(record);
        }
    }

    vec![EntityBatch::new(Entity::TestRun, runs)]
}
