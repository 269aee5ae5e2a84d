//! Generic idempotent batch upsert over the canonical tables.
//!
//! One call persists one batch for one entity type, atomically: the
//! whole batch commits or none of it does. Conflict resolution is
//! insert-or-overwrite keyed on the entity's declared primary-key
//! columns; applying the same batch twice leaves storage unchanged.

use anyhow::{bail, Result};
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::SqlitePool;

use crate::models::{Entity, Record};

/// Merge `records` into the entity's table.
///
/// - Empty batch: immediate no-op, no transaction is opened.
/// - An entity declaring no primary key is refused — that is a schema
///   configuration error, not bad input data.
/// - Every record must supply a non-null value for each key column;
///   a violation fails the whole batch before anything is written.
/// - On key collision all non-key columns are overwritten with the new
///   values (absent fields become NULL). No field-level merging.
pub async fn upsert(pool: &SqlitePool, entity: Entity, records: &[Record]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    check_keys(entity, records)?;

    let key_columns = entity.key_columns();
    let value_columns = entity.value_columns();
    let statement = build_statement(entity.table(), key_columns, value_columns);

    let mut tx = pool.begin().await?;
    for record in records {
        let mut query = sqlx::query(&statement);
        for column in key_columns.iter().chain(value_columns.iter()) {
            query = bind_value(query, record.get(*column));
        }
        query.execute(&mut *tx).await?;
    }
    tx.commit().await?;

    Ok(())
}

/// Replace the table's entire contents with `records`, atomically.
///
/// For fully derived tables that are recomputed from scratch: rows
/// absent from the new set are pruned in the same transaction that
/// writes it, so the table never mixes fresh and stale rows. An empty
/// set empties the table.
pub async fn replace(pool: &SqlitePool, entity: Entity, records: &[Record]) -> Result<()> {
    check_keys(entity, records)?;

    let key_columns = entity.key_columns();
    let value_columns = entity.value_columns();
    let statement = build_statement(entity.table(), key_columns, value_columns);

    let mut tx = pool.begin().await?;
    sqlx::query(&format!("DELETE FROM {}", entity.table()))
        .execute(&mut *tx)
        .await?;
    for record in records {
        let mut query = sqlx::query(&statement);
        for column in key_columns.iter().chain(value_columns.iter()) {
            query = bind_value(query, record.get(*column));
        }
        query.execute(&mut *tx).await?;
    }
    tx.commit().await?;

    Ok(())
}

fn check_keys(entity: Entity, records: &[Record]) -> Result<()> {
    let key_columns = entity.key_columns();
    if key_columns.is_empty() {
        bail!(
            "entity '{}' declares no primary key; refusing to upsert",
            entity.table()
        );
    }

    for (index, record) in records.iter().enumerate() {
        for key in key_columns {
            match record.get(*key) {
                Some(value) if !value.is_null() => {}
                _ => bail!(
                    "record {} for '{}' is missing key column '{}'",
                    index,
                    entity.table(),
                    key
                ),
            }
        }
    }
    Ok(())
}

/// Render the `INSERT … ON CONFLICT` statement for one entity shape.
///
/// Entities without mutable columns get `DO NOTHING`: with nothing to
/// overwrite, a key collision is already the desired end state.
fn build_statement(table: &str, key_columns: &[&str], value_columns: &[&str]) -> String {
    let all_columns: Vec<&str> = key_columns
        .iter()
        .chain(value_columns.iter())
        .copied()
        .collect();
    let placeholders = vec!["?"; all_columns.len()].join(", ");

    let conflict_action = if value_columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let assignments: Vec<String> = value_columns
            .iter()
            .map(|col| format!("{col} = excluded.{col}"))
            .collect();
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        table,
        all_columns.join(", "),
        placeholders,
        key_columns.join(", "),
        conflict_action
    )
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Option<&'q Value>,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        None | Some(Value::Null) => query.bind(None::<String>),
        Some(Value::Bool(b)) => query.bind(*b),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Some(Value::String(s)) => query.bind(s.as_str()),
        // Processors only emit scalars; anything structured is stored
        // as its JSON text.
        Some(other) => query.bind(other.to_string()),
    }
}
