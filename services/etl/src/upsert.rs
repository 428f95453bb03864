//! Upsert by composite key.
//!
//! Each row becomes one `INSERT ... ON CONFLICT(<key>) DO UPDATE` statement, so
//! a batch leaves exactly one row per key-tuple holding the values of the last
//! row processed for that tuple. Duplicates inside one batch resolve the same
//! way: last write wins.

use crate::error::{EtlError, Result};
use crate::store::Store;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{Sqlite, Transaction};

/// Table name, ordered column list and unique key of a persisted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub key: &'static [&'static str],
}

impl TableSpec {
    /// Check the upsert preconditions: a non-empty key drawn from the columns.
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(EtlError::InvalidBatch {
                table: self.name,
                reason: "unique key is empty".to_string(),
            });
        }
        if let Some(missing) = self.key.iter().find(|k| !self.columns.contains(*k)) {
            return Err(EtlError::InvalidBatch {
                table: self.name,
                reason: format!("key column '{}' is not a table column", missing),
            });
        }
        Ok(())
    }

    pub fn upsert_sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        let updates: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !self.key.contains(*c))
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();

        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            self.name,
            self.columns.join(", "),
            placeholders,
            self.key.join(", "),
            action
        )
    }
}

/// A bindable column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Real(f64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Null,
}

impl SqlValue {
    pub fn text_or_null(value: &Option<String>) -> Self {
        value.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null)
    }

    /// Optional text that takes part in a unique key. Absent is stored as ''
    /// so key-tuple equality holds for rows without a value.
    pub fn key_text(value: &Option<String>) -> Self {
        SqlValue::Text(value.clone().unwrap_or_default())
    }

    pub fn date_or_null(value: Option<NaiveDate>) -> Self {
        value.map(SqlValue::Date).unwrap_or(SqlValue::Null)
    }
}

/// A typed row of a persisted table. `values` follows `TABLE.columns` order.
pub trait Record {
    const TABLE: TableSpec;

    fn values(&self) -> Vec<SqlValue>;
}

/// Upsert `rows` inside the caller's transaction. Returns rows written.
pub async fn upsert<R: Record>(tx: &mut Transaction<'_, Sqlite>, rows: &[R]) -> Result<u64> {
    let table = R::TABLE;
    if rows.is_empty() {
        return Ok(0);
    }
    table.validate()?;

    let sql = table.upsert_sql();
    let mut written = 0;
    for row in rows {
        let values = row.values();
        if values.len() != table.columns.len() {
            return Err(EtlError::InvalidBatch {
                table: table.name,
                reason: format!(
                    "row has {} values for {} columns",
                    values.len(),
                    table.columns.len()
                ),
            });
        }

        let mut query = sqlx::query(&sql);
        for value in values {
            query = match value {
                SqlValue::Text(s) => query.bind(s),
                SqlValue::Real(f) => query.bind(f),
                SqlValue::Date(d) => query.bind(d),
                SqlValue::Timestamp(t) => query.bind(t),
                SqlValue::Null => query.bind(Option::<String>::None),
            };
        }
        written += query.execute(&mut **tx).await?.rows_affected();
    }

    tracing::debug!(table = table.name, rows = rows.len(), written, "upsert batch");
    Ok(written)
}

/// Upsert `rows` as a unit of its own: all rows commit or none do. An empty
/// batch never touches the store.
pub async fn upsert_atomic<R: Record>(store: &Store, rows: &[R]) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }
    let mut tx = store.begin().await?;
    let written = upsert(&mut tx, rows).await?;
    tx.commit().await?;
    Ok(written)
}
