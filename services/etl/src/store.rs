//! SQLite store handle.
//!
//! The handle is created once by the caller and passed into every loader.
//! Each loader takes one transaction from it, which commits on success and
//! rolls back when dropped.

use crate::error::Result;
use crate::model::{Material, Movement, Phase, Project, WorklogEntry};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;

/// Schema-definition script, applied before any load.
pub const SCHEMA: &str = include_str!("../../../db/schema.sql");

pub const DEFAULT_DB_PATH: &str = "data/app.db";

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 1,
        }
    }

    /// Flag value, then `ETL_DB_PATH`, then `data/app.db`.
    pub fn resolve(flag: Option<PathBuf>) -> Self {
        let path = flag
            .or_else(|| std::env::var_os("ETL_DB_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        Self::new(path)
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file named by `config`.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        tracing::debug!(path = %config.path.display(), "store opened");
        Ok(Self { pool })
    }

    pub async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    // -------------------------------------------------------------------------
    // Read-back. Key text stored as '' comes back as absent.
    // -------------------------------------------------------------------------

    pub async fn fetch_materials(&self) -> Result<Vec<Material>> {
        Ok(sqlx::query_as(
            "SELECT material_code, description FROM materials ORDER BY material_code",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn fetch_movements(&self) -> Result<Vec<Movement>> {
        Ok(sqlx::query_as(
            r#"
            SELECT material_code, qty, received_date,
                   NULLIF(material_request_no, '') AS material_request_no,
                   NULLIF(project_no, '') AS project_no,
                   current_location
            FROM material_movements
            ORDER BY material_code, received_date, project_no, material_request_no
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn fetch_projects(&self) -> Result<Vec<Project>> {
        Ok(sqlx::query_as(
            "SELECT project_no, project_start, project_end FROM projects ORDER BY project_no",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn fetch_phases(&self) -> Result<Vec<Phase>> {
        Ok(sqlx::query_as(
            r#"
            SELECT NULLIF(project_no, '') AS project_no, phase_name, phase_type,
                   phase_start, phase_end, status
            FROM phases
            ORDER BY project_no, phase_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn fetch_worklog(&self) -> Result<Vec<WorklogEntry>> {
        Ok(sqlx::query_as(
            r#"
            SELECT NULLIF(project_no, '') AS project_no,
                   NULLIF(phase_name, '') AS phase_name,
                   employee_id, employee_name, start_time, end_time, hours_worked
            FROM worklog
            ORDER BY project_no, phase_name, employee_id, start_time
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    /// A schema-initialized store in a fresh temp directory. Keep the
    /// `TempDir` alive for as long as the store is used.
    pub async fn scratch_store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&StoreConfig::new(dir.path().join("app.db")))
            .await
            .unwrap();
        store.apply_schema().await.unwrap();
        (dir, store)
    }
}
