//! Reports - exports the loaded store as a set of report sheets
//!
//! Sheets (one CSV each, inside a timestamped directory):
//! - materials_master             raw materials table
//! - material_movements           movements joined with material descriptions
//! - materials_count_per_project  movement records per project
//! - qty_sum_per_project          total quantity per project
//! - project_phases               phase listing
//! - work_hours                   hours worked per project and phase
//!
//! Usage:
//!   cargo run --bin reports -- [--db data/app.db] [--out-dir reports]

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::Parser;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reports", about = "Exports report sheets from the loaded store")]
struct Args {
    /// SQLite database path (falls back to ETL_DB_PATH, then data/app.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Output directory (falls back to REPORTS_OUT_DIR, then reports)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ============================================================================
// Sheet rows
// ============================================================================

#[derive(Debug, Serialize, sqlx::FromRow, PartialEq)]
struct MaterialRow {
    material_code: String,
    description: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow, PartialEq)]
struct MovementRow {
    material_code: String,
    qty: f64,
    received_date: NaiveDate,
    material_request_no: Option<String>,
    project_no: Option<String>,
    current_location: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow, PartialEq)]
struct CountRow {
    project_no: Option<String>,
    materials_count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow, PartialEq)]
struct QtyRow {
    project_no: Option<String>,
    total_qty: f64,
}

#[derive(Debug, Serialize, sqlx::FromRow, PartialEq)]
struct PhaseRow {
    project_no: Option<String>,
    phase_name: String,
    phase_type: Option<String>,
    phase_start: Option<NaiveDate>,
    phase_end: Option<NaiveDate>,
    status: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow, PartialEq)]
struct HoursRow {
    project_no: Option<String>,
    phase_name: Option<String>,
    hours_total: f64,
}

// ============================================================================
// Queries
// ============================================================================

async fn fetch_materials(pool: &SqlitePool) -> Result<Vec<MaterialRow>> {
    Ok(sqlx::query_as(
        "SELECT material_code, description FROM materials ORDER BY material_code",
    )
    .fetch_all(pool)
    .await?)
}

async fn fetch_movements(pool: &SqlitePool) -> Result<Vec<MovementRow>> {
    Ok(sqlx::query_as(
        r#"
        SELECT m.material_code, m.qty, m.received_date,
               NULLIF(m.material_request_no, '') AS material_request_no,
               NULLIF(m.project_no, '') AS project_no,
               m.current_location,
               mt.description
        FROM material_movements m
        LEFT JOIN materials mt ON mt.material_code = m.material_code
        ORDER BY m.received_date, m.material_code, m.project_no, m.material_request_no
        "#,
    )
    .fetch_all(pool)
    .await?)
}

async fn count_per_project(pool: &SqlitePool) -> Result<Vec<CountRow>> {
    Ok(sqlx::query_as(
        r#"
        SELECT NULLIF(project_no, '') AS project_no, COUNT(material_code) AS materials_count
        FROM material_movements
        GROUP BY project_no
        ORDER BY project_no
        "#,
    )
    .fetch_all(pool)
    .await?)
}

async fn qty_per_project(pool: &SqlitePool) -> Result<Vec<QtyRow>> {
    Ok(sqlx::query_as(
        r#"
        SELECT NULLIF(project_no, '') AS project_no, TOTAL(qty) AS total_qty
        FROM material_movements
        GROUP BY project_no
        ORDER BY project_no
        "#,
    )
    .fetch_all(pool)
    .await?)
}

async fn fetch_phases(pool: &SqlitePool) -> Result<Vec<PhaseRow>> {
    Ok(sqlx::query_as(
        r#"
        SELECT NULLIF(project_no, '') AS project_no, phase_name, phase_type,
               phase_start, phase_end, status
        FROM phases
        ORDER BY project_no, phase_start, phase_name
        "#,
    )
    .fetch_all(pool)
    .await?)
}

async fn hours_per_phase(pool: &SqlitePool) -> Result<Vec<HoursRow>> {
    Ok(sqlx::query_as(
        r#"
        SELECT NULLIF(project_no, '') AS project_no,
               NULLIF(phase_name, '') AS phase_name,
               TOTAL(hours_worked) AS hours_total
        FROM worklog
        GROUP BY project_no, phase_name
        ORDER BY project_no, phase_name
        "#,
    )
    .fetch_all(pool)
    .await?)
}

// ============================================================================
// Export
// ============================================================================

/// Write one sheet. The header row is written even when there are no rows.
fn write_sheet<T: Serialize>(dir: &Path, name: &str, headers: &[&str], rows: &[T]) -> Result<PathBuf> {
    let path = dir.join(format!("{}.csv", name));
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(sheet = name, rows = rows.len(), "sheet written");
    Ok(path)
}

/// Export every sheet into `out_dir/dashboard_reports_<stamp>/`.
async fn export_reports(pool: &SqlitePool, out_dir: &Path, stamp: NaiveDateTime) -> Result<PathBuf> {
    let dir = out_dir.join(format!("dashboard_reports_{}", stamp.format("%Y%m%d_%H%M%S")));
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    write_sheet(
        &dir,
        "materials_master",
        &["material_code", "description"],
        &fetch_materials(pool).await?,
    )?;
    write_sheet(
        &dir,
        "material_movements",
        &[
            "material_code",
            "qty",
            "received_date",
            "material_request_no",
            "project_no",
            "current_location",
            "description",
        ],
        &fetch_movements(pool).await?,
    )?;
    write_sheet(
        &dir,
        "materials_count_per_project",
        &["project_no", "materials_count"],
        &count_per_project(pool).await?,
    )?;
    write_sheet(
        &dir,
        "qty_sum_per_project",
        &["project_no", "total_qty"],
        &qty_per_project(pool).await?,
    )?;
    write_sheet(
        &dir,
        "project_phases",
        &["project_no", "phase_name", "phase_type", "phase_start", "phase_end", "status"],
        &fetch_phases(pool).await?,
    )?;
    write_sheet(
        &dir,
        "work_hours",
        &["project_no", "phase_name", "hours_total"],
        &hours_per_phase(pool).await?,
    )?;

    Ok(dir)
}

fn env_or(flag: Option<PathBuf>, var: &str, default: &str) -> PathBuf {
    flag.or_else(|| std::env::var_os(var).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_path = env_or(args.db, "ETL_DB_PATH", "data/app.db");
    let out_dir = env_or(args.out_dir, "REPORTS_OUT_DIR", "reports");

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(false)
        .read_only(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let stamp = chrono::Local::now().naive_local();
    let result = export_reports(&pool, &out_dir, stamp).await;
    pool.close().await;

    let dir = result?;
    println!("Reports exported to: {}", dir.display());
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCHEMA: &str = include_str!("../../../db/schema.sql");

    async fn seeded_pool() -> (TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("app.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::raw_sql(SCHEMA).execute(&pool).await.unwrap();
        sqlx::raw_sql(
            r#"
            INSERT INTO materials VALUES ('M1', 'Steel Bar'), ('M2', 'Cement');
            INSERT INTO material_movements VALUES
                ('M1', 50, '2024-03-01', 'R1', 'P9', 'Site A'),
                ('M2', 20, '2024-03-02', 'R2', 'P9', 'Site A'),
                ('M3', 5,  '2024-03-03', 'R3', 'P1', 'Yard'),
                ('M1', 7,  '2024-03-04', '',   '',   NULL);
            INSERT INTO phases VALUES
                ('P9', 'Foundations', 'civil', '2024-03-01', '2024-04-15', 'done'),
                ('P9', 'Framing', 'structural', '2024-04-16', NULL, 'open');
            INSERT INTO worklog VALUES
                ('P9', 'Foundations', '7', 'Ana',  '2024-03-02 08:00:00', '2024-03-02 16:00:00', 8),
                ('P9', 'Foundations', '8', 'Luis', '2024-03-02 08:00:00', '2024-03-02 12:30:00', 4.5),
                ('P9', 'Framing',     '7', 'Ana',  '2024-04-17 08:00:00', '2024-04-17 10:00:00', NULL);
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        (dir, pool)
    }

    // -------------------------------------------------------------------------
    // AGGREGATES
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_count_per_project() {
        let (_dir, pool) = seeded_pool().await;
        let rows = count_per_project(&pool).await.unwrap();
        assert_eq!(
            rows,
            vec![
                CountRow { project_no: None, materials_count: 1 },
                CountRow { project_no: Some("P1".to_string()), materials_count: 1 },
                CountRow { project_no: Some("P9".to_string()), materials_count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_qty_per_project() {
        let (_dir, pool) = seeded_pool().await;
        let rows = qty_per_project(&pool).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], QtyRow { project_no: Some("P9".to_string()), total_qty: 70.0 });
    }

    #[tokio::test]
    async fn test_hours_per_phase_treats_missing_hours_as_zero() {
        let (_dir, pool) = seeded_pool().await;
        let rows = hours_per_phase(&pool).await.unwrap();
        assert_eq!(
            rows,
            vec![
                HoursRow {
                    project_no: Some("P9".to_string()),
                    phase_name: Some("Foundations".to_string()),
                    hours_total: 12.5,
                },
                HoursRow {
                    project_no: Some("P9".to_string()),
                    phase_name: Some("Framing".to_string()),
                    hours_total: 0.0,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_movements_join_descriptions() {
        let (_dir, pool) = seeded_pool().await;
        let rows = fetch_movements(&pool).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].description.as_deref(), Some("Steel Bar"));
        // M3 has no master record.
        assert_eq!(rows[2].material_code, "M3");
        assert_eq!(rows[2].description, None);
        assert_eq!(rows[3].project_no, None);
    }

    // -------------------------------------------------------------------------
    // EXPORT
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_export_writes_every_sheet() {
        let (dir, pool) = seeded_pool().await;
        let stamp = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();

        let out = export_reports(&pool, &dir.path().join("reports"), stamp)
            .await
            .unwrap();

        assert!(out.ends_with("dashboard_reports_20240501_093000"));
        for sheet in [
            "materials_master",
            "material_movements",
            "materials_count_per_project",
            "qty_sum_per_project",
            "project_phases",
            "work_hours",
        ] {
            assert!(out.join(format!("{}.csv", sheet)).exists(), "missing {}", sheet);
        }

        let counts = std::fs::read_to_string(out.join("materials_count_per_project.csv")).unwrap();
        assert_eq!(counts, "project_no,materials_count\n,1\nP1,1\nP9,2\n");

        let phases = std::fs::read_to_string(out.join("project_phases.csv")).unwrap();
        assert!(phases.contains("P9,Framing,structural,2024-04-16,,open"));
    }

    #[tokio::test]
    async fn test_empty_sheet_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<CountRow> = Vec::new();
        let path = write_sheet(dir.path(), "empty", &["project_no", "materials_count"], &rows).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "project_no,materials_count\n");
    }

    #[test]
    fn test_env_or_prefers_flag() {
        let path = env_or(Some(PathBuf::from("x.db")), "REPORTS_TEST_UNSET_VAR", "data/app.db");
        assert_eq!(path, PathBuf::from("x.db"));
        let fallback = env_or(None, "REPORTS_TEST_UNSET_VAR", "data/app.db");
        assert_eq!(fallback, PathBuf::from("data/app.db"));
    }
}
