//! ETL command - loads the four spreadsheet exports into the store
//!
//! Usage:
//!   cargo run --bin etl -- --materials materials.xlsx --movements movements.xlsx \
//!       --phases phases.xlsx --worklog worklog.xlsx [--db data/app.db]
//!
//!   # Validate the files only, no store access:
//!   cargo run --bin etl -- ... --dry-run

use anyhow::{Context, Result};
use clap::Parser;
use etl::{load_all, parse_all, InputPaths, Store, StoreConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "etl", about = "Loads materials, movements, phases and worklog exports")]
struct Args {
    /// Materials master file
    #[arg(long)]
    materials: PathBuf,

    /// Material movements file
    #[arg(long)]
    movements: PathBuf,

    /// Project phases file
    #[arg(long)]
    phases: PathBuf,

    /// Employee worklog file
    #[arg(long)]
    worklog: PathBuf,

    /// SQLite database path (falls back to ETL_DB_PATH, then data/app.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Dry run - parse and validate files, don't open the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let paths = InputPaths {
        materials: args.materials,
        movements: args.movements,
        phases: args.phases,
        worklog: args.worklog,
    };

    if args.dry_run {
        let counts = parse_all(&paths).context("Validation failed")?;
        for (entity, rows) in counts {
            info!(%entity, rows, "parsed");
        }
        info!("Dry run - nothing written");
        return Ok(());
    }

    let config = StoreConfig::resolve(args.db);
    let store = Store::open(&config)
        .await
        .with_context(|| format!("Failed to open database {}", config.path.display()))?;
    store.apply_schema().await.context("Failed to apply schema")?;

    let result = load_all(&store, &paths).await;
    store.close().await;

    let reports = result.context("ETL failed")?;
    for report in &reports {
        info!(
            entity = %report.entity,
            rows_read = report.rows_read,
            rows_written = report.rows_written,
            "load summary"
        );
    }
    info!(database = %config.path.display(), "ETL completed successfully");

    Ok(())
}
