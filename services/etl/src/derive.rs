//! Projects inferred from movement data.

use crate::error::Result;
use sqlx::{Sqlite, Transaction};

/// Insert a project for every non-empty `project_no` in `material_movements`
/// that has no project row yet, bounded by the MIN/MAX of its received dates.
/// Existing project rows are never touched. Returns the number inserted.
pub async fn ensure_projects_from_movements(tx: &mut Transaction<'_, Sqlite>) -> Result<u64> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO projects (project_no, project_start, project_end)
        SELECT project_no, MIN(received_date), MAX(received_date)
        FROM material_movements
        WHERE project_no <> ''
        GROUP BY project_no
        ON CONFLICT (project_no) DO NOTHING
        "#,
    )
    .execute(&mut **tx)
    .await?
    .rows_affected();

    tracing::debug!(inserted, "projects derived from movements");
    Ok(inserted)
}
