//! Per-entity load pipelines.
//!
//! Every loader runs the same steps: read the file, normalize headers, check
//! the expected columns, coerce each row into its typed record, then write the
//! batch inside a single transaction. Parsing finishes before the transaction
//! opens, so a malformed file never reaches the store.

use crate::coerce::RowReader;
use crate::derive::ensure_projects_from_movements;
use crate::error::Result;
use crate::model::{Material, Movement, Phase, Project, WorklogEntry};
use crate::normalize::{normalize, Entity};
use crate::store::Store;
use crate::table::{read_table, RawTable};
use crate::upsert::{upsert, upsert_atomic};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The four input files of one pipeline run.
#[derive(Debug, Clone)]
pub struct InputPaths {
    pub materials: PathBuf,
    pub movements: PathBuf,
    pub phases: PathBuf,
    pub worklog: PathBuf,
}

/// Outcome of one entity load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub entity: Entity,
    pub rows_read: usize,
    pub rows_written: u64,
    pub projects_explicit: u64,
    pub projects_derived: u64,
}

impl LoadReport {
    fn new(entity: Entity, rows_read: usize, rows_written: u64) -> Self {
        Self {
            entity,
            rows_read,
            rows_written,
            projects_explicit: 0,
            projects_derived: 0,
        }
    }
}

/// Parsed movements file: movement rows plus any explicit project rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MovementBatch {
    pub movements: Vec<Movement>,
    pub projects: Vec<Project>,
}

// =============================================================================
// PARSING (pure)
// =============================================================================

pub fn parse_materials(raw: RawTable) -> Result<Vec<Material>> {
    let frame = normalize(raw, Entity::Materials);
    let code = frame.require("material_code")?;
    let description = frame.require("description")?;

    let mut seen = HashSet::new();
    let mut materials = Vec::with_capacity(frame.rows.len());
    for row in &frame.rows {
        let r = RowReader::new(&frame, row);
        let material = Material {
            material_code: r.required_text("material_code", code)?,
            description: r.text(Some(description)),
        };
        // A code listed twice in one master file keeps its first description.
        if seen.insert(material.material_code.clone()) {
            materials.push(material);
        } else {
            tracing::debug!(line = r.line(), code = %material.material_code, "duplicate material code skipped");
        }
    }
    Ok(materials)
}

pub fn parse_movements(raw: RawTable) -> Result<MovementBatch> {
    let frame = normalize(raw, Entity::Movements);
    let code = frame.require("material_code")?;
    let qty = frame.require("qty")?;
    let received = frame.require("received_date")?;
    let request = frame.require("material_request_no")?;
    let project = frame.require("project_no")?;
    let location = frame.require("current_location")?;
    let start = frame.optional("project_start");
    let end = frame.optional("project_end");
    let has_explicit_projects = start.is_some() || end.is_some();

    let mut batch = MovementBatch::default();
    for row in &frame.rows {
        let r = RowReader::new(&frame, row);
        let movement = Movement {
            material_code: r.required_text("material_code", code)?,
            qty: r.required_number("qty", qty)?,
            received_date: r.required_date("received_date", received)?,
            material_request_no: r.text(Some(request)),
            project_no: r.text(Some(project)),
            current_location: r.text(Some(location)),
        };

        if has_explicit_projects {
            let project_start = r.date("project_start", start)?;
            let project_end = r.date("project_end", end)?;
            if let Some(project_no) = movement.project_no.clone() {
                if project_start.is_some() || project_end.is_some() {
                    let explicit = Project {
                        project_no,
                        project_start,
                        project_end,
                    };
                    if !batch.projects.contains(&explicit) {
                        batch.projects.push(explicit);
                    }
                }
            }
        }

        batch.movements.push(movement);
    }

    for p in &batch.projects {
        if let (Some(s), Some(e)) = (p.project_start, p.project_end) {
            if s > e {
                warn!(project = %p.project_no, start = %s, end = %e, "project starts after it ends");
            }
        }
    }

    Ok(batch)
}

pub fn parse_phases(raw: RawTable) -> Result<Vec<Phase>> {
    let frame = normalize(raw, Entity::Phases);
    let project = frame.require("project_no")?;
    let name = frame.require("phase_name")?;
    let kind = frame.require("phase_type")?;
    let start = frame.require("phase_start")?;
    let end = frame.require("phase_end")?;
    let status = frame.require("status")?;

    frame
        .rows
        .iter()
        .map(|row| -> Result<Phase> {
            let r = RowReader::new(&frame, row);
            Ok(Phase {
                project_no: r.text(Some(project)),
                phase_name: r.required_text("phase_name", name)?,
                phase_type: r.text(Some(kind)),
                phase_start: r.date("phase_start", Some(start))?,
                phase_end: r.date("phase_end", Some(end))?,
                status: r.text(Some(status)),
            })
        })
        .collect()
}

pub fn parse_worklog(raw: RawTable) -> Result<Vec<WorklogEntry>> {
    let frame = normalize(raw, Entity::Worklog);
    let project = frame.require("project_no")?;
    let phase = frame.require("phase_name")?;
    let employee_id = frame.require("employee_id")?;
    let employee_name = frame.require("employee_name")?;
    let start = frame.require("start_time")?;
    let end = frame.require("end_time")?;
    let hours = frame.require("hours_worked")?;

    frame
        .rows
        .iter()
        .map(|row| -> Result<WorklogEntry> {
            let r = RowReader::new(&frame, row);
            Ok(WorklogEntry {
                project_no: r.text(Some(project)),
                phase_name: r.text(Some(phase)),
                employee_id: r.required_text("employee_id", employee_id)?,
                employee_name: r.text(Some(employee_name)),
                start_time: r.required_timestamp("start_time", start)?,
                end_time: r.required_timestamp("end_time", end)?,
                hours_worked: r.number("hours_worked", Some(hours))?,
            })
        })
        .collect()
}

/// Read and validate all four files without touching a store.
/// Returns the number of rows each file would load.
pub fn parse_all(paths: &InputPaths) -> Result<Vec<(Entity, usize)>> {
    Ok(vec![
        (
            Entity::Materials,
            parse_materials(read_table(&paths.materials)?)?.len(),
        ),
        (
            Entity::Movements,
            parse_movements(read_table(&paths.movements)?)?.movements.len(),
        ),
        (Entity::Phases, parse_phases(read_table(&paths.phases)?)?.len()),
        (Entity::Worklog, parse_worklog(read_table(&paths.worklog)?)?.len()),
    ])
}

// =============================================================================
// LOADING
// =============================================================================

pub async fn load_materials(store: &Store, path: &Path) -> Result<LoadReport> {
    let materials = parse_materials(read_table(path)?)?;

    let written = upsert_atomic(store, &materials).await?;

    let report = LoadReport::new(Entity::Materials, materials.len(), written);
    info!(file = %path.display(), rows = report.rows_read, "materials loaded");
    Ok(report)
}

pub async fn load_movements(store: &Store, path: &Path) -> Result<LoadReport> {
    let batch = parse_movements(read_table(path)?)?;

    let mut tx = store.begin().await?;
    let written = upsert(&mut tx, &batch.movements).await?;
    // Explicit rows go in before derivation so they take precedence.
    let explicit = upsert(&mut tx, &batch.projects).await?;
    let derived = ensure_projects_from_movements(&mut tx).await?;
    tx.commit().await?;

    let mut report = LoadReport::new(Entity::Movements, batch.movements.len(), written);
    report.projects_explicit = explicit;
    report.projects_derived = derived;
    info!(
        file = %path.display(),
        rows = report.rows_read,
        projects_explicit = explicit,
        projects_derived = derived,
        "movements loaded"
    );
    Ok(report)
}

pub async fn load_phases(store: &Store, path: &Path) -> Result<LoadReport> {
    let phases = parse_phases(read_table(path)?)?;

    let written = upsert_atomic(store, &phases).await?;

    let report = LoadReport::new(Entity::Phases, phases.len(), written);
    info!(file = %path.display(), rows = report.rows_read, "phases loaded");
    Ok(report)
}

pub async fn load_worklog(store: &Store, path: &Path) -> Result<LoadReport> {
    let entries = parse_worklog(read_table(path)?)?;

    let written = upsert_atomic(store, &entries).await?;

    let report = LoadReport::new(Entity::Worklog, entries.len(), written);
    info!(file = %path.display(), rows = report.rows_read, "worklog loaded");
    Ok(report)
}

/// Run the four loads in order. Stops at the first failure; loads that
/// already finished stay committed.
pub async fn load_all(store: &Store, paths: &InputPaths) -> Result<Vec<LoadReport>> {
    Ok(vec![
        load_materials(store, &paths.materials).await?,
        load_movements(store, &paths.movements).await?,
        load_phases(store, &paths.phases).await?,
        load_worklog(store, &paths.worklog).await?,
    ])
}
