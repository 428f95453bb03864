//! Typed records for the five persisted tables.

use crate::upsert::{Record, SqlValue, TableSpec};
use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Material {
    pub material_code: String,
    pub description: Option<String>,
}

impl Record for Material {
    const TABLE: TableSpec = TableSpec {
        name: "materials",
        columns: &["material_code", "description"],
        key: &["material_code"],
    };

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.material_code.clone()),
            SqlValue::text_or_null(&self.description),
        ]
    }
}

/// One received lot of material. Identified by what moved, when, for which
/// project and under which request.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Movement {
    pub material_code: String,
    pub qty: f64,
    pub received_date: NaiveDate,
    pub material_request_no: Option<String>,
    pub project_no: Option<String>,
    pub current_location: Option<String>,
}

impl Record for Movement {
    const TABLE: TableSpec = TableSpec {
        name: "material_movements",
        columns: &[
            "material_code",
            "qty",
            "received_date",
            "material_request_no",
            "project_no",
            "current_location",
        ],
        key: &[
            "material_code",
            "received_date",
            "project_no",
            "material_request_no",
        ],
    };

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.material_code.clone()),
            SqlValue::Real(self.qty),
            SqlValue::Date(self.received_date),
            SqlValue::key_text(&self.material_request_no),
            SqlValue::key_text(&self.project_no),
            SqlValue::text_or_null(&self.current_location),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Project {
    pub project_no: String,
    pub project_start: Option<NaiveDate>,
    pub project_end: Option<NaiveDate>,
}

impl Record for Project {
    const TABLE: TableSpec = TableSpec {
        name: "projects",
        columns: &["project_no", "project_start", "project_end"],
        key: &["project_no"],
    };

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.project_no.clone()),
            SqlValue::date_or_null(self.project_start),
            SqlValue::date_or_null(self.project_end),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Phase {
    pub project_no: Option<String>,
    pub phase_name: String,
    pub phase_type: Option<String>,
    pub phase_start: Option<NaiveDate>,
    pub phase_end: Option<NaiveDate>,
    pub status: Option<String>,
}

impl Record for Phase {
    const TABLE: TableSpec = TableSpec {
        name: "phases",
        columns: &[
            "project_no",
            "phase_name",
            "phase_type",
            "phase_start",
            "phase_end",
            "status",
        ],
        key: &["project_no", "phase_name"],
    };

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::key_text(&self.project_no),
            SqlValue::Text(self.phase_name.clone()),
            SqlValue::text_or_null(&self.phase_type),
            SqlValue::date_or_null(self.phase_start),
            SqlValue::date_or_null(self.phase_end),
            SqlValue::text_or_null(&self.status),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct WorklogEntry {
    pub project_no: Option<String>,
    pub phase_name: Option<String>,
    pub employee_id: String,
    pub employee_name: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub hours_worked: Option<f64>,
}

impl Record for WorklogEntry {
    const TABLE: TableSpec = TableSpec {
        name: "worklog",
        columns: &[
            "project_no",
            "phase_name",
            "employee_id",
            "employee_name",
            "start_time",
            "end_time",
            "hours_worked",
        ],
        key: &[
            "project_no",
            "phase_name",
            "employee_id",
            "start_time",
            "end_time",
        ],
    };

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::key_text(&self.project_no),
            SqlValue::key_text(&self.phase_name),
            SqlValue::Text(self.employee_id.clone()),
            SqlValue::text_or_null(&self.employee_name),
            SqlValue::Timestamp(self.start_time),
            SqlValue::Timestamp(self.end_time),
            self.hours_worked.map(SqlValue::Real).unwrap_or(SqlValue::Null),
        ]
    }
}
