//! Header canonicalization and cell trimming.

use crate::error::{EtlError, Result};
use crate::table::{Cell, RawRow, RawTable};
use std::collections::HashMap;
use std::fmt;

/// Explicit header renames applied after canonicalization. Every export
/// family has been seen with the glued "MaterialCode" header.
const RENAMES: &[(&str, &str)] = &[("materialcode", "material_code")];

/// The four input categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Materials,
    Movements,
    Phases,
    Worklog,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Materials => "materials",
            Entity::Movements => "movements",
            Entity::Phases => "phases",
            Entity::Worklog => "worklog",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"  Material Code "` -> `"material_code"`.
pub fn canonical_column(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

/// A normalized batch: canonical column names plus trimmed cells.
#[derive(Debug, Clone)]
pub struct Frame {
    pub entity: Entity,
    index: HashMap<String, usize>,
    pub rows: Vec<RawRow>,
}

impl Frame {
    /// Position of a required column, or `MissingColumn`.
    pub fn require(&self, column: &'static str) -> Result<usize> {
        self.optional(column).ok_or(EtlError::MissingColumn {
            entity: self.entity.as_str(),
            column,
        })
    }

    pub fn optional(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }
}

pub fn normalize(raw: RawTable, entity: Entity) -> Frame {
    let columns: Vec<String> = raw
        .headers
        .iter()
        .map(|h| {
            let canonical = canonical_column(h);
            RENAMES
                .iter()
                .find(|(from, _)| *from == canonical)
                .map(|(_, to)| to.to_string())
                .unwrap_or(canonical)
        })
        .collect();

    let mut index = HashMap::with_capacity(columns.len());
    for (pos, name) in columns.iter().enumerate() {
        if name.is_empty() {
            continue;
        }
        if index.contains_key(name) {
            tracing::warn!(%entity, column = %name, position = pos, "duplicate column ignored");
            continue;
        }
        index.insert(name.clone(), pos);
    }

    let rows = raw
        .rows
        .into_iter()
        .map(|row| RawRow {
            line: row.line,
            cells: row.cells.into_iter().map(trim_cell).collect(),
        })
        .collect();

    Frame {
        entity,
        index,
        rows,
    }
}

fn trim_cell(cell: Cell) -> Cell {
    match cell {
        Cell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Cell::Empty
            } else if trimmed.len() == s.len() {
                Cell::Text(s)
            } else {
                Cell::Text(trimmed.to_string())
            }
        }
        other => other,
    }
}
