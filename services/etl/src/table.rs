//! Raw tabular input: spreadsheet and CSV readers.
//!
//! Both readers produce the same `RawTable`: the first row becomes the header,
//! every following non-blank row becomes a `RawRow` tagged with its 1-based
//! source line so coercion errors can point back into the file.

use crate::error::{EtlError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDateTime;
use std::fmt;
use std::path::Path;

/// A single cell as read from the source, before any column typing.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// True for `Empty` and for text that is blank after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{}", i),
            // Codes typed as numbers by the spreadsheet ("1001.0") render as "1001".
            Cell::Float(x) if x.fract() == 0.0 && x.abs() < 1e15 => write!(f, "{}", *x as i64),
            Cell::Float(x) => write!(f, "{}", x),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::DateTime(dt) if dt.time() == chrono::NaiveTime::MIN => {
                write!(f, "{}", dt.date().format("%Y-%m-%d"))
            }
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line in the source file (header is line 1).
    pub line: usize,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Build a table from a header row and data rows. Rows are padded to the
    /// header width and blank rows are dropped.
    pub fn new(headers: Vec<String>, rows: impl IntoIterator<Item = (usize, Vec<Cell>)>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .filter(|(_, cells)| !cells.iter().all(Cell::is_blank))
            .map(|(line, mut cells)| {
                if cells.len() < width {
                    cells.resize(width, Cell::Empty);
                }
                RawRow { line, cells }
            })
            .collect();
        Self { headers, rows }
    }
}

/// Read the file at `path`, picking the reader from its extension.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(path),
        "csv" | "txt" => {
            let bytes = std::fs::read(path).map_err(|e| EtlError::read(path, e))?;
            parse_csv_bytes(&bytes, path)
        }
        _ => Err(EtlError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Read the first worksheet of a workbook (calamine auto-detects the format).
fn read_workbook(path: &Path) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path).map_err(|e| EtlError::read(path, e))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| EtlError::EmptyInput(path.to_path_buf()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| EtlError::read(path, e))?;

    tracing::debug!(
        file = %path.display(),
        sheet = %sheet_name,
        rows = range.height(),
        cols = range.width(),
        "reading worksheet"
    );

    // Sheets with leading blank rows start the range further down.
    let first_line = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| EtlError::EmptyInput(path.to_path_buf()))?
        .iter()
        .map(|cell| from_calamine(cell).to_string())
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(EtlError::EmptyInput(path.to_path_buf()));
    }

    let body = rows
        .enumerate()
        .map(|(idx, row)| (first_line + idx + 1, row.iter().map(from_calamine).collect()));

    Ok(RawTable::new(headers, body))
}

fn from_calamine(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) => Cell::DateTime(value),
            None => Cell::Float(dt.as_f64()),
        },
        Data::Error(e) => Cell::Text(format!("#{:?}", e)),
    }
}

/// Parse CSV content. A UTF-8 BOM is stripped; non-UTF-8 input is decoded as
/// Windows-1252, which is what spreadsheet tools emit for "CSV (Windows)".
pub fn parse_csv_bytes(bytes: &[u8], path: &Path) -> Result<RawTable> {
    let content = match std::str::from_utf8(bytes) {
        Ok(s) => std::borrow::Cow::Borrowed(s),
        Err(_) => {
            tracing::warn!(file = %path.display(), "input is not UTF-8, decoding as Windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded
        }
    };
    let content: &str = &content;
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| EtlError::read(path, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(EtlError::EmptyInput(path.to_path_buf()));
    }

    let mut body = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| EtlError::read(path, e))?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(body.len() + 2);
        let cells = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    Cell::Empty
                } else {
                    Cell::text(field)
                }
            })
            .collect();
        body.push((line, cells));
    }

    Ok(RawTable::new(headers, body))
}
