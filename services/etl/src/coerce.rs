//! Per-column coercion from raw cells into typed values.
//!
//! Column types are declared by the loaders, never inferred from content.

use crate::error::{EtlError, Result};
use crate::normalize::{Entity, Frame};
use crate::table::{Cell, RawRow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// `1,250` or `12,345,678.5`: commas only as thousands separators.
static THOUSANDS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").unwrap());

/// Reads typed values out of one row of a `Frame`.
pub struct RowReader<'a> {
    entity: Entity,
    row: &'a RawRow,
}

impl<'a> RowReader<'a> {
    pub fn new(frame: &Frame, row: &'a RawRow) -> Self {
        Self {
            entity: frame.entity,
            row,
        }
    }

    pub fn line(&self) -> usize {
        self.row.line
    }

    fn cell(&self, pos: Option<usize>) -> &Cell {
        pos.and_then(|p| self.row.cells.get(p)).unwrap_or(&Cell::Empty)
    }

    fn error(&self, column: &'static str, cell: &Cell, expected: &'static str) -> EtlError {
        EtlError::TypeCoercion {
            entity: self.entity.as_str(),
            column,
            line: self.row.line,
            value: cell.to_string(),
            expected,
        }
    }

    pub fn text(&self, pos: Option<usize>) -> Option<String> {
        let cell = self.cell(pos);
        if cell.is_blank() {
            None
        } else {
            Some(cell.to_string().trim().to_string())
        }
    }

    pub fn required_text(&self, column: &'static str, pos: usize) -> Result<String> {
        let cell = self.cell(Some(pos));
        self.text(Some(pos))
            .ok_or_else(|| self.error(column, cell, "non-empty text"))
    }

    pub fn number(&self, column: &'static str, pos: Option<usize>) -> Result<Option<f64>> {
        let cell = self.cell(pos);
        let value = match cell {
            Cell::Empty => return Ok(None),
            Cell::Int(i) => *i as f64,
            Cell::Float(f) => *f,
            Cell::Text(s) => parse_number(s).ok_or_else(|| self.error(column, cell, "number"))?,
            Cell::Bool(_) | Cell::DateTime(_) => return Err(self.error(column, cell, "number")),
        };
        if value.is_finite() {
            Ok(Some(value))
        } else {
            Err(self.error(column, cell, "number"))
        }
    }

    pub fn required_number(&self, column: &'static str, pos: usize) -> Result<f64> {
        let cell = self.cell(Some(pos));
        self.number(column, Some(pos))?
            .ok_or_else(|| self.error(column, cell, "number"))
    }

    pub fn date(&self, column: &'static str, pos: Option<usize>) -> Result<Option<NaiveDate>> {
        let cell = self.cell(pos);
        match cell {
            Cell::Empty => Ok(None),
            Cell::DateTime(dt) => Ok(Some(dt.date())),
            Cell::Text(s) => parse_date(s)
                .map(Some)
                .ok_or_else(|| self.error(column, cell, "date")),
            _ => Err(self.error(column, cell, "date")),
        }
    }

    pub fn required_date(&self, column: &'static str, pos: usize) -> Result<NaiveDate> {
        let cell = self.cell(Some(pos));
        self.date(column, Some(pos))?
            .ok_or_else(|| self.error(column, cell, "date"))
    }

    pub fn required_timestamp(&self, column: &'static str, pos: usize) -> Result<NaiveDateTime> {
        let cell = self.cell(Some(pos));
        match cell {
            Cell::DateTime(dt) => Ok(*dt),
            Cell::Text(s) => parse_timestamp(s).ok_or_else(|| self.error(column, cell, "timestamp")),
            _ => Err(self.error(column, cell, "timestamp")),
        }
    }
}

/// Parse a text quantity. A comma is accepted only as a thousands separator;
/// `2,5` is rejected rather than read as 25.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.contains(',') {
        if !THOUSANDS_REGEX.is_match(s) {
            return None;
        }
        return s.replace(',', "").parse().ok();
    }
    s.parse().ok()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| parse_datetime_only(s).map(|dt| dt.date()))
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    parse_datetime_only(s).or_else(|| {
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
            .map(|d| d.and_time(NaiveTime::MIN))
    })
}

fn parse_datetime_only(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::table::RawTable;

    fn frame(cells: Vec<Cell>) -> Frame {
        let headers = (0..cells.len()).map(|i| format!("c{}", i)).collect();
        normalize(RawTable::new(headers, vec![(7, cells)]), Entity::Movements)
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // -------------------------------------------------------------------------
    // TEXT
    // -------------------------------------------------------------------------

    #[test]
    fn test_text_from_numeric_code() {
        let f = frame(vec![Cell::Float(1001.0), Cell::Int(7), Cell::Empty]);
        let r = RowReader::new(&f, &f.rows[0]);
        assert_eq!(r.text(Some(0)), Some("1001".to_string()));
        assert_eq!(r.text(Some(1)), Some("7".to_string()));
        assert_eq!(r.text(Some(2)), None);
        assert_eq!(r.text(None), None);
    }

    #[test]
    fn test_required_text_missing_fails() {
        let f = frame(vec![Cell::Empty, Cell::Int(1)]);
        let r = RowReader::new(&f, &f.rows[0]);
        let err = r.required_text("material_code", 0).unwrap_err();
        assert!(matches!(err, EtlError::TypeCoercion { line: 7, column: "material_code", .. }));
    }

    // -------------------------------------------------------------------------
    // NUMBERS
    // -------------------------------------------------------------------------

    #[test]
    fn test_number_variants() {
        let f = frame(vec![
            Cell::Int(50),
            Cell::Float(2.5),
            Cell::text("1,250.75"),
            Cell::Empty,
        ]);
        let r = RowReader::new(&f, &f.rows[0]);
        assert_eq!(r.number("qty", Some(0)).unwrap(), Some(50.0));
        assert_eq!(r.number("qty", Some(1)).unwrap(), Some(2.5));
        assert_eq!(r.number("qty", Some(2)).unwrap(), Some(1250.75));
        assert_eq!(r.number("qty", Some(3)).unwrap(), None);
    }

    #[test]
    fn test_decimal_comma_quantity_fails() {
        let f = frame(vec![Cell::text("2,5"), Cell::text("1,2,3"), Cell::text("12,345,678.5")]);
        let r = RowReader::new(&f, &f.rows[0]);
        let err = r.number("qty", Some(0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "movements line 7: column 'qty' value '2,5' is not a valid number"
        );
        assert!(r.number("qty", Some(1)).is_err());
        assert_eq!(r.number("qty", Some(2)).unwrap(), Some(12_345_678.5));
    }

    #[test]
    fn test_parse_number_thousands_separator() {
        assert_eq!(parse_number("1,000"), Some(1000.0));
        assert_eq!(parse_number("-1,000.25"), Some(-1000.25));
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("1,00"), None);
        assert_eq!(parse_number("1000,000"), None);
        assert_eq!(parse_number(",5"), None);
    }

    #[test]
    fn test_non_numeric_quantity_fails() {
        let f = frame(vec![Cell::text("lots")]);
        let r = RowReader::new(&f, &f.rows[0]);
        let err = r.required_number("qty", 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "movements line 7: column 'qty' value 'lots' is not a valid number"
        );
    }

    #[test]
    fn test_required_number_empty_fails() {
        let f = frame(vec![Cell::Empty, Cell::Int(1)]);
        let r = RowReader::new(&f, &f.rows[0]);
        assert!(r.required_number("qty", 0).is_err());
    }

    // -------------------------------------------------------------------------
    // DATES
    // -------------------------------------------------------------------------

    #[test]
    fn test_date_formats() {
        assert_eq!(parse_date("2024-03-01"), Some(d(2024, 3, 1)));
        assert_eq!(parse_date("2024/03/01"), Some(d(2024, 3, 1)));
        assert_eq!(parse_date("01.03.2024"), Some(d(2024, 3, 1)));
        assert_eq!(parse_date("2024-03-01 00:00:00"), Some(d(2024, 3, 1)));
        assert_eq!(parse_date("2024-03-01T13:45:00"), Some(d(2024, 3, 1)));
        assert_eq!(parse_date("March 1st"), None);
    }

    #[test]
    fn test_date_from_spreadsheet_cell() {
        let dt = d(2024, 1, 5).and_hms_opt(0, 0, 0).unwrap();
        let f = frame(vec![Cell::DateTime(dt), Cell::Float(45000.0)]);
        let r = RowReader::new(&f, &f.rows[0]);
        assert_eq!(r.required_date("received_date", 0).unwrap(), d(2024, 1, 5));
        assert!(r.date("received_date", Some(1)).is_err());
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = d(2024, 3, 1).and_hms_opt(8, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01 08:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T08:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 08:30"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01"),
            Some(d(2024, 3, 1).and_hms_opt(0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("8:30"), None);
    }
}
