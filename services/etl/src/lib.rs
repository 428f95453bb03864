//! Site ledger ETL - loads spreadsheet exports into the relational store
//!
//! Pipeline, per input file:
//! - Read the first sheet (xlsx/xls/ods) or CSV into raw rows
//! - Normalize headers to canonical column names and trim cells
//! - Coerce each row into its typed record, failing on the first bad value
//! - Upsert the batch by the entity's unique key in one transaction
//! - For movements, add explicit project rows and derive missing projects
//!
//! Loading the same file twice leaves the store exactly as loading it once.

pub mod coerce;
pub mod derive;
pub mod error;
pub mod loaders;
pub mod model;
pub mod normalize;
pub mod store;
pub mod table;
pub mod upsert;

pub use error::{EtlError, Result};
pub use loaders::{
    load_all, load_materials, load_movements, load_phases, load_worklog, parse_all, InputPaths,
    LoadReport,
};
pub use normalize::Entity;
pub use store::{Store, StoreConfig};
