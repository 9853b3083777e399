//! Spreadsheet import and export of test cases
//!
//! Both directions use one column layout, so an export can be edited and
//! imported again:
//!
//! | Test Case ID | Title | Description | Priority | Step Number | Action | Expected Result |
//!
//! Each row holds one step. The case columns are filled on the first row of a
//! case; following rows with a blank (or identical) case ID add further steps
//! to the same case.
//!
//! - [`sheet`]: header matching and grouping rows into cases
//! - [`reader`]: CSV and XLSX decoding into a grid of strings
//! - [`writer`]: CSV and XLSX encoding
//! - [`import`]: writing parsed cases into a suite in one transaction

pub mod import;
pub mod reader;
pub mod sheet;
pub mod writer;

use serde::{Deserialize, Serialize};

pub use import::{import_into_suite, ImportReport};
pub use sheet::{parse_sheet, ImportedCase, ParsedSheet, RowError};

/// Header labels written on export, in column order
pub const HEADERS: [&str; 7] = [
    "Test Case ID",
    "Title",
    "Description",
    "Priority",
    "Step Number",
    "Action",
    "Expected Result",
];

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("The file has no header row")]
    EmptySheet,

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to read workbook: {0}")]
    Workbook(String),

    #[error("Failed to write workbook: {0}")]
    WorkbookWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Spreadsheet file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Xlsx,
    Csv,
}

impl Format {
    /// Parses a format name or file extension
    pub fn parse(value: &str) -> Result<Self, TransferError> {
        match value.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(Format::Xlsx),
            "csv" => Ok(Format::Csv),
            other => Err(TransferError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Guesses the format from a `Content-Type` value
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or_default().trim();

        match mime.to_ascii_lowercase().as_str() {
            "text/csv" | "application/csv" => Some(Format::Csv),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some(Format::Xlsx),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Format::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Xlsx => "xlsx",
            Format::Csv => "csv",
        }
    }
}
