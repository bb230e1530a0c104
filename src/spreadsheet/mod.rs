//! Workbook readers for the source table.
//!
//! Each format reader loads the non-empty cells of the accepted sheets into
//! [`sheet::Sheet`]s; [`crate::table::Table::read`] turns the first of them
//! into a header plus rows.
use crate::error::CatalogError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::ods::OdsSpreadsheet;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use std::path::Path;
use thiserror::Error;

pub(crate) mod cell;
pub(crate) mod criteria;
pub(crate) mod excel;
pub(crate) mod ods;
pub(crate) mod range;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsx;

/// Workbook extensions the readers understand.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Missing part '{0}' in workbook package")]
    FileError(String),

    #[error("Spreadsheet '{0}' is password protected")]
    SpreadsheetPasswordProtectedError(String),

    #[error("Spreadsheet '{0}' has no worksheets")]
    SpreadsheetEmptyError(String),

    #[error("Error value in '{0}' sheet '{1}' at {2}: {3}")]
    CellValueError(String, String, String, String),

    #[error("Unsupported spreadsheet format '{0}'")]
    UnsupportedFormatError(String),

    #[error("No sheet of '{0}' matches '{1}'")]
    SheetNotFoundError(String, String),
}

pub(crate) trait Spreadsheet {
    fn name(&self) -> String;

    /// The shared string table, empty for formats that store strings inline.
    fn load_shared_strings(&mut self) -> Result<Vec<String>, CatalogError>;

    /// Sheets accepted by `criteria`, in workbook order.
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, CatalogError>;
}

/// Picks a reader by file extension (case-insensitive).
pub(crate) fn open_spreadsheet(path: &Path) -> Result<Box<dyn Spreadsheet>, CatalogError> {
    let file_name = path.to_string_lossy();
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let spreadsheet: Box<dyn Spreadsheet> = match extension.as_str() {
        "xlsx" | "xlsm" => Box::new(XlsxSpreadsheet::open(&file_name)?),
        "xls" => Box::new(XlsSpreadsheet::open(&file_name)?),
        "ods" => Box::new(OdsSpreadsheet::open(&file_name)?),
        _ => Err(SpreadsheetError::UnsupportedFormatError(extension))?,
    };
    Ok(spreadsheet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_extensions() {
        let error = open_spreadsheet(Path::new("campioni.numbers")).err().map(|e| e.to_string());
        assert_eq!(error.as_deref(), Some("Unsupported spreadsheet format 'numbers'"));
    }
}
