//! Writes the preview workbook and the chunked CSV import files for the
//! records whose image was resolved.
pub mod csv;
pub mod workbook;

use crate::config::OutputConfig;
use crate::error::CatalogError;
use crate::error::ResultMessage;
use crate::imaging::ResolvedImage;
use crate::schema::ColumnMapping;
use crate::schema::SchemaError;
use crate::schema::DETAIL_PHOTO_FIELD;
use crate::schema::HEIGHT_FIELD;
use crate::schema::REQUIRED_FIELDS;
use crate::schema::WEIGHT_FIELD;
use crate::table::Row;
use crate::table::Table;
use crate::table::Value;
use log::error;
use log::info;
use regex::Regex;
use std::path::Path;
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;
use workbook::Picture;
use workbook::WorkbookBuilder;

pub const PREVIEW_COLUMN: &str = "ANTEPRIMA";

static NUMBER_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("Hardcode regex pattern"));

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("Row has {1} values but the sheet has {0} columns")]
    RowWidthError(usize, usize),

    #[error("Thumbnail '{0}' is missing")]
    ThumbnailMissingError(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmitResult {
    pub excel_success: bool,
    pub csv_success: bool,
    pub workbook_path: PathBuf,
    pub csv_files: Vec<PathBuf>,
    /// One message per failed artifact.
    pub errors: Vec<String>,
}

/// Smallest number written in the value: `"120-130 cm"` → `120`.
pub fn smallest_number(value: &Value) -> Option<f64> {
    if let Value::Number(number) = value {
        return Some(*number);
    }
    NUMBER_TOKEN
        .find_iter(&value.to_string())
        .filter_map(|token| token.as_str().parse::<f64>().ok())
        .reduce(f64::min)
}

/// The record's values in required-field order, with height and weight reduced
/// to their smallest number and the detail photo replaced by `crop_name`.
pub fn prepare_record(row: &Row, mapping: &ColumnMapping, crop_name: &str) -> Result<Vec<Value>, SchemaError> {
    REQUIRED_FIELDS
        .iter()
        .map(|field| {
            let value = row.get(mapping.index_of(field)?);
            Ok(match *field {
                DETAIL_PHOTO_FIELD => Value::text(crop_name),
                HEIGHT_FIELD | WEIGHT_FIELD => smallest_number(value).map(Value::Number).unwrap_or_else(|| value.clone()),
                _ => value.clone(),
            })
        })
        .collect()
}

/// Writes the preview workbook and the CSV chunks for the resolved records
///
/// Only records with a resolved image are written, in cleaned-table order.
/// Each artifact fails on its own; an error in one never skips the other.
///
/// # Arguments
/// * `cleaned` - The deduplicated table
/// * `resolved` - Thumbnails and crops of the records whose image was found
/// * `mapping` - Required field to table column
/// * `output_dir` - Existing directory receiving the artifacts
/// * `config` - File names, chunk size and thumbnail scale
///
/// # Returns
/// Per-artifact success flags, the files written and one message per failure
pub fn emit(cleaned: &Table, resolved: &[ResolvedImage], mapping: &ColumnMapping, output_dir: &Path, config: &OutputConfig) -> EmitResult {
    let workbook_path = output_dir.join(&config.workbook_name);
    let mut result = EmitResult { workbook_path: workbook_path.clone(), ..EmitResult::default() };

    let mut records = Vec::with_capacity(resolved.len());
    for image in resolved {
        let Some(row) = cleaned.rows().get(image.row) else {
            continue;
        };
        match prepare_record(row, mapping, &image.crop_name) {
            Ok(record) => records.push((record, image)),
            Err(cause) => {
                result.errors.push(cause.to_string());
                return result;
            }
        }
    }

    match write_workbook(&records, &workbook_path, config).with_prefix(&config.workbook_name) {
        Ok(()) => {
            info!("Preview workbook written: {}", workbook_path.display());
            result.excel_success = true;
        }
        Err(cause) => {
            error!("{cause}");
            result.errors.push(cause.to_string());
        }
    }

    let values: Vec<Vec<Value>> = records.into_iter().map(|(record, _)| record).collect();
    match csv::write_chunks(output_dir, &config.csv_prefix, &values, config.csv_chunk_size).with_prefix(&config.csv_prefix) {
        Ok(files) => {
            info!("{} CSV files written", files.len());
            result.csv_files = files;
            result.csv_success = true;
        }
        Err(cause) => {
            error!("{cause}");
            result.errors.push(cause.to_string());
        }
    }
    result
}

fn write_workbook(records: &[(Vec<Value>, &ResolvedImage)], path: &Path, config: &OutputConfig) -> Result<(), CatalogError> {
    let header: Vec<&str> = std::iter::once(PREVIEW_COLUMN).chain(REQUIRED_FIELDS).collect();
    let mut builder = WorkbookBuilder::new(&config.sheet_name, &header).with_image_scale(config.preview_scale);
    for (record, image) in records {
        let values = std::iter::once(Value::Empty).chain(record.iter().cloned()).collect();
        let (width, height) = image.thumbnail_size;
        let picture = Picture { path: image.thumbnail.clone(), width, height };
        builder.push_row(values, Some(picture))?;
    }
    builder.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::reconcile;

    fn mapping() -> ColumnMapping {
        reconcile(&REQUIRED_FIELDS, &REQUIRED_FIELDS).unwrap()
    }

    fn row(height: Value, weight: Value) -> Row {
        let values = REQUIRED_FIELDS
            .iter()
            .map(|field| match *field {
                HEIGHT_FIELD => height.clone(),
                WEIGHT_FIELD => weight.clone(),
                DETAIL_PHOTO_FIELD => Value::text("old.jpg"),
                field => Value::text(field),
            })
            .collect();
        Row::new(values)
    }

    #[test]
    fn smallest_number_of_ranges() {
        assert_eq!(smallest_number(&Value::text("120-130 cm")), Some(120.0));
        assert_eq!(smallest_number(&Value::text("h. 150.5 / 148")), Some(148.0));
        assert_eq!(smallest_number(&Value::Number(140.0)), Some(140.0));
        assert_eq!(smallest_number(&Value::text("n.d.")), None);
        assert_eq!(smallest_number(&Value::Empty), None);
    }

    #[test]
    fn prepares_record_in_field_order() {
        let record = prepare_record(&row(Value::text("120-130 cm"), Value::text("n.d.")), &mapping(), "L1_dettaglio.jpg").unwrap();
        assert_eq!(record.len(), 17);
        assert_eq!(record[0], Value::text("CODICE TAILOR"));
        assert_eq!(record[2], Value::text("L1_dettaglio.jpg"));
        assert_eq!(record[9], Value::Number(120.0));
        assert_eq!(record[10], Value::text("n.d."));
    }

    #[test]
    fn emits_nothing_but_headers_for_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::new(REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(), vec![]);
        let result = emit(&table, &[], &mapping(), dir.path(), &OutputConfig::default());
        assert!(result.excel_success && result.csv_success);
        assert!(result.csv_files.is_empty());
        assert!(dir.path().join("anteprime_excel.xlsx").is_file());
    }

    #[test]
    fn unwritable_workbook_does_not_block_csv() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::new(REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(), vec![row(Value::Empty, Value::Empty)]);
        let image = ResolvedImage {
            row: 0,
            key: "L1".to_owned(),
            file_name: "L1.JPG".to_owned(),
            source: dir.path().join("L1.JPG"),
            thumbnail: dir.path().join("missing_thumb.jpg"),
            thumbnail_size: (10, 10),
            crop: dir.path().join("L1_dettaglio.jpg"),
            crop_name: "L1_dettaglio.jpg".to_owned(),
        };
        let result = emit(&table, &[image], &mapping(), dir.path(), &OutputConfig::default());
        assert!(!result.excel_success);
        assert!(result.csv_success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("anteprime_excel.xlsx: "));
        assert_eq!(result.csv_files.len(), 1);
    }
}
