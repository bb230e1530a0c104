//! Checks on the three run inputs, plus the summaries shown before a run.
use crate::config::TableOptions;
use crate::error::CatalogError;
use crate::filename::is_image_extension;
use crate::spreadsheet::SUPPORTED_EXTENSIONS;
use crate::table::Table;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("No {0} given")]
    MissingInput(&'static str),

    #[error("Table file '{0}' does not exist")]
    TableNotFound(String),

    #[error("Unsupported table format '.{0}', expected one of: xlsx, xlsm, xls, ods")]
    UnsupportedTableFormat(String),

    #[error("Image folder '{0}' does not exist or is not a directory")]
    ImageFolderNotFound(String),

    #[error("No images found in '{0}'")]
    NoImages(String),

    #[error("Output path '{0}' is not a directory")]
    OutputNotDirectory(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TableSummary {
    pub rows: usize,
    pub column_names: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FolderSummary {
    pub total_images: usize,
    /// Upper-cased extension → file count.
    pub image_types: BTreeMap<String, usize>,
}

fn extension_of(path: &Path) -> String {
    path.extension().map(|extension| extension.to_string_lossy().to_lowercase()).unwrap_or_default()
}

pub fn check_table_file(path: &Path) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(ValidationError::MissingInput("table file"));
    }
    if !path.is_file() {
        return Err(ValidationError::TableNotFound(path.display().to_string()));
    }
    let extension = extension_of(path);
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ValidationError::UnsupportedTableFormat(extension));
    }
    Ok(())
}

/// Reads the table the way a run would and reports its size.
pub fn describe_table(path: &Path, options: &TableOptions) -> Result<TableSummary, CatalogError> {
    check_table_file(path)?;
    let table = Table::read(path, options)?;
    Ok(TableSummary {
        rows: table.len(),
        column_names: table.columns().to_vec(),
    })
}

pub fn check_image_folder(path: &Path) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(ValidationError::MissingInput("image folder"));
    }
    if !path.is_dir() {
        return Err(ValidationError::ImageFolderNotFound(path.display().to_string()));
    }
    Ok(())
}

/// Counts image files directly inside the folder; none at all is an error.
pub fn analyze_image_folder(path: &Path) -> Result<FolderSummary, CatalogError> {
    check_image_folder(path)?;
    let mut summary = FolderSummary::default();
    for entry in std::fs::read_dir(path)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let extension = extension_of(&path);
        if is_image_extension(&extension) {
            summary.total_images += 1;
            *summary.image_types.entry(extension.to_uppercase()).or_default() += 1;
        }
    }
    if summary.total_images == 0 {
        Err(ValidationError::NoImages(path.display().to_string()))?
    }
    Ok(summary)
}

/// The output directory may not exist yet, but must not be a file.
pub fn check_output_dir(path: &Path) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(ValidationError::MissingInput("output directory"));
    }
    if path.exists() && !path.is_dir() {
        return Err(ValidationError::OutputNotDirectory(path.display().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn table_file_checks() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(check_table_file(Path::new("")), Err(ValidationError::MissingInput(_))));
        assert!(matches!(check_table_file(&dir.path().join("gone.xlsx")), Err(ValidationError::TableNotFound(_))));

        let csv = dir.path().join("table.CSV");
        fs::write(&csv, "FOTO\n").unwrap();
        let error = check_table_file(&csv).unwrap_err();
        assert_eq!(error.to_string(), "Unsupported table format '.csv', expected one of: xlsx, xlsm, xls, ods");

        let xlsx = dir.path().join("Campioni.XLSX");
        fs::write(&xlsx, "").unwrap();
        assert!(check_table_file(&xlsx).is_ok());
    }

    #[test]
    fn counts_images_by_type() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.JPG", "b.jpg", "c.png", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("sub.jpg")).unwrap();

        let summary = analyze_image_folder(dir.path()).unwrap();
        assert_eq!(summary.total_images, 3);
        assert_eq!(summary.image_types.get("JPG"), Some(&2));
        assert_eq!(summary.image_types.get("PNG"), Some(&1));
    }

    #[test]
    fn folder_without_images_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.txt"), "").unwrap();
        let error = analyze_image_folder(dir.path()).unwrap_err();
        assert!(matches!(error, CatalogError::ValidationError(ValidationError::NoImages(_))));
        assert!(matches!(check_image_folder(&dir.path().join("nope")), Err(ValidationError::ImageFolderNotFound(_))));
    }

    #[test]
    fn output_dir_may_be_created_later() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_output_dir(&dir.path().join("new")).is_ok());
        let file = dir.path().join("file");
        fs::write(&file, "").unwrap();
        assert!(matches!(check_output_dir(&file), Err(ValidationError::OutputNotDirectory(_))));
    }
}
