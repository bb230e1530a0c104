//! Run configuration.
//!
//! Every value has a default reproducing the catalog tool's fixed behaviour, so
//! a JSON file only needs the settings it changes:
//!
//! ```json
//! { "crop": { "crop_width": 1200, "crop_height": 1800 }, "output": { "csv_chunk_size": 100 } }
//! ```
use crate::error::CatalogError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::range::Range;
use glob::Pattern;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub table: TableOptions,
    pub schema: SchemaConfig,
    pub thumbnail: ThumbnailConfig,
    pub crop: CropProfile,
    pub output: OutputConfig,
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<(), CatalogError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Which part of the workbook holds the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Glob on sheet names; the first matching sheet is read. `None` reads the first sheet.
    pub sheet: Option<String>,
    /// Cell range such as `A3:` whose first row is the header row.
    pub range: Option<String>,
    pub skip_empty_rows: bool,
    /// Stop at the first blank row after the data.
    pub end_at_empty_row: bool,
    /// Read error cells (`#N/A`, `#REF!`) as empty values instead of failing.
    pub error_as_null: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            sheet: None,
            range: None,
            skip_empty_rows: true,
            end_at_empty_row: false,
            error_as_null: true,
        }
    }
}

impl TableOptions {
    pub(crate) fn criteria(&self) -> Result<Criteria, CatalogError> {
        let sheet_name_patterns = match &self.sheet {
            Some(sheet) => Some(vec![Pattern::new(sheet)?]),
            None => None,
        };
        let range = match &self.range {
            Some(range) => Some(Range::try_from(range.as_str())?),
            None => None,
        };
        Ok(Criteria {
            sheet_name_patterns,
            sheet_limit: Some(1),
            range,
            error_as_null: self.error_as_null,
            skip_empty_rows: self.skip_empty_rows,
            end_at_empty_row: self.end_at_empty_row,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Minimum `shorter / longer` length ratio for a containment match.
    pub fuzzy_threshold: f64,
    /// Fail when two required fields resolve to the same header.
    pub strict_columns: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        SchemaConfig {
            fuzzy_threshold: 0.70,
            strict_columns: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        ThumbnailConfig {
            max_width: 500,
            max_height: 500,
            quality: 70,
        }
    }
}

/// Detail-crop geometry for one camera. The window is centred on the rotated
/// image and moved by `vertical_shift` pixels (negative is up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropProfile {
    pub crop_width: u32,
    pub crop_height: u32,
    pub vertical_shift: i32,
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl CropProfile {
    const MARGIN: u32 = 300;

    /// Profile for a sensor of `width` × `height` pixels: half of each side less a 300 px margin.
    pub fn for_camera(width: u32, height: u32) -> Self {
        CropProfile {
            crop_width: (width / 2).saturating_sub(Self::MARGIN).max(1),
            crop_height: (height / 2).saturating_sub(Self::MARGIN).max(1),
            vertical_shift: -200,
            max_width: 1000,
            max_height: 1000,
            quality: 80,
        }
    }
}

impl Default for CropProfile {
    fn default() -> Self {
        CropProfile::for_camera(3648, 4864)
    }
}

/// Artifact names inside the output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub workbook_name: String,
    pub sheet_name: String,
    pub crops_dir: String,
    pub thumbnails_dir: String,
    pub csv_prefix: String,
    pub csv_chunk_size: usize,
    /// Scale of the thumbnails shown in the preview workbook.
    pub preview_scale: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            workbook_name: "anteprime_excel.xlsx".to_owned(),
            sheet_name: "Anteprime".to_owned(),
            crops_dir: "crops".to_owned(),
            thumbnails_dir: ".thumbnails".to_owned(),
            csv_prefix: "import_campioni".to_owned(),
            csv_chunk_size: 60,
            preview_scale: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_crop_matches_camera() {
        let crop = CropProfile::default();
        assert_eq!((crop.crop_width, crop.crop_height), (1524, 2132));
        assert_eq!(crop.vertical_shift, -200);
        assert_eq!((crop.max_width, crop.max_height, crop.quality), (1000, 1000, 80));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"output": {"csv_chunk_size": 100}, "table": {"range": "A3:"}}"#).unwrap();
        assert_eq!(config.output.csv_chunk_size, 100);
        assert_eq!(config.output.workbook_name, "anteprime_excel.xlsx");
        assert_eq!(config.thumbnail, ThumbnailConfig::default());
        assert!(config.table.skip_empty_rows);

        let criteria = config.table.criteria().unwrap();
        assert_eq!(criteria.range.and_then(|range| range.row_lower_bound), Some(2));
        assert_eq!(criteria.sheet_limit, Some(1));
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = PipelineConfig::default();
        config.table.sheet = Some("Campioni*".to_owned());
        config.to_json_file(&path).unwrap();
        assert_eq!(PipelineConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn rejects_bad_range() {
        let options = TableOptions { range: Some("A1-B2".to_owned()), ..TableOptions::default() };
        assert!(options.criteria().is_err());
    }
}
