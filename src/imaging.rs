//! Finds each record's photo in the image folder and derives its thumbnail and detail crop.
use crate::config::CropProfile;
use crate::config::ThumbnailConfig;
use crate::error::CatalogError;
use crate::filename::detail_crop_name;
use crate::filename::normalize_image_filename;
use crate::filename::thumbnail_name;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use image::ImageReader;
use log::debug;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Cannot decode '{0}': {1}")]
    DecodeError(String, String),

    #[error("Cannot write '{0}': {1}")]
    WriteError(String, String),
}

/// Regular files directly inside the image folder, indexed by name.
#[derive(Debug, Default)]
pub struct ImageIndex {
    folder: PathBuf,
    exact: HashMap<String, String>,
    folded: HashMap<String, Vec<String>>,
}

impl ImageIndex {
    /// Sub-directories are ignored.
    pub fn scan(folder: &Path) -> Result<ImageIndex, CatalogError> {
        let mut index = ImageIndex {
            folder: folder.to_path_buf(),
            ..ImageIndex::default()
        };
        for entry in std::fs::read_dir(folder)? {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            index.folded.entry(name.to_lowercase()).or_default().push(name.clone());
            index.exact.insert(name.clone(), name);
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    /// Exact name first, then a case-insensitive match if exactly one file has it.
    pub fn lookup(&self, file_name: &str) -> Option<PathBuf> {
        let found = self.exact.get(file_name).or_else(|| match self.folded.get(&file_name.to_lowercase()) {
            Some(names) if names.len() == 1 => names.first(),
            _ => None,
        })?;
        Some(self.folder.join(found))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedImage {
    /// Index of the record in the cleaned table.
    pub row: usize,
    pub key: String,
    pub file_name: String,
    pub source: PathBuf,
    pub thumbnail: PathBuf,
    pub thumbnail_size: (u32, u32),
    pub crop: PathBuf,
    pub crop_name: String,
}

/// What happened to one record's image.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordOutcome {
    Resolved(ResolvedImage),
    Missing { row: usize, key: String, file_name: String },
    LoadError { row: usize, key: String, file_name: String, reason: String },
    /// The image decoded but a derived file could not be written.
    WriteError { row: usize, key: String, file_name: String, reason: String },
}

impl RecordOutcome {
    pub fn row(&self) -> usize {
        match self {
            RecordOutcome::Resolved(resolved) => resolved.row,
            RecordOutcome::Missing { row, .. }
            | RecordOutcome::LoadError { row, .. }
            | RecordOutcome::WriteError { row, .. } => *row,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            RecordOutcome::Resolved(resolved) => &resolved.key,
            RecordOutcome::Missing { key, .. }
            | RecordOutcome::LoadError { key, .. }
            | RecordOutcome::WriteError { key, .. } => key,
        }
    }

    /// Human-readable reason for an unresolved record.
    pub fn reason(&self) -> Option<String> {
        match self {
            RecordOutcome::Resolved(_) => None,
            RecordOutcome::Missing { file_name, .. } => Some(format!("Image '{file_name}' not found")),
            RecordOutcome::LoadError { reason, .. } | RecordOutcome::WriteError { reason, .. } => Some(reason.to_owned()),
        }
    }
}

pub struct ImageProcessor {
    index: ImageIndex,
    thumbnails_dir: PathBuf,
    crops_dir: PathBuf,
    thumbnail: ThumbnailConfig,
    crop: CropProfile,
}

impl ImageProcessor {
    pub fn new(index: ImageIndex, thumbnails_dir: &Path, crops_dir: &Path, thumbnail: &ThumbnailConfig, crop: &CropProfile) -> Self {
        ImageProcessor {
            index,
            thumbnails_dir: thumbnails_dir.to_path_buf(),
            crops_dir: crops_dir.to_path_buf(),
            thumbnail: thumbnail.clone(),
            crop: crop.clone(),
        }
    }

    /// Finds, decodes and transforms the image of one record
    ///
    /// # Arguments
    /// * `row` - Index of the record in the cleaned table, used to name the thumbnail
    /// * `key` - The record's photo key as typed; it is normalized before lookup
    ///
    /// # Returns
    /// [`RecordOutcome::Resolved`] with the thumbnail and crop written, or the
    /// reason the record is skipped. Never fails the run.
    pub fn resolve(&self, row: usize, key: &str) -> RecordOutcome {
        let file_name = normalize_image_filename(key);
        let Some(source) = self.index.lookup(&file_name) else {
            return RecordOutcome::Missing { row, key: key.to_owned(), file_name };
        };
        let image = match decode(&source) {
            Ok(image) => image,
            Err(error) => {
                let reason = ImagingError::DecodeError(file_name.clone(), error.to_string()).to_string();
                return RecordOutcome::LoadError { row, key: key.to_owned(), file_name, reason };
            }
        };
        match self.derive(row, &file_name, &image) {
            Ok((thumbnail, thumbnail_size, crop, crop_name)) => RecordOutcome::Resolved(ResolvedImage {
                row,
                key: key.to_owned(),
                file_name,
                source,
                thumbnail,
                thumbnail_size,
                crop,
                crop_name,
            }),
            Err(error) => RecordOutcome::WriteError { row, key: key.to_owned(), file_name, reason: error.to_string() },
        }
    }

    fn derive(&self, row: usize, file_name: &str, image: &DynamicImage) -> Result<(PathBuf, (u32, u32), PathBuf, String), ImagingError> {
        let rotated = image.rotate90();

        let thumbnail = make_thumbnail(&rotated, &self.thumbnail);
        let thumbnail_path = self.thumbnails_dir.join(thumbnail_name(row, file_name));
        write_jpeg(&thumbnail, self.thumbnail.quality, &thumbnail_path)?;

        let crop = make_detail_crop(&rotated, &self.crop);
        let crop_name = detail_crop_name(file_name);
        let crop_path = self.crops_dir.join(&crop_name);
        write_jpeg(&crop, self.crop.quality, &crop_path)?;

        Ok((thumbnail_path, (thumbnail.width(), thumbnail.height()), crop_path, crop_name))
    }
}

fn decode(path: &Path) -> Result<DynamicImage, CatalogError> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Scales down to fit within `max_width` × `max_height`, keeping the aspect ratio. Never upscales.
pub fn fit_within(image: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    if image.width() <= max_width && image.height() <= max_height {
        image.clone()
    } else {
        image.resize(max_width.max(1), max_height.max(1), FilterType::Lanczos3)
    }
}

/// Expects an already rotated image.
pub fn make_thumbnail(rotated: &DynamicImage, config: &ThumbnailConfig) -> DynamicImage {
    fit_within(rotated, config.max_width, config.max_height)
}

/// Expects an already rotated image.
pub fn make_detail_crop(rotated: &DynamicImage, profile: &CropProfile) -> DynamicImage {
    let (x, y, width, height) = crop_window(rotated.width(), rotated.height(), profile);
    let cropped = rotated.crop_imm(x, y, width, height);
    fit_within(&cropped, profile.max_width, profile.max_height)
}

/// `(x, y, width, height)` of the detail window, clamped to the image.
pub fn crop_window(image_width: u32, image_height: u32, profile: &CropProfile) -> (u32, u32, u32, u32) {
    let width = profile.crop_width.min(image_width);
    let height = profile.crop_height.min(image_height);
    let x = (image_width - width) / 2;
    let centred = ((image_height - height) / 2) as i64 + profile.vertical_shift as i64;
    let y = centred.clamp(0, (image_height - height) as i64) as u32;
    (x, y, width, height)
}

fn write_jpeg(image: &DynamicImage, quality: u8, path: &Path) -> Result<(), ImagingError> {
    let failed = |error: &dyn std::fmt::Display| ImagingError::WriteError(path.display().to_string(), error.to_string());
    let rgb = image.to_rgb8();
    let file = File::create(path).map_err(|e| failed(&e))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| failed(&e))?;
    writer.flush().map_err(|e| failed(&e))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use image::RgbImage;

    fn save_jpeg(dir: &Path, name: &str, width: u32, height: u32) {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        DynamicImage::ImageRgb8(image).save_with_format(dir.join(name), image::ImageFormat::Jpeg).unwrap();
    }

    #[test]
    fn crop_window_follows_camera_profile() {
        let profile = CropProfile::default();
        // 3648 × 4864 portrait source, rotated to landscape.
        assert_eq!(crop_window(4864, 3648, &profile), (1670, 558, 1524, 2132));
        // Smaller images are clamped.
        assert_eq!(crop_window(800, 600, &profile), (0, 0, 800, 600));
        assert_eq!(crop_window(2000, 2200, &profile), (238, 0, 1524, 2132));
    }

    #[test]
    fn fit_within_never_upscales() {
        let small = DynamicImage::new_rgb8(300, 200);
        let fitted = fit_within(&small, 500, 500);
        assert_eq!((fitted.width(), fitted.height()), (300, 200));
        let large = DynamicImage::new_rgb8(1000, 2000);
        let fitted = fit_within(&large, 500, 500);
        assert_eq!((fitted.width(), fitted.height()), (250, 500));
    }

    #[test]
    fn index_lookup_falls_back_to_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("L1.JPG"), b"x").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("A.JPG"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("L2.JPG")).unwrap();
        let index = ImageIndex::scan(dir.path()).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.lookup("L1.JPG"), Some(dir.path().join("L1.JPG")));
        assert_eq!(index.lookup("l1.jpg"), Some(dir.path().join("L1.JPG")));
        assert_eq!(index.lookup("A.jpg"), None);
        assert_eq!(index.lookup("L2.JPG"), None);
    }

    #[test]
    fn resolves_missing_broken_and_valid_images() {
        let images = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        save_jpeg(images.path(), "L1.JPG", 120, 80);
        std::fs::write(images.path().join("L2.JPG"), b"not a jpeg").unwrap();

        let processor = ImageProcessor::new(
            ImageIndex::scan(images.path()).unwrap(),
            output.path(),
            output.path(),
            &ThumbnailConfig { max_width: 50, max_height: 50, quality: 70 },
            &CropProfile { crop_width: 40, crop_height: 60, ..CropProfile::default() },
        );

        match processor.resolve(4, "L1") {
            RecordOutcome::Resolved(resolved) => {
                assert_eq!(resolved.file_name, "L1.JPG");
                assert_eq!(resolved.crop_name, "L1_dettaglio.jpg");
                assert_eq!(resolved.thumbnail, output.path().join("thumb_4_L1.JPG"));
                // 120 × 80 rotated to 80 × 120, then fitted in 50 × 50.
                assert_eq!(resolved.thumbnail_size, (33, 50));
                let crop = image::open(&resolved.crop).unwrap();
                assert_eq!((crop.width(), crop.height()), (40, 60));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(matches!(processor.resolve(5, "L2jpg"), RecordOutcome::LoadError { row: 5, .. }));
        let missing = processor.resolve(6, "L3");
        assert_eq!(missing.reason().as_deref(), Some("Image 'L3.JPG' not found"));
        assert_eq!(missing.key(), "L3");
    }
}
