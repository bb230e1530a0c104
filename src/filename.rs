//! Canonical image file names derived from the photo key typed into the table.

/// Recognised image extensions. Longer tokens come first so `jpeg` is not read as `…jp` + `eg`.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpeg", "tiff", "jpg", "png", "gif", "bmp"];

const DEFAULT_EXTENSION: &str = "JPG";

/// Turns a user-entered photo reference into `name.EXT`.
///
/// The extension keeps the case it was typed with, so the result is a fixed
/// point: normalizing it again returns it unchanged.
///
/// * `L1170719.JPG` → `L1170719.JPG`
/// * `L1170719jpg` → `L1170719.jpg` (`jpeg` glued to the name becomes `jpg`)
/// * `L1170719` → `L1170719.JPG`
/// * blank → blank
pub fn normalize_image_filename(raw: &str) -> String {
    let name = raw.trim();
    if name.is_empty() {
        return String::new();
    }

    if let Some((_, extension)) = name.rsplit_once('.') {
        if is_image_extension(extension) {
            return name.to_owned();
        }
    }

    for extension in IMAGE_EXTENSIONS {
        let Some(split) = name.len().checked_sub(extension.len()) else {
            continue;
        };
        if split == 0 || !name.is_char_boundary(split) {
            continue;
        }
        let (base, given) = name.split_at(split);
        if given.eq_ignore_ascii_case(extension) {
            let mut given = given.to_owned();
            if extension == "jpeg" {
                given.remove(2);
            }
            return format!("{base}.{given}");
        }
    }

    format!("{name}.{DEFAULT_EXTENSION}")
}

pub fn is_image_extension(extension: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(extension))
}

/// File name without its last extension.
pub fn stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// `crops/<stem>_dettaglio.jpg` entry name for a normalised image file name.
pub fn detail_crop_name(file_name: &str) -> String {
    format!("{}_dettaglio.jpg", stem(file_name))
}

/// Thumbnail work file for the record at `row` of the cleaned table. Thumbnails
/// are always JPEG, so non-JPEG sources get a `.jpg` extension.
pub fn thumbnail_name(row: usize, file_name: &str) -> String {
    let is_jpeg = file_name
        .rsplit_once('.')
        .is_some_and(|(_, extension)| extension.eq_ignore_ascii_case("jpg") || extension.eq_ignore_ascii_case("jpeg"));
    if is_jpeg {
        format!("thumb_{row}_{file_name}")
    } else {
        format!("thumb_{row}_{}.jpg", stem(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_camera_names() {
        assert_eq!(normalize_image_filename("L1170719.JPG"), "L1170719.JPG");
        assert_eq!(normalize_image_filename("L1170719JPG"), "L1170719.JPG");
        assert_eq!(normalize_image_filename("L1170719jpg"), "L1170719.jpg");
        assert_eq!(normalize_image_filename("L1170719"), "L1170719.JPG");
    }

    #[test]
    fn handles_other_extensions() {
        assert_eq!(normalize_image_filename(" scan.png "), "scan.png");
        assert_eq!(normalize_image_filename("scan.jpeg"), "scan.jpeg");
        assert_eq!(normalize_image_filename("scanjpeg"), "scan.jpg");
        assert_eq!(normalize_image_filename("scanJPEG"), "scan.JPG");
        assert_eq!(normalize_image_filename("scanTiff"), "scan.Tiff");
        assert_eq!(normalize_image_filename("v1.2"), "v1.2.JPG");
        assert_eq!(normalize_image_filename("jpg"), "jpg.JPG");
        assert_eq!(normalize_image_filename("   "), "");
        assert_eq!(normalize_image_filename("tessutò"), "tessutò.JPG");
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        for raw in [
            "L1.jpg", "L1.JPEG", "a.b.png", "L1170719", "x.Gif", "L1170719JPG", "L1170719jpg", "scanjpeg", "scanTiff", "v1.2",
        ] {
            let once = normalize_image_filename(raw);
            assert_eq!(normalize_image_filename(&once), once, "{raw}");
        }
    }

    #[test]
    fn derives_output_names() {
        assert_eq!(detail_crop_name("L1170719.JPG"), "L1170719_dettaglio.jpg");
        assert_eq!(thumbnail_name(3, "L1170719.JPG"), "thumb_3_L1170719.JPG");
        assert_eq!(thumbnail_name(0, "scan.png"), "thumb_0_scan.jpg");
        assert_eq!(stem(".hidden"), ".hidden");
    }
}
