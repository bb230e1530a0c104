//! Pieces shared by the OOXML workbook readers.
use crate::error::CatalogError;
use crate::helpers::cfb::CompoundFile;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use zip::ZipArchive;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub(super) type Package = ZipArchive<BufReader<File>>;

/// Workbook sheets as `(name, part path)` pairs, plus the 1904 date flag.
pub(super) type Workbook = (Vec<(String, String)>, bool);

/// Opens an OOXML package, rejecting encrypted workbooks and workbooks without sheets.
pub(super) fn open<W, F>(file_name: &str, load_workbook: W, load_number_formats: F) -> Result<(Package, Vec<CellType>, Vec<(String, String)>), CatalogError>
where
    W: Fn(&mut Package) -> Result<Workbook, CatalogError>,
    F: Fn(&mut Package, bool) -> Result<Vec<CellType>, CatalogError>,
{
    let mut reader = BufReader::new(File::open(file_name)?);
    if is_password_protected(&mut reader)? {
        Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?;
    }

    let mut zip = ZipArchive::new(reader)?;
    let (sheets, is_1904) = load_workbook(&mut zip)?;
    if sheets.is_empty() {
        Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
    }

    let number_formats = load_number_formats(&mut zip, is_1904)?;
    Ok((zip, number_formats, sheets))
}

/// Worksheet relationship ids mapped to their part paths.
pub(super) fn load_relationships(zip: &mut Package, path: &str) -> Result<HashMap<String, String>, CatalogError> {
    let mut reader = zip.xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::FileError(path.to_owned()))?;
    let mut relationships = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let kind = event.get_attribute_value("Type")?;
            if kind.is_none_or(|kind| kind.ends_with("/worksheet")) {
                let id = event.get_attribute_value("Id")?;
                let target = event.get_attribute_value("Target")?;
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.into_owned(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Resolves each `cellXfs` entry to a cell type, custom formats first.
pub(super) fn load_number_formats(format_ids: &[String], custom_formats: &HashMap<String, CellType>, is_1904: bool) -> Vec<CellType> {
    format_ids
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Relationship targets may be absolute (`/xl/...`) or relative to `xl/`.
pub(crate) fn to_zip_path(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix('/') {
        stripped.to_owned()
    } else if path.starts_with("xl/") {
        path.to_owned()
    } else {
        format!("xl/{path}")
    }
}

/// Encrypted OOXML is stored as a compound file holding an `EncryptedPackage` stream.
fn is_password_protected<RS: Read + Seek>(reader: &mut RS) -> Result<bool, CatalogError> {
    let mut signature = [0u8; 8];
    let is_compound = reader.read_exact(&mut signature).is_ok() && signature == OLE_SIGNATURE;
    reader.seek(SeekFrom::Start(0))?;
    let protected = is_compound
        && CompoundFile::open(reader)
            .map(|cfb| cfb.contains("EncryptedPackage"))
            .unwrap_or(false);
    reader.seek(SeekFrom::Start(0))?;
    Ok(protected)
}
