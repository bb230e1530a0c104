use crate::error::CatalogError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use thiserror::Error;
use zip::ZipArchive;

const MIME_TYPE: &[u8] = b"application/vnd.oasis.opendocument.spreadsheet";
const SPREADSHEET: QName = QName(b"office:spreadsheet");
const TABLE: QName = QName(b"table:table");
const TABLE_ROW: QName = QName(b"table:table-row");
const TABLE_CELL: QName = QName(b"table:table-cell");
// Cells hidden under a merged range.
const TABLE_COVERED_CELL: QName = QName(b"table:covered-table-cell");
const ANNOTATION: QName = QName(b"office:annotation");
const PARAGRAPH: QName = QName(b"text:p");
// Run of `text:c` spaces.
const SPACES: QName = QName(b"text:s");
const FILE_ENTRY: QName = QName(b"manifest:file-entry");
const ENCRYPTION_DATA: QName = QName(b"manifest:encryption-data");

#[derive(Error, Debug)]
pub enum OdsError {
    #[error("Invalid ODS MIME type")]
    MimeTypeError,
}

/// OpenDocument spreadsheet (`.ods`). Strings are stored inline, so there is no shared string table.
pub(crate) struct OdsSpreadsheet {
    /// File name of the document, used in error messages
    pub(crate) name: String,
    /// ZIP package holding `content.xml` and the manifest
    zip: ZipArchive<BufReader<File>>,
}

impl OdsSpreadsheet {
    /// Opens an OpenDocument spreadsheet package
    ///
    /// # Arguments
    /// * `file_name` - Path to the `.ods` file
    ///
    /// # Returns
    /// The opened document, or an error when the `mimetype` entry names
    /// another document type or the manifest declares encrypted parts
    pub(crate) fn open(file_name: &str) -> Result<Self, CatalogError> {
        let file = File::open(file_name)?;
        let mut zip = ZipArchive::new(BufReader::new(file))?;
        check_mime(&mut zip)?;
        if is_password_protected(&mut zip)? {
            Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?;
        }
        Ok(OdsSpreadsheet {
            name: file_name.to_owned(),
            zip,
        })
    }
}

impl Spreadsheet for OdsSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn load_shared_strings(&mut self) -> Result<Vec<String>, CatalogError> {
        Ok(Vec::new())
    }

    /// Reads the tables accepted by `criteria` from `content.xml`
    ///
    /// Repeated rows and columns are expanded only where they carry a value, so
    /// the trailing filler rows office suites write cost nothing. Paragraphs of
    /// a text cell are joined with newlines and annotations are skipped.
    ///
    /// # Arguments
    /// * `criteria` - Sheet name pattern, cell range and empty-row handling
    ///
    /// # Returns
    /// One [`Sheet`] per accepted table, in document order
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, CatalogError> {
        let mut sheets = Vec::<Sheet>::new();
        let mut sheet_name = String::new();
        let mut reader = self.zip
            .xml_reader("content.xml")?
            .ok_or_else(|| SpreadsheetError::FileError("content.xml".to_owned()))?;
        'sheets: loop {
            let mut found = false;
            match_xml_events!(reader => {
                Event::End(event) if event.name() == SPREADSHEET => break 'sheets,
                Event::Start(event) if event.name() == TABLE => {
                    sheet_name = event.get_attribute_value("table:name")?.unwrap_or_default().into_owned();
                    if !criteria.wants_more(sheets.len()) {
                        break 'sheets;
                    } else if criteria.accept(&sheet_name) {
                        found = true;
                        break;
                    }
                }
            });
            if !found {
                break;
            }

            let mut sheet = Sheet::new(&self.name, &sheet_name, criteria);
            let mut row = 0usize;
            let mut col = 0usize;
            let mut row_count = 1usize;
            let mut col_count = 1usize;
            let mut kind = CellType::default();
            let mut value = String::new();
            // Inside a string cell's paragraphs, and inside a comment within it.
            let mut in_text = false;
            let mut in_annotation = false;
            match_xml_events!(reader => {
                Event::End(event) if event.name() == TABLE => break,
                Event::Start(event) if event.name() == TABLE_ROW => {
                    row_count = event.parse_attribute_value("table:number-rows-repeated")?.unwrap_or(1);
                    col = 0;
                }
                Event::End(event) if event.name() == TABLE_ROW => {
                    row += row_count;
                    if sheet.after_row_upper_bound(row) {
                        break;
                    }
                }
                Event::Start(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                    value.clear();
                    col_count = event.parse_attribute_value("table:number-columns-repeated")?.unwrap_or(1);
                    let value_type = event.get_attribute_value("office:value-type")?;
                    let is_error = event.get_attribute_value("calcext:value-type")?.is_some_and(|it| it == "error");
                    kind = match value_type.as_deref() {
                        None => CellType::Empty,
                        Some("boolean") => CellType::Boolean,
                        Some("date") => CellType::IsoDateTime,
                        Some("time") => CellType::IsoDuration,
                        Some("string") if is_error && criteria.error_as_null => CellType::Empty,
                        Some("string") if is_error => CellType::Error,
                        Some("string") => CellType::InlineString,
                        Some(_) => CellType::Number,
                    };
                    let attribute = match kind {
                        CellType::Boolean => "office:boolean-value",
                        CellType::IsoDateTime => "office:date-value",
                        CellType::IsoDuration => "office:time-value",
                        CellType::Number => "office:value",
                        _ => "",
                    };
                    in_text = matches!(kind, CellType::InlineString | CellType::Error);
                    if !attribute.is_empty() {
                        if let Some(data) = event.get_attribute_value(attribute)? {
                            if kind == CellType::Boolean {
                                value.push(if data == "false" || data == "0" { '0' } else { '1' });
                            } else {
                                value.push_str(&data);
                            }
                        }
                    }
                }
                Event::End(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                    let mut ended = false;
                    if kind != CellType::Empty {
                        'rows: for row_number in row..row + row_count {
                            if sheet.before_row_lower_bound(row_number) {
                                continue;
                            } else if sheet.after_row_upper_bound(row_number) || sheet.ends_before(row_number) {
                                ended = sheet.ends_before(row_number);
                                break;
                            }
                            for col_number in col..col + col_count {
                                if !sheet.contains(row_number, col_number) {
                                    continue;
                                } else if kind == CellType::Error {
                                    Err(SpreadsheetError::CellValueError(
                                        sheet.file_name.to_owned(),
                                        sheet.name.to_owned(),
                                        index_to_reference(row_number, col_number),
                                        value.to_owned(),
                                    ))?
                                } else if value.is_empty() {
                                    break 'rows;
                                }
                                sheet.push(Cell { row: row_number, col: col_number, kind, value: value.to_owned() });
                            }
                        }
                    }
                    if ended {
                        break;
                    }
                    col += col_count;
                    in_text = false;
                    in_annotation = false;
                }
                Event::Start(event) if in_text && event.name() == ANNOTATION => in_annotation = true,
                Event::End(event) if in_text && event.name() == ANNOTATION => in_annotation = false,
                Event::Start(event) if in_text && !in_annotation && event.name() == PARAGRAPH => {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                }
                Event::Start(event) if in_text && !in_annotation && event.name() == SPACES => {
                    let count = event.parse_attribute_value("text:c")?.unwrap_or(1);
                    value.extend(std::iter::repeat_n(' ', count));
                }
                Event::Text(event) if in_text && !in_annotation => value.push_bytes_text(&event)?,
                Event::GeneralRef(event) if in_text && !in_annotation => value.push_bytes_ref(&event)?,
            });
            sheets.push(sheet);
        }
        Ok(sheets)
    }
}

/// A missing `mimetype` entry is tolerated; a different one is not.
fn check_mime(zip: &mut ZipArchive<BufReader<File>>) -> Result<(), CatalogError> {
    if let Some(mut file) = zip.file("mimetype")? {
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        if buffer.trim_ascii() != MIME_TYPE {
            Err(OdsError::MimeTypeError)?;
        }
    }
    Ok(())
}

/// Looks for `manifest:encryption-data` under any file entry of the manifest.
fn is_password_protected(zip: &mut ZipArchive<BufReader<File>>) -> Result<bool, CatalogError> {
    let Some(mut reader) = zip.xml_reader("META-INF/manifest.xml")? else {
        return Ok(false);
    };
    let mut in_file_entry = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == FILE_ENTRY => in_file_entry = true,
        Event::End(event) if event.name() == FILE_ENTRY => in_file_entry = false,
        Event::Start(event) if in_file_entry && event.name() == ENCRYPTION_DATA => return Ok(true),
    });
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableOptions;
    use crate::table::Table;
    use crate::table::Value;
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;
    use zip::ZipWriter;

    const CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0">
<office:body><office:spreadsheet><table:table table:name="Foglio1">
<table:table-row>
<table:table-cell office:value-type="string"><text:p>FOTO</text:p></table:table-cell>
<table:table-cell/>
<table:table-cell office:value-type="string"><text:p>PESO</text:p></table:table-cell>
</table:table-row>
<table:table-row>
<table:table-cell office:value-type="string"><text:p>L1</text:p></table:table-cell>
<table:table-cell/>
<table:table-cell office:value-type="float" office:value="140"/>
</table:table-row>
<table:table-row>
<table:table-cell table:number-columns-repeated="2" office:value-type="string"><text:p>Lana<text:s text:c="2"/>&amp; seta</text:p></table:table-cell>
</table:table-row>
<table:table-row table:number-rows-repeated="1000"><table:table-cell table:number-columns-repeated="3"/></table:table-row>
</table:table></office:spreadsheet></office:body></office:document-content>"#;

    fn write_package(path: &Path, mime: &str, manifest: Option<&str>) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(mime.as_bytes()).unwrap();
        zip.start_file("content.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(CONTENT.as_bytes()).unwrap();
        if let Some(manifest) = manifest {
            zip.start_file("META-INF/manifest.xml", SimpleFileOptions::default()).unwrap();
            zip.write_all(manifest.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn reads_repeated_and_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campioni.ods");
        write_package(&path, "application/vnd.oasis.opendocument.spreadsheet", None);

        let table = Table::read(&path, &TableOptions::default()).unwrap();
        assert_eq!(table.columns(), &["FOTO", "column2", "PESO"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].values(), &[Value::text("L1"), Value::Empty, Value::Number(140.0)]);
        assert_eq!(table.rows()[1].values(), &[Value::text("Lana  & seta"), Value::text("Lana  & seta"), Value::Empty]);
    }

    #[test]
    fn rejects_foreign_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campioni.ods");
        write_package(&path, "application/vnd.oasis.opendocument.text", None);
        assert!(matches!(OdsSpreadsheet::open(&path.to_string_lossy()), Err(CatalogError::OdsError(OdsError::MimeTypeError))));
    }

    #[test]
    fn detects_encrypted_package() {
        let manifest = r#"<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0">
<manifest:file-entry manifest:full-path="content.xml"><manifest:encryption-data manifest:checksum-type="SHA1/1K"/></manifest:file-entry>
</manifest:manifest>"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campioni.ods");
        write_package(&path, "application/vnd.oasis.opendocument.spreadsheet", Some(manifest));
        let error = OdsSpreadsheet::open(&path.to_string_lossy()).err().map(|error| error.to_string());
        assert!(error.is_some_and(|message| message.ends_with("is password protected")));
    }
}
