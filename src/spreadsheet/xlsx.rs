use crate::error::CatalogError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::excel::Package;
use crate::spreadsheet::excel::Workbook;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::collections::HashMap;
use std::io::BufRead;

const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts");
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");
const TAG_FORMAT_INDEX: QName = QName(b"xf");
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");
// Phonetic guide text, not part of the visible string.
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");
const TAG_TEXT: QName = QName(b"t");
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr");
const TAG_SHEET: QName = QName(b"sheet");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_INLINE_STRING: QName = QName(b"is");
const TAG_VALUE: QName = QName(b"v");

/// `.xlsx` / `.xlsm` workbook.
pub(crate) struct XlsxSpreadsheet {
    /// File name of the workbook, used in error messages
    pub(crate) name: String,
    /// ZIP package holding the workbook parts
    zip: Package,
    /// Cell type per `cellXfs` style index.
    number_formats: Vec<CellType>,
    /// `(sheet name, part path)` in workbook order.
    sheets: Vec<(String, String)>,
}

impl XlsxSpreadsheet {
    /// Opens an XLSX package and parses its workbook and style parts
    ///
    /// Sheet contents are not read here; see [`Spreadsheet::read_sheets`].
    ///
    /// # Arguments
    /// * `file_name` - Path to the `.xlsx` or `.xlsm` file
    ///
    /// # Returns
    /// The opened workbook, or an error when the package is encrypted,
    /// lacks `xl/workbook.xml` or declares no worksheet
    pub(crate) fn open(file_name: &str) -> Result<XlsxSpreadsheet, CatalogError> {
        let (zip, number_formats, sheets) = excel::open(file_name, load_workbook, load_number_formats)?;
        Ok(XlsxSpreadsheet {
            name: file_name.to_owned(),
            zip,
            number_formats,
            sheets,
        })
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    /// Loads `xl/sharedStrings.xml`
    ///
    /// Text cells of type `s` hold an index into this table. Rich text runs are
    /// concatenated and phonetic runs dropped. A package without the part has
    /// no shared strings.
    fn load_shared_strings(&mut self) -> Result<Vec<String>, CatalogError> {
        let mut shared_strings = Vec::new();
        let Some(mut reader) = self.zip.xml_reader("xl/sharedStrings.xml")? else {
            return Ok(shared_strings);
        };
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
                shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
            }
        });
        Ok(shared_strings)
    }

    /// Reads the worksheets accepted by `criteria`
    ///
    /// Cells outside the criteria range are skipped, and reading stops at the
    /// range's last row or, when asked, at the first empty row after the data.
    ///
    /// # Arguments
    /// * `criteria` - Sheet name pattern, cell range and empty-row handling
    ///
    /// # Returns
    /// One [`Sheet`] per accepted worksheet, in workbook order
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, CatalogError> {
        let mut sheets = Vec::<Sheet>::new();
        for (sheet_name, zip_path) in &self.sheets {
            if !criteria.wants_more(sheets.len()) {
                break;
            } else if !criteria.accept(sheet_name) {
                continue;
            }

            let mut sheet = Sheet::new(&self.name, sheet_name, criteria);
            let mut row_count = 0usize;
            let mut col_count = 0usize;
            let mut row = 0usize;
            let mut col = 0usize;
            let mut kind = CellType::default();
            let mut value = String::new();
            let number_formats = &self.number_formats;
            let mut reader = self.zip.xml_reader(zip_path)?
                .ok_or_else(|| SpreadsheetError::FileError(zip_path.to_owned()))?;
            match_xml_events!(reader => {
                Event::End(event) if event.name() == TAG_ROW => {
                    row_count += 1;
                    col_count = 0;
                }
                Event::Start(event) if event.name() == TAG_ROW => {
                    // Sparse rows carry their own 1-based number.
                    if let Some(number) = event.parse_attribute_value::<usize>("r")? {
                        row_count = number.saturating_sub(1);
                    }
                }
                Event::Start(event) if event.name() == TAG_CELL => {
                    (row, col) = event.get_attribute_value("r")?
                        .and_then(|reference| reference_to_index(&reference))
                        .unwrap_or((row_count, col_count));
                    col_count = col + 1;
                    value.clear();
                    if sheet.after_row_upper_bound(row) || sheet.ends_before(row) {
                        break;
                    } else if sheet.contains(row, col) {
                        kind = match event.get_attribute_value("t")?.as_deref() {
                            Some("inlineStr" | "str") => CellType::InlineString,
                            Some("s") => CellType::SharedString,
                            Some("d") => CellType::IsoDateTime,
                            Some("b") => CellType::Boolean,
                            Some("e") if criteria.error_as_null => CellType::Empty,
                            Some("e") => CellType::Error,
                            _ => CellType::Number,
                        };
                        if kind == CellType::Number {
                            if let Some(format_id) = event.get_attribute_value("s")?.filter(|id| !id.is_empty()) {
                                let index = format_id.parse::<usize>()?;
                                kind = number_formats.get(index).copied().unwrap_or(CellType::Number);
                            }
                        }
                    } else {
                        kind = CellType::Empty;
                    }
                }
                Event::Start(event) if kind != CellType::Empty && event.name() == TAG_INLINE_STRING => {
                    value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
                }
                Event::Start(event) if kind != CellType::Empty && event.name() == TAG_VALUE => {
                    value = read_string_value(&mut reader, TAG_VALUE, true)?;
                }
                Event::End(event) if kind != CellType::Empty && event.name() == TAG_CELL => {
                    if kind == CellType::Error {
                        Err(SpreadsheetError::CellValueError(
                            sheet.file_name.to_owned(),
                            sheet.name.to_owned(),
                            index_to_reference(row, col),
                            value.to_owned(),
                        ))?
                    }
                    if !value.is_empty() {
                        sheet.push(Cell { row, col, kind, value: std::mem::take(&mut value) });
                    }
                    kind = CellType::Empty;
                }
            });
            sheets.push(sheet);
        }
        Ok(sheets)
    }
}

/// Loads the worksheet list and date system from `xl/workbook.xml`
///
/// Sheet part paths come from the workbook relationships; sheets whose
/// relationship is missing are left out.
///
/// # Arguments
/// * `zip` - The opened package
///
/// # Returns
/// Tuple of (worksheets, is_1904) where worksheets are (name, part path) pairs
fn load_workbook(zip: &mut Package) -> Result<Workbook, CatalogError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip.xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::FileError("xl/workbook.xml".to_owned()))?;
    let mut sheets = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let name = event.get_attribute_value("name")?;
            let id = event.get_local_attribute_value("id")?;
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(id.as_ref()) {
                    sheets.push((name.into_owned(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .is_some_and(|value| value == "1" || value == "true");
        }
    });
    Ok((sheets, is_1904))
}

/// Loads number formats from `xl/styles.xml`
///
/// Maps every `cellXfs` entry to the cell type its number format implies, so a
/// numeric cell styled as a date reads as a date.
///
/// # Arguments
/// * `zip` - The opened package
/// * `is_1904` - Whether the workbook counts dates from 1904
///
/// # Returns
/// Cell type per style index; empty when the package has no styles part
fn load_number_formats(zip: &mut Package, is_1904: bool) -> Result<Vec<CellType>, CatalogError> {
    let Some(mut reader) = zip.xml_reader("xl/styles.xml")? else {
        return Ok(Vec::new());
    };

    let mut in_custom_formats = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut in_format_indexes = false;
    let mut format_ids = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => in_custom_formats = true,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => in_custom_formats = false,
        Event::Start(event) if in_custom_formats && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                custom_formats.insert(id.into_owned(), CellType::parse_custom_number_format(&format, is_1904));
            }
        }
        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => in_format_indexes = true,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => break,
        Event::Start(event) if in_format_indexes && event.name() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?;
            format_ids.push(id.map(|id| id.into_owned()).unwrap_or_else(|| "0".to_owned()));
        }
    });

    Ok(excel::load_number_formats(&format_ids, &custom_formats, is_1904))
}

/// Collects the text of a string element, skipping phonetic runs.
fn read_string_value<R: BufRead>(reader: &mut XmlReader<R>, end_tag: QName, is_text_content: bool) -> Result<String, CatalogError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_bytes_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_rich_and_phonetic_strings() -> Result<(), CatalogError> {
        let xml = "<si><r><t>Lana </t></r><r><t>&amp; seta</t></r><rPh><t>x</t></rPh></si><si><t>next</t></si>";
        let mut reader = XmlReader::new(xml.as_bytes());
        reader.next()?;
        assert_eq!(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?, "Lana & seta");
        Ok(())
    }
}
