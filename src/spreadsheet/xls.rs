use crate::error::CatalogError;
use crate::error::ResultOptionChain;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::CompoundFile;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use thiserror::Error;

// BIFF8 record types
const FORMULA: u16 = 6;
const EOF: u16 = 10;
const DATE1904: u16 = 34;
const FILE_PASS: u16 = 47;
const CODE_PAGE: u16 = 66;
const BOUND_SHEET8: u16 = 133;
const MUL_RK: u16 = 189;
const XF: u16 = 224;
const SST: u16 = 252;
const LABEL_SST: u16 = 253;
const NUMBER: u16 = 515;
const LABEL: u16 = 516;
const BOOL_ERR: u16 = 517;
const STRING: u16 = 519;
const ARRAY: u16 = 545;
const TABLE: u16 = 566;
const RK: u16 = 638;
const FORMAT: u16 = 1054;
const SHR_FMLA: u16 = 1212;
const BOF: u16 = 2057;

#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Invalid Code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid Formula value '{0}'")]
    FormulaValueError(u64),
}

/// Either a fixed cell type or an index into the XF table.
type CellRecord = (Either<CellType, usize>, String);

/// Legacy `.xls` (BIFF8) workbook. The globals substream is parsed on open;
/// sheets are read on demand from their stream offsets.
pub(crate) struct XlsSpreadsheet {
    /// File name of the workbook, used in error messages
    pub(crate) name: String,
    /// Record reader over the whole `Workbook` stream
    reader: Biff8Reader,
    /// Shared string table from the SST record, handed out once
    shared_strings: Vec<String>,
    /// Cell type per XF index
    number_formats: Vec<CellType>,
    /// Worksheets as (name, BOF offset in the stream) pairs
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Opens a BIFF8 workbook and parses its globals substream
    ///
    /// The globals carry the code page, the date system, number formats, the
    /// shared string table and the sheet directory. Chart, macro and dialog
    /// sheets are dropped from the directory.
    ///
    /// # Arguments
    /// * `file_name` - Path to the `.xls` file
    ///
    /// # Returns
    /// The opened workbook, or an error when the file is not a compound file,
    /// has no `Workbook`/`Book` stream, is encrypted or has no worksheet
    pub(crate) fn open(file_name: &str) -> Result<XlsSpreadsheet, CatalogError> {
        let mut buf_reader = BufReader::new(File::open(file_name)?);
        let cfb = CompoundFile::open(&mut buf_reader)?;
        let mut reader = cfb.stream("Workbook")
            .ok_none_else(|| cfb.stream("Book"))?
            .map(Biff8Reader::new)
            .ok_or_else(|| SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?;
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats = HashMap::<String, CellType>::new();
        let mut format_ids = Vec::<String>::new();
        let mut sheets = Vec::<(String, usize)>::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?,
            DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_string()?;
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
            XF => {
                reader.skip(2)?;
                format_ids.push(reader.read_u16()?.to_string());
            }
            SST => shared_strings = read_shared_string_table(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                // Visibility and sheet type; charts and macro sheets share the list.
                let kind = reader.read_u16()? >> 8;
                let sheet_name = reader.read_short_string()?;
                if kind == 0 {
                    sheets.push((sheet_name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
        }

        Ok(XlsSpreadsheet {
            name: file_name.to_owned(),
            reader,
            shared_strings,
            number_formats: load_number_formats(&format_ids, &custom_formats, is_1904),
            sheets,
        })
    }

    /// Resolves a record's cell type, looking XF indexes up in the number formats.
    fn kind_of(&self, either: Either<CellType, usize>) -> CellType {
        match either {
            Either::Left(kind) => kind,
            Either::Right(index) => self.number_formats.get(index).copied().unwrap_or(CellType::Number),
        }
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn name(&self) -> String {
        self.name.clone()
    }

    /// Hands out the SST parsed on open. A second call returns an empty table.
    fn load_shared_strings(&mut self) -> Result<Vec<String>, CatalogError> {
        Ok(std::mem::take(&mut self.shared_strings))
    }

    /// Reads the worksheets accepted by `criteria`
    ///
    /// Each sheet substream is entered at its BOF offset and scanned up to its
    /// EOF record. Only value records are decoded: NUMBER, RK, MULRK, LABEL,
    /// LABELSST, BOOLERR and cached FORMULA results.
    ///
    /// # Arguments
    /// * `criteria` - Sheet name pattern, cell range and empty-row handling
    ///
    /// # Returns
    /// One [`Sheet`] per accepted worksheet, in workbook order. An error cell
    /// inside the range fails the read unless `error_as_null` is set
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, CatalogError> {
        let mut sheets = Vec::<Sheet>::new();
        for (sheet_name, pointer) in self.sheets.clone() {
            if !criteria.wants_more(sheets.len()) {
                break;
            } else if !criteria.accept(&sheet_name) {
                continue;
            }

            self.reader.goto(pointer);
            self.reader.next()?;
            let mut sheet = Sheet::new(&self.name, &sheet_name, criteria);
            'records: while let Some(tag) = self.reader.next()? {
                match tag {
                    BOF | EOF => break,
                    MUL_RK => {
                        let row = self.reader.read_u16()? as usize;
                        let col_lower_bound = self.reader.read_u16()? as usize;
                        let col_upper_bound = self.reader.last_u16()? as usize;
                        for col in col_lower_bound..=col_upper_bound {
                            if sheet.after_row_upper_bound(row) || sheet.ends_before(row) {
                                break 'records;
                            } else if sheet.contains(row, col) {
                                let index = self.reader.read_u16()? as usize;
                                let value = self.reader.read_rk_number()?.to_string();
                                let kind = self.kind_of(Either::Right(index));
                                sheet.push(Cell { row, col, kind, value });
                            } else {
                                // ixfe + RK value
                                self.reader.skip(6)?;
                            }
                        }
                    }
                    BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                        let row = self.reader.read_u16()? as usize;
                        let col = self.reader.read_u16()? as usize;
                        if sheet.after_row_upper_bound(row) || sheet.ends_before(row) {
                            break;
                        } else if !sheet.contains(row, col) {
                            continue;
                        }
                        let (either, value) = match tag {
                            BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                            NUMBER => read_number_cell(&mut self.reader)?,
                            RK => read_rk_cell(&mut self.reader)?,
                            LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                            LABEL => read_label_cell(&mut self.reader)?,
                            _ => read_formula_cell(&mut self.reader)?,
                        };
                        let kind = self.kind_of(either);
                        if kind != CellType::Error {
                            if !value.is_empty() {
                                sheet.push(Cell { row, col, kind, value });
                            }
                        } else if !criteria.error_as_null {
                            Err(SpreadsheetError::CellValueError(
                                sheet.file_name.to_owned(),
                                sheet.name.to_owned(),
                                index_to_reference(row, col),
                                value,
                            ))?
                        }
                    }
                    _ => (),
                }
            }
            sheets.push(sheet);
        }
        Ok(sheets)
    }
}

/// Reads the SST record body: two counts, then the unique strings.
fn read_shared_string_table(reader: &mut Biff8Reader) -> Result<Vec<String>, CatalogError> {
    // Total reference count, then the number of unique strings.
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings = Vec::with_capacity(count.min(65_536));
    for _ in 0..count {
        shared_strings.push(reader.read_rich_string()?);
    }
    Ok(shared_strings)
}

/// BOOLERR: a boolean, or an error code when the second flag byte is set.
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<CellRecord, CatalogError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    if reader.read_u8()? == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<CellRecord, CatalogError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<CellRecord, CatalogError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<CellRecord, CatalogError> {
    reader.skip(2)?;
    let value = reader.read_usize()?;
    Ok((Either::Left(CellType::SharedString), value.to_string()))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<CellRecord, CatalogError> {
    reader.skip(2)?;
    let value = reader.read_string()?;
    Ok((Either::Left(CellType::InlineString), value))
}

/// Cached formula result. String results live in the STRING record that follows,
/// possibly after shared-formula, array or table records.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<CellRecord, CatalogError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    if formula & 0xFFFF_0000_0000_0000 != 0xFFFF_0000_0000_0000 {
        return Ok((Either::Right(index), f64::from_bits(formula).to_string()));
    }
    match formula & 0xFF {
        0 => loop {
            match reader.next()? {
                Some(STRING) => return Ok((Either::Left(CellType::InlineString), reader.read_string()?)),
                Some(SHR_FMLA | ARRAY | TABLE) => continue,
                _ => Err(XlsError::FormulaValueError(formula))?,
            }
        },
        1 => {
            let value = if formula & 0xFF_0000 > 0 { "1" } else { "0" };
            Ok((Either::Left(CellType::Boolean), value.to_owned()))
        }
        2 => {
            let code = ((formula >> 16) & 0xFF) as u8;
            Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
        }
        3 => Ok((Either::Left(CellType::InlineString), String::new())),
        _ => Err(XlsError::FormulaValueError(formula))?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableOptions;
    use crate::table::Table;
    use crate::table::Value;

    fn record(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&kind.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn reads_cached_formula_results() -> Result<(), CatalogError> {
        let mut stream = Vec::new();
        // ixfe, then a cached string marker, then the STRING record.
        let mut formula = vec![0u8, 0];
        formula.extend_from_slice(&0xFFFF_0000_0000_0000u64.to_le_bytes());
        stream.extend(record(FORMULA, &formula));
        stream.extend(record(STRING, &[4, 0, 0, b'L', b'a', b'n', b'a']));

        let mut reader = Biff8Reader::new(stream);
        assert_eq!(reader.next()?, Some(FORMULA));
        let (either, value) = read_formula_cell(&mut reader)?;
        assert_eq!(either, Either::Left(CellType::InlineString));
        assert_eq!(value, "Lana");
        Ok(())
    }

    #[test]
    fn reads_numeric_formula_results() -> Result<(), CatalogError> {
        let mut payload = vec![3u8, 0];
        payload.extend_from_slice(&140.5f64.to_le_bytes());
        let mut reader = Biff8Reader::new(record(FORMULA, &payload));
        reader.next()?;
        let (either, value) = read_formula_cell(&mut reader)?;
        assert_eq!(either, Either::Right(3));
        assert_eq!(value, "140.5");
        Ok(())
    }

    const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
    const FREE_SECTOR: u32 = 0xFFFF_FFFF;

    fn directory_entry(slot: &mut [u8], name: &str, start: u32, size: usize) {
        for (index, unit) in name.encode_utf16().enumerate() {
            slot[index * 2..index * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        slot[64..66].copy_from_slice(&((name.len() as u16 + 1) * 2).to_le_bytes());
        slot[116..120].copy_from_slice(&start.to_le_bytes());
        slot[120..128].copy_from_slice(&(size as u64).to_le_bytes());
    }

    /// Version 3 compound file: header, one FAT sector, one directory sector,
    /// then the `Workbook` stream padded past the mini stream cutoff.
    fn compound_file(workbook: &[u8]) -> Vec<u8> {
        let mut stream = workbook.to_vec();
        stream.resize(stream.len().max(4096).next_multiple_of(512), 0);
        let last = 1 + stream.len() / 512;

        let mut header = vec![0u8; 512];
        header[0..8].copy_from_slice(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
        header[24..26].copy_from_slice(&0x3Eu16.to_le_bytes());
        header[26..28].copy_from_slice(&3u16.to_le_bytes());
        header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
        header[30..32].copy_from_slice(&9u16.to_le_bytes());
        header[32..34].copy_from_slice(&6u16.to_le_bytes());
        header[44..48].copy_from_slice(&1u32.to_le_bytes());
        header[48..52].copy_from_slice(&1u32.to_le_bytes());
        header[56..60].copy_from_slice(&4096u32.to_le_bytes());
        header[60..64].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        header[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        for slot in header[76..].chunks_exact_mut(4) {
            slot.copy_from_slice(&FREE_SECTOR.to_le_bytes());
        }
        header[76..80].copy_from_slice(&0u32.to_le_bytes());

        // Sector 0 holds the FAT itself, sector 1 the directory.
        let mut fat = vec![FREE_SECTOR; 128];
        fat[0] = 0xFFFF_FFFD;
        fat[1] = END_OF_CHAIN;
        for sector in 2..=last {
            fat[sector] = if sector == last { END_OF_CHAIN } else { sector as u32 + 1 };
        }

        let mut directory = vec![0u8; 512];
        directory_entry(&mut directory[0..128], "Root Entry", END_OF_CHAIN, 0);
        directory_entry(&mut directory[128..256], "Workbook", 2, stream.len());

        let mut file = header;
        file.extend(fat.iter().flat_map(|id| id.to_le_bytes()));
        file.extend(directory);
        file.extend(stream);
        file
    }

    fn bof(kind: u8) -> Vec<u8> {
        let mut payload = vec![0x00, 0x06, kind, 0x00];
        payload.resize(16, 0);
        record(BOF, &payload)
    }

    fn bound_sheet(pointer: usize, kind: u8, name: &str) -> Vec<u8> {
        let mut payload = (pointer as u32).to_le_bytes().to_vec();
        payload.extend([0, kind, name.len() as u8, 0]);
        payload.extend(name.bytes());
        record(BOUND_SHEET8, &payload)
    }

    fn cell(kind: u16, row: u16, col: u16, value: &[u8]) -> Vec<u8> {
        let mut payload = row.to_le_bytes().to_vec();
        payload.extend(col.to_le_bytes());
        // ixfe 0
        payload.extend([0, 0]);
        payload.extend(value);
        record(kind, &payload)
    }

    fn workbook() -> Vec<u8> {
        let mut sst = 2u32.to_le_bytes().to_vec();
        sst.extend(2u32.to_le_bytes());
        sst.extend([4, 0, 0, b'F', b'O', b'T', b'O']);
        sst.extend([4, 0, 0, b'P', b'E', b'S', b'O']);
        let globals = |pointer: usize| {
            [bof(0x05), record(SST, &sst), bound_sheet(pointer, 2, "Grafico"), bound_sheet(pointer, 0, "Foglio1"), record(EOF, &[])]
                .concat()
        };
        let sheet = [
            bof(0x10),
            cell(LABEL_SST, 0, 0, &0u32.to_le_bytes()),
            cell(LABEL_SST, 0, 2, &1u32.to_le_bytes()),
            cell(LABEL, 1, 0, &[2, 0, 0, b'L', b'1']),
            cell(RK, 1, 2, &((140u32 << 2) | 0x02).to_le_bytes()),
            cell(NUMBER, 2, 1, &12.5f64.to_le_bytes()),
            record(EOF, &[]),
        ]
        .concat();
        let pointer = globals(0).len();
        [globals(pointer), sheet].concat()
    }

    #[test]
    fn reads_workbook_from_compound_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campioni.xls");
        std::fs::write(&path, compound_file(&workbook())).unwrap();

        let spreadsheet = XlsSpreadsheet::open(&path.to_string_lossy()).unwrap();
        assert_eq!(spreadsheet.sheets.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(), vec!["Foglio1"]);

        let table = Table::read(&path, &TableOptions::default()).unwrap();
        assert_eq!(table.columns(), &["FOTO", "column2", "PESO"]);
        assert_eq!(table.rows()[0].values(), &[Value::text("L1"), Value::Empty, Value::Number(140.0)]);
        assert_eq!(table.rows()[1].values(), &[Value::Empty, Value::Number(12.5), Value::Empty]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn refuses_encrypted_workbooks() {
        let stream = [bof(0x05), record(FILE_PASS, &[0, 0]), record(EOF, &[])].concat();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campioni.xls");
        std::fs::write(&path, compound_file(&stream)).unwrap();
        let error = XlsSpreadsheet::open(&path.to_string_lossy()).err().map(|error| error.to_string());
        assert!(error.is_some_and(|message| message.ends_with("is password protected")));
    }
}
