//! Record reader for the BIFF8 stream inside `.xls` workbooks.
//!
//! A record is a `(type, size)` header followed by its payload; payloads longer
//! than 8224 bytes spill into `CONTINUE` records, which the reader stitches back
//! together so callers see one logical record.

use crate::error::CatalogError;
use crate::helpers::bytes::to_f64;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u32;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use encoding_rs::Encoding;
use thiserror::Error;

const CONTINUE: u16 = 60;

#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining in record")]
    NoEnoughDataError(usize),
}

pub(crate) struct Biff8Reader {
    /// Code page for 8-bit strings, switched by the CODEPAGE record.
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    /// Start of the next record header.
    pointer: usize,
    /// Payload slices `(start, end)` of the current record and its continuations.
    segments: Vec<(usize, usize)>,
    segment: usize,
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: encoding_rs::WINDOWS_1252,
            buffer: data,
            pointer: 0,
            segments: Vec::new(),
            segment: 0,
            offset: 0,
        }
    }

    /// Advances to the next record and returns its type.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, CatalogError> {
        if self.pointer + 4 > self.buffer.len() {
            return Ok(None);
        }
        let kind = self.get_u16_at(self.pointer)?;
        self.segments.clear();
        self.segment = 0;
        self.offset = 0;
        self.push_segment()?;
        while self.pointer + 4 <= self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE {
            self.push_segment()?;
        }
        Ok(Some(kind))
    }

    fn push_segment(&mut self) -> Result<(), CatalogError> {
        let size = self.get_u16_at(self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = (lower + size).min(self.buffer.len());
        self.segments.push((lower, upper));
        self.pointer = upper;
        Ok(())
    }

    /// Jumps to an absolute stream offset, e.g. a sheet's BOF position.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
    }

    /// Reads up to `length` bytes without crossing into the next segment.
    fn read(&mut self, length: usize) -> &[u8] {
        let Some((lower, upper)) = self.segments.get(self.segment).copied() else {
            return &[];
        };
        let source = upper.min(lower + self.offset);
        let target = upper.min(source + length);
        if target == upper {
            self.segment += 1;
            self.offset = 0;
        } else {
            self.offset += target - source;
        }
        &self.buffer[source..target]
    }

    fn read_exact(&mut self, length: usize) -> Result<&[u8], CatalogError> {
        let data = self.read(length);
        if data.len() == length {
            Ok(data)
        } else {
            Err(Biff8Error::NoEnoughDataError(length))?
        }
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), CatalogError> {
        let mut remaining = length;
        while remaining > 0 {
            let read = self.read(remaining).len();
            if read == 0 {
                Err(Biff8Error::NoEnoughDataError(length))?;
            }
            remaining -= read;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, CatalogError> {
        self.read_exact(1).map(|data| data[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, CatalogError> {
        self.read_exact(2).map(to_u16)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, CatalogError> {
        self.read_exact(4).map(to_u32)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, CatalogError> {
        self.read_exact(4).map(to_usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, CatalogError> {
        self.read_exact(8).map(to_u64)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, CatalogError> {
        self.read_exact(8).map(to_f64)
    }

    /// Reads the `u16` that ends the current record (MULRK stores its last column there).
    pub(crate) fn last_u16(&self) -> Result<u16, CatalogError> {
        match self.segments.last() {
            Some((lower, upper)) if *upper >= *lower + 2 => self.get_u16_at(*upper - 2),
            _ => Err(Biff8Error::NoEnoughDataError(2))?,
        }
    }

    fn get_u16_at(&self, index: usize) -> Result<u16, CatalogError> {
        if index + 2 <= self.buffer.len() {
            Ok(to_u16(&self.buffer[index..index + 2]))
        } else {
            Err(Biff8Error::NoEnoughDataError(2))?
        }
    }

    /// Decodes an RK value: a 30-bit integer or the high bits of an f64, optionally divided by 100.
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, CatalogError> {
        let raw = self.read_u32()?;
        let mut value = if raw & 0x02 != 0 {
            ((raw as i32) >> 2) as f64
        } else {
            f64::from_bits(((raw & 0xFFFF_FFFC) as u64) << 32)
        };
        if raw & 0x01 != 0 {
            value /= 100.0;
        }
        Ok(value)
    }

    /// ShortXLUnicodeString: 1-byte character count.
    pub(crate) fn read_short_string(&mut self) -> Result<String, CatalogError> {
        let chars = self.read_u8()? as usize;
        let mut string = String::new();
        self.read_chars_into(chars, false, &mut string)?;
        Ok(string)
    }

    /// XLUnicodeString: 2-byte character count.
    pub(crate) fn read_string(&mut self) -> Result<String, CatalogError> {
        let chars = self.read_u16()? as usize;
        let mut string = String::new();
        self.read_chars_into(chars, false, &mut string)?;
        Ok(string)
    }

    /// XLUnicodeRichExtendedString as stored in the SST. A string may be split
    /// across CONTINUE records, each continuation repeating the option byte.
    pub(crate) fn read_rich_string(&mut self) -> Result<String, CatalogError> {
        let mut string = String::new();
        let mut remaining = self.read_u16()? as usize;
        let (read, trailing) = self.read_chars_into(remaining, true, &mut string)?;
        remaining -= read;
        while remaining > 0 {
            let (read, _) = self.read_chars_into(remaining, false, &mut string)?;
            if read == 0 {
                break;
            }
            remaining -= read;
        }
        // Formatting runs and phonetic data follow the last character.
        self.skip(trailing)?;
        Ok(string)
    }

    /// Appends up to `chars` characters and returns how many were read plus the
    /// size of the formatting trailer announced by an extended header.
    fn read_chars_into(&mut self, chars: usize, extended: bool, content: &mut String) -> Result<(usize, usize), CatalogError> {
        let flags = self.read_u8()?;
        let wide = flags & 0x01 != 0;
        let runs = if extended && flags & 0x08 != 0 { self.read_u16()? as usize } else { 0 };
        let phonetic = if extended && flags & 0x04 != 0 { self.read_usize()? } else { 0 };

        let encoding = self.encoding;
        let wanted = if wide { chars * 2 } else { chars };
        let bytes = self.read(wanted);
        let read = if wide { bytes.len() / 2 } else { bytes.len() };
        if wide {
            let (text, _, _) = encoding_rs::UTF_16LE.decode(bytes);
            content.push_str(&text);
        } else if encoding == encoding_rs::UTF_16LE {
            // Compressed UTF-16: every byte is the low half of a code point.
            content.extend(bytes.iter().map(|byte| *byte as char));
        } else {
            let (text, _, _) = encoding.decode(bytes);
            content.push_str(&text);
        }
        Ok((read, 4 * runs + phonetic))
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = kind.to_le_bytes().to_vec();
        bytes.extend((payload.len() as u16).to_le_bytes());
        bytes.extend(payload);
        bytes
    }

    #[test]
    fn decodes_rk_numbers() {
        let mut data = record(638, &[]);
        // integer 120, then 1.5 scaled by 100
        let integer: u32 = (120 << 2) | 0x02;
        let float: u32 = ((150f64.to_bits() >> 32) as u32 & 0xFFFF_FFFC) | 0x01;
        let mut payload = integer.to_le_bytes().to_vec();
        payload.extend(float.to_le_bytes());
        data = [data, record(638, &payload)].concat();

        let mut reader = Biff8Reader::new(data);
        assert_eq!(reader.next().unwrap(), Some(638));
        assert_eq!(reader.next().unwrap(), Some(638));
        assert_eq!(reader.read_rk_number().unwrap(), 120.0);
        assert_eq!(reader.read_rk_number().unwrap(), 1.5);
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn joins_continue_records() {
        // "FOTO" split as "FO" + continuation with its own option byte + "TO"
        let mut first = 4u16.to_le_bytes().to_vec();
        first.extend([0x00, b'F', b'O']);
        let data = [record(252, &first), record(CONTINUE, &[0x00, b'T', b'O'])].concat();

        let mut reader = Biff8Reader::new(data);
        assert_eq!(reader.next().unwrap(), Some(252));
        assert_eq!(reader.read_rich_string().unwrap(), "FOTO");
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn reports_truncated_payload() {
        let mut reader = Biff8Reader::new(record(515, &[1, 0]));
        reader.next().unwrap();
        assert!(reader.read_u32().is_err());
    }
}
