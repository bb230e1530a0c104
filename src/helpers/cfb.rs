//! OLE Compound File Binary container used by legacy `.xls` workbooks
//! and by password-protected OOXML packages.

use crate::error::CatalogError;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use crate::helpers::bytes::to_usize_iter;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;

const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const HEADER_SIZE: usize = 512;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: usize = 4096;
// Ids from this value up mark free sectors or chain ends.
const MAX_REG_SECT: usize = 0xFFFF_FFFB;

#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Sector chain points outside the file at sector {0}")]
    SectorChainError(usize),

    #[error("Empty root directory")]
    RootDirectoryError,
}

/// In-memory view of a compound file: its directory and both allocation tables.
pub(crate) struct CompoundFile {
    entries: HashMap<String, Entry>,
    fat: Vec<usize>,
    sectors: Sectors,
    mini_fat: Vec<usize>,
    mini_sectors: Sectors,
}

impl CompoundFile {
    /// Reads a whole compound file into memory and parses its header, FAT,
    /// directory and mini stream
    ///
    /// # Arguments
    /// * `reader` - Seekable source positioned anywhere; it is rewound first
    ///
    /// # Returns
    /// The parsed container, or a [`CfbError`] when the file is too short,
    /// lacks the OLE signature or has a broken sector chain
    pub(crate) fn open<RS: Read + Seek>(reader: &mut RS) -> Result<CompoundFile, CatalogError> {
        let size = reader.seek(SeekFrom::End(0))? as usize;
        if size < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut data = vec![0u8; size];
        reader.read_exact(&mut data)?;
        Self::parse(data)
    }

    /// Parses an in-memory compound file
    ///
    /// # Arguments
    /// * `data` - The complete file contents
    ///
    /// # Returns
    /// The container with its directory entries keyed by name
    fn parse(data: Vec<u8>) -> Result<CompoundFile, CatalogError> {
        let header = Header::new(&data[..HEADER_SIZE])?;
        let sectors = Sectors { data, size: header.sector_size()?, skip: 1 };
        let fat = load_fat(&sectors, &header)?;
        let entries: HashMap<String, Entry> = read_chain(&fat, &sectors, header.directory_start)?
            .chunks_exact(128)
            .map(Entry::new)
            .collect();
        if entries.is_empty() {
            Err(CfbError::RootDirectoryError)?;
        }

        let mini_fat = if header.mini_fat_count > 0 {
            to_usize_iter(&read_chain(&fat, &sectors, header.mini_fat_start)?).collect()
        } else {
            Vec::new()
        };
        let mini_data = match entries.get("Root Entry") {
            Some(root) => {
                let mut data = read_chain(&fat, &sectors, root.start)?;
                data.truncate(root.size);
                data
            }
            None => Vec::new(),
        };

        Ok(CompoundFile {
            entries,
            fat,
            sectors,
            mini_fat,
            mini_sectors: Sectors { data: mini_data, size: MINI_SECTOR_SIZE, skip: 0 },
        })
    }

    /// Whether the directory has an entry called `name`.
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Reads a whole stream by name, `None` when the directory has no such entry.
    pub(crate) fn stream(&self, name: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(None);
        };
        let mut bytes = if entry.size < MINI_STREAM_CUTOFF {
            read_chain(&self.mini_fat, &self.mini_sectors, entry.start)?
        } else {
            read_chain(&self.fat, &self.sectors, entry.start)?
        };
        bytes.truncate(entry.size);
        Ok(Some(bytes))
    }
}

/// Collects the FAT from the 109 header slots plus the DIFAT sector chain.
fn load_fat(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, CatalogError> {
    let mut difat: Vec<usize> = to_usize_iter(&sectors.data[76..HEADER_SIZE]).collect();
    let mut next = header.difat_start;
    for _ in 0..header.difat_count {
        if next >= MAX_REG_SECT {
            break;
        }
        difat.extend(to_usize_iter(sectors.get(next)?));
        // Last slot of a DIFAT sector links to the next one.
        next = difat.pop().unwrap_or(usize::MAX);
    }

    let mut fat = Vec::new();
    for id in difat.into_iter().filter(|id| *id < MAX_REG_SECT) {
        fat.extend(to_usize_iter(sectors.get(id)?));
    }
    Ok(fat)
}

/// Concatenates the sectors of a chain starting at `start`
///
/// # Arguments
/// * `table` - FAT or mini FAT holding the next-sector links
/// * `sectors` - Regular or mini sectors the ids refer to
/// * `start` - First sector id of the chain
///
/// # Returns
/// The chain's bytes, padded to whole sectors; a loop in the chain is an error
fn read_chain(table: &[usize], sectors: &Sectors, start: usize) -> Result<Vec<u8>, CatalogError> {
    let mut content = Vec::new();
    let mut index = start;
    let mut visited = 0usize;
    while index < MAX_REG_SECT {
        content.extend_from_slice(sectors.get(index)?);
        index = *table.get(index).ok_or(CfbError::SectorChainError(index))?;
        visited += 1;
        if visited > table.len() {
            Err(CfbError::SectorChainError(index))?;
        }
    }
    Ok(content)
}

struct Sectors {
    data: Vec<u8>,
    size: usize,
    // Regular sectors are numbered after the 512-byte header, mini sectors from zero.
    skip: usize,
}

impl Sectors {
    fn get(&self, index: usize) -> Result<&[u8], CfbError> {
        let lower = (index + self.skip) * self.size;
        let upper = self.data.len().min(lower + self.size);
        if lower >= upper {
            return Err(CfbError::SectorChainError(index));
        }
        Ok(&self.data[lower..upper])
    }
}

/// Fields of the 512-byte header the reader needs.
struct Header {
    major_version: u16,
    /// Sector size as a power of two: 9 for version 3, 12 for version 4
    sector_shift: u16,
    directory_start: usize,
    mini_fat_start: usize,
    mini_fat_count: usize,
    difat_start: usize,
    difat_count: usize,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, CatalogError> {
        if to_u64(&data[0..8]) != SIGNATURE {
            Err(CfbError::OleSignatureError)?;
        }
        Ok(Header {
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            directory_start: to_usize(&data[48..52]),
            mini_fat_start: to_usize(&data[60..64]),
            mini_fat_count: to_usize(&data[64..68]),
            difat_start: to_usize(&data[68..72]),
            difat_count: to_usize(&data[72..76]),
        })
    }

    fn sector_size(&self) -> Result<usize, CfbError> {
        match (self.major_version, self.sector_shift) {
            (3, 0x0009) => Ok(512),
            (4, 0x000C) => Ok(4096),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift)),
        }
    }
}

/// A directory entry; names are UTF-16 and at most 31 characters.
struct Entry {
    start: usize,
    size: usize,
}

impl Entry {
    fn new(bytes: &[u8]) -> (String, Entry) {
        let length = (to_u16(&bytes[64..66]) as usize).min(64);
        let (name, _, _) = UTF_16LE.decode(&bytes[..length]);
        let name = name.split('\0').next().unwrap_or_default().to_owned();
        let start = to_usize(&bytes[116..120]);
        let size = to_u64(&bytes[120..128]) as usize;
        (name, Entry { start, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_short_files() {
        let mut reader = Cursor::new(vec![0u8; 100]);
        let error = CompoundFile::open(&mut reader).err().unwrap();
        assert!(matches!(error, CatalogError::CfbHelperError(CfbError::FileFormatError)));
    }

    #[test]
    fn rejects_zip_packages() {
        let mut data = b"PK\x03\x04".to_vec();
        data.resize(1024, 0);
        let error = CompoundFile::open(&mut Cursor::new(data)).err().unwrap();
        assert!(matches!(error, CatalogError::CfbHelperError(CfbError::OleSignatureError)));
    }
}
