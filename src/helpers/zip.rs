//! Entry lookup inside the ZIP packages used by `.xlsx` and `.ods`.

use crate::error::CatalogError;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Finds an entry ignoring ASCII case and backslash separators written by some producers.
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, CatalogError>;

    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, CatalogError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, CatalogError> {
        let wanted = name.replace('\\', "/");
        let Some(path) = self
            .file_names()
            .find(|file_name| file_name.replace('\\', "/").eq_ignore_ascii_case(&wanted))
            .map(str::to_owned)
        else {
            return Ok(None);
        };
        match self.by_name(&path) {
            Ok(file) => Ok(Some(file)),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, CatalogError> {
        Ok(self.file(name)?.map(|file| XmlReader::new(BufReader::new(file))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[test]
    fn finds_entries_case_insensitively() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("XL/Workbook.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"<workbook/>").unwrap();
        let cursor = writer.finish().unwrap();

        let mut archive = ZipArchive::new(cursor).unwrap();
        let mut content = String::new();
        archive.file("xl/workbook.xml").unwrap().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "<workbook/>");
        assert!(archive.file("xl\\styles.xml").unwrap().is_none());
    }
}
