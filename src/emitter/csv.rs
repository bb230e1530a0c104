//! Chunked CSV export in the catalog site's import layout.
use crate::error::CatalogError;
use crate::schema::REQUIRED_FIELDS;
use crate::table::Value;
use csv::WriterBuilder;
use log::debug;
use std::path::Path;
use std::path::PathBuf;

/// Import column and the required field it is filled from, in file order.
pub const CSV_COLUMNS: [(&str, &str); 17] = [
    ("tax:casse", "POSIZIONE"),
    ("tax:categorie", "CATEGORIA"),
    ("cf:foto", "FOTO"),
    ("cf:foto_dettaglio", "FOTO DETTAGLIO"),
    ("tax:composizioni", "COMPOSIZIONE"),
    ("cf:codice", "CODICE TAILOR"),
    ("cf:fornitore", "FORNITORE"),
    ("cf:art_fornitore", "ART. FORNITORE"),
    ("cf:unita_di_misura", "UNITA' DI MISURA"),
    ("cf:altezza", "ALTEZZA"),
    ("cf:peso", "PESO"),
    ("tax:armature", "ARMATURA"),
    ("tax:lavorazioni", "LAVORAZIONE"),
    ("tax:descrizioni", "DESCRIZIONE"),
    ("tax:motivi", "MOTIVO"),
    ("tax:sostenibili", "SOSTENIBILITA'"),
    ("cf:certificazione", "CERTIFICAZIONE"),
];

/// `{prefix}_{k}di{n}.csv`, `k` 1-based.
pub fn chunk_file_name(prefix: &str, chunk: usize, chunks: usize) -> String {
    format!("{prefix}_{chunk}di{chunks}.csv")
}

/// Writes the import CSV in chunks
///
/// # Arguments
/// * `dir` - Output directory
/// * `prefix` - File name prefix, e.g. `import_campioni`
/// * `records` - Values in required-field order, one vector per record
/// * `chunk_size` - Maximum data rows per file
///
/// # Returns
/// Paths of the files written, `<prefix>_<k>di<n>.csv` for k in 1..=n, each
/// with the full header. No records, no files.
pub fn write_chunks(dir: &Path, prefix: &str, records: &[Vec<Value>], chunk_size: usize) -> Result<Vec<PathBuf>, CatalogError> {
    let positions: Vec<usize> = CSV_COLUMNS
        .iter()
        .map(|(_, source)| REQUIRED_FIELDS.iter().position(|field| field == source).expect("every import column has a source field"))
        .collect();
    let header: Vec<&str> = CSV_COLUMNS.iter().map(|(target, _)| *target).collect();

    let chunk_size = chunk_size.max(1);
    let chunks = records.len().div_ceil(chunk_size);
    let mut files = Vec::with_capacity(chunks);
    for (index, chunk) in records.chunks(chunk_size).enumerate() {
        let path = dir.join(chunk_file_name(prefix, index + 1, chunks));
        let mut writer = WriterBuilder::new().from_path(&path)?;
        writer.write_record(&header)?;
        for record in chunk {
            let fields = positions
                .iter()
                .map(|position| record.get(*position).map(Value::to_string).unwrap_or_default());
            writer.write_record(fields)?;
        }
        writer.flush()?;
        debug!("Wrote {} rows to {}", chunk.len(), path.display());
        files.push(path);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use csv::ReaderBuilder;

    fn record(code: usize) -> Vec<Value> {
        REQUIRED_FIELDS
            .iter()
            .map(|field| match *field {
                "CODICE TAILOR" => Value::Number(code as f64),
                "PESO" => Value::Number(140.0),
                "ALTEZZA" => Value::Number(150.5),
                "MOTIVO" => Value::Empty,
                field => Value::text(&format!("{field} {code}")),
            })
            .collect()
    }

    fn read(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = ReaderBuilder::new().from_path(path).unwrap();
        let header = reader.headers().unwrap().iter().map(str::to_owned).collect();
        let rows = reader
            .records()
            .map(|record| record.unwrap().iter().map(str::to_owned).collect())
            .collect();
        (header, rows)
    }

    #[test]
    fn splits_into_headered_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<Vec<Value>> = (0..125).map(record).collect();
        let files = write_chunks(dir.path(), "import_campioni", &records, 60).unwrap();

        let names: Vec<String> = files.iter().map(|path| path.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["import_campioni_1di3.csv", "import_campioni_2di3.csv", "import_campioni_3di3.csv"]);

        let mut codes = Vec::new();
        for (file, expected) in files.iter().zip([60, 60, 5]) {
            let (header, rows) = read(file);
            assert_eq!(header.len(), 17);
            assert_eq!(header[0], "tax:casse");
            assert_eq!(header[16], "cf:certificazione");
            assert_eq!(rows.len(), expected);
            codes.extend(rows.into_iter().map(|row| row[5].clone()));
        }
        let expected: Vec<String> = (0..125).map(|code| code.to_string()).collect();
        assert_eq!(codes, expected);
    }

    #[test]
    fn maps_fields_to_import_columns() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_chunks(dir.path(), "out", &[record(7)], 60).unwrap();
        let (_, rows) = read(&files[0]);
        assert_eq!(rows[0][0], "POSIZIONE 7");
        assert_eq!(rows[0][2], "FOTO 7");
        assert_eq!(rows[0][9], "150.5");
        assert_eq!(rows[0][10], "140");
        assert_eq!(rows[0][14], "");
    }

    #[test]
    fn exact_multiple_and_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<Vec<Value>> = (0..60).map(record).collect();
        let files = write_chunks(dir.path(), "a", &records, 60).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(read(&files[0]).1.len(), 60);

        assert!(write_chunks(dir.path(), "b", &[], 60).unwrap().is_empty());
    }
}
