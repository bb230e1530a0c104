use thiserror::Error;

/// Main error type for the catalog pipeline.
/// Aggregates errors from the standard library, third-party codecs, and internal modules.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    CsvError(#[from] csv::Error),

    #[error("{0}")]
    ImageError(#[from] image::ImageError),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    // Helper module errors
    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    Biff8HelperError(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    OdsError(#[from] crate::spreadsheet::ods::OdsError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),

    #[error("{0}")]
    RangeError(#[from] crate::spreadsheet::range::RangeError),

    // Pipeline errors
    #[error("{0}")]
    ValidationError(#[from] crate::inputs::ValidationError),

    #[error("{0}")]
    SchemaError(#[from] crate::schema::SchemaError),

    #[error("{0}")]
    ImagingError(#[from] crate::imaging::ImagingError),

    #[error("{0}")]
    EmitError(#[from] crate::emitter::EmitError),
}

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}

pub trait ResultMessage {
    /// Prefixes the error message with `message`, e.g. the file being processed.
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, CatalogError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| CatalogError::WithContextError(format!("{}: {}", message, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_prefix_wraps_message() {
        let result: Result<(), CatalogError> = Err(std::io::Error::other("disk full").into());
        let error = result.with_prefix("anteprime_excel.xlsx").unwrap_err();
        assert_eq!(error.to_string(), "anteprime_excel.xlsx: disk full");
    }

    #[test]
    fn ok_none_else_only_runs_on_none() {
        let found: Result<Option<u8>, CatalogError> = Ok(Some(1));
        assert_eq!(found.ok_none_else(|| Ok(Some(2))).unwrap(), Some(1));
        let missing: Result<Option<u8>, CatalogError> = Ok(None);
        assert_eq!(missing.ok_none_else(|| Ok(Some(2))).unwrap(), Some(2));
    }
}
