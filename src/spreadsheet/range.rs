use crate::error::CatalogError;
use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::row_to_index;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RangeError {
    #[error("Invalid range format '{0}'")]
    FormatError(String),
}

/// Region of a sheet to read, e.g. `A3:R` for "header on row 3, columns A to R".
/// Every bound is optional and 0-based.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) struct Range {
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl TryFrom<&str> for Range {
    type Error = CatalogError;

    /// Accepts `B2`, `B2:H40`, `A3:`, `C:F` and `2:10`.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let pattern = Regex::new(r"^([A-Z]*)(\d*)(:([A-Z]*)(\d*))?$").expect("Hardcode regex pattern");
        let value = value.trim().to_ascii_uppercase();
        let captures = pattern
            .captures(&value)
            .ok_or_else(|| RangeError::FormatError(value.to_owned()))?;
        let part = |index: usize| captures.get(index).map(|matcher| matcher.as_str());
        let range = Range {
            col_lower_bound: part(1).and_then(col_to_index),
            row_lower_bound: part(2).and_then(row_to_index),
            col_upper_bound: part(4).and_then(col_to_index),
            row_upper_bound: part(5).and_then(row_to_index),
        };
        let inverted = |lower: Option<usize>, upper: Option<usize>| lower.zip(upper).is_some_and(|(l, u)| l > u);
        if value.is_empty()
            || inverted(range.row_lower_bound, range.row_upper_bound)
            || inverted(range.col_lower_bound, range.col_upper_bound)
        {
            Err(RangeError::FormatError(value))?;
        }
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_ranges() {
        let range = Range::try_from("a3:").unwrap();
        assert_eq!(range.col_lower_bound, Some(0));
        assert_eq!(range.row_lower_bound, Some(2));
        assert_eq!(range.col_upper_bound, None);
        assert_eq!(range.row_upper_bound, None);

        let range = Range::try_from("C:F").unwrap();
        assert_eq!((range.col_lower_bound, range.col_upper_bound), (Some(2), Some(5)));
        assert_eq!((range.row_lower_bound, range.row_upper_bound), (None, None));
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert!(Range::try_from("A1-B2").is_err());
        assert!(Range::try_from("").is_err());
        assert!(Range::try_from("A10:B2").is_err());
    }
}
