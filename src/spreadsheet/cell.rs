use crate::error::CatalogError;
use crate::table::Value;
use chrono::Duration;
use chrono::NaiveDate;
use std::fmt::Display;

/// How a raw cell string is to be interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// `"1"` or `"0"`
    Boolean,
    Number,
    /// Serial day numbers, 1900 epoch
    NumberDateTime1900,
    NumberDate1900,
    NumberTime1900,
    /// Serial day numbers, 1904 epoch
    NumberDateTime1904,
    NumberDate1904,
    NumberTime1904,
    /// ISO 8601 date or date-time text
    IsoDateTime,
    /// ISO 8601 duration text (`PT10H30M00S`)
    IsoDuration,
    InlineString,
    /// Value is an index into the workbook's shared string table
    SharedString,
    Error,
}

impl CellType {
    /// Date and time formats among the built-in number format ids.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(Self::datetime(is_1904)),
            "14" | "15" | "16" | "17" => Some(Self::date(is_1904)),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(Self::time(is_1904)),
            _ => None,
        }
    }

    /// Classifies a custom format code by the date/time tokens outside quotes and brackets.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,
                '"' => is_literal = !is_literal,
                '[' if !is_literal => is_bracket = true,
                ']' if is_bracket => is_bracket = false,
                _ if is_literal || is_bracket => (),
                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }
        match (is_date, is_time) {
            (true, true) => Self::datetime(is_1904),
            (true, false) => Self::date(is_1904),
            (false, true) => Self::time(is_1904),
            (false, false) => Self::Number,
        }
    }

    fn datetime(is_1904: bool) -> Self {
        if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }
    }

    fn date(is_1904: bool) -> Self {
        if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }
    }

    fn time(is_1904: bool) -> Self {
        if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }
    }
}

/// Excel error codes as shown in the cell.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// 0-based
    pub(crate) row: usize,
    /// 0-based
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    pub(crate) value: String,
}

impl Cell {
    /// Converts the raw cell into a table value, resolving shared strings.
    /// Dates and booleans become their display text; numbers stay numeric.
    pub(crate) fn to_value(&self, shared_strings: &[String]) -> Value {
        let text = match self.kind {
            CellType::Empty | CellType::Error => return Value::Empty,
            CellType::Number => {
                return match self.value.trim().parse::<f64>() {
                    Ok(number) => Value::Number(number),
                    Err(_) => Value::text(&self.value),
                }
            }
            CellType::SharedString => self
                .value
                .parse::<usize>()
                .ok()
                .and_then(|index| shared_strings.get(index))
                .cloned()
                .unwrap_or_default(),
            _ => self.to_string(),
        };
        Value::text(&text)
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let formatted = match self.kind {
            CellType::Boolean => Ok(if self.value == "1" { "true" } else { "false" }.to_owned()),
            CellType::NumberDateTime1900 => to_datetime_string(&self.value, false),
            CellType::NumberDate1900 => to_date_string(&self.value, false),
            CellType::NumberDateTime1904 => to_datetime_string(&self.value, true),
            CellType::NumberDate1904 => to_date_string(&self.value, true),
            CellType::NumberTime1900 | CellType::NumberTime1904 => to_time_string(&self.value),
            CellType::IsoDateTime => Ok(self.value.replace('T', " ")),
            CellType::IsoDuration => Ok(self
                .value
                .replace("PT", "")
                .replace('H', ":")
                .replace('M', ":")
                .replace('S', "")),
            _ => Ok(self.value.to_owned()),
        };
        // A serial number outside chrono's range is shown as stored.
        write!(f, "{}", formatted.unwrap_or_else(|_| self.value.to_owned()))
    }
}

/// Serial day number to `YYYY-MM-DD`, honouring the Lotus 1900 leap-year bug.
fn to_date_string(value: &str, is_1904: bool) -> Result<String, CatalogError> {
    let days = value.trim().parse::<f64>()?.trunc() as i64;
    let shift = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).expect("NaiveDate literal");
    let date = Duration::try_days(days + shift)
        .and_then(|duration| epoch.checked_add_signed(duration))
        .ok_or_else(|| CatalogError::WithContextError(format!("date serial '{value}' out of range")))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Fraction of a day to `HH:MM:SS`, with milliseconds when present.
fn to_time_string(value: &str) -> Result<String, CatalogError> {
    let fraction = value.trim().parse::<f64>()?.fract();
    let mut rest = (fraction * 86_400_000f64).round() as i64;
    let milliseconds = rest % 1_000;
    rest /= 1_000;
    let seconds = rest % 60;
    rest /= 60;
    let minutes = rest % 60;
    let hours = rest / 60;
    Ok(if milliseconds > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    })
}

fn to_datetime_string(value: &str, is_1904: bool) -> Result<String, CatalogError> {
    Ok(format!("{} {}", to_date_string(value, is_1904)?, to_time_string(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell { row: 0, col: 0, kind, value: value.to_owned() }
    }

    #[test]
    fn classifies_number_formats() {
        assert_eq!(CellType::parse_custom_number_format("dd/mm/yyyy", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("hh:mm", true), CellType::NumberTime1904);
        assert_eq!(CellType::parse_custom_number_format("0.00\" days\"", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("[Red]0.0", false), CellType::Number);
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("0", false), None);
    }

    #[test]
    fn formats_serial_dates() {
        assert_eq!(cell(CellType::NumberDate1900, "45292").to_string(), "2024-01-01");
        assert_eq!(cell(CellType::NumberDateTime1900, "45292.5").to_string(), "2024-01-01 12:00:00");
        assert_eq!(cell(CellType::NumberDate1904, "0").to_string(), "1904-01-01");
        assert_eq!(cell(CellType::NumberTime1900, "0.25").to_string(), "06:00:00");
    }

    #[test]
    fn converts_to_values() {
        let shared = vec!["L1170719".to_owned()];
        assert_eq!(cell(CellType::SharedString, "0").to_value(&shared), Value::Text("L1170719".to_owned()));
        assert_eq!(cell(CellType::Number, "140").to_value(&shared), Value::Number(140.0));
        assert_eq!(cell(CellType::InlineString, "  ").to_value(&shared), Value::Empty);
        assert_eq!(cell(CellType::Error, "#N/A").to_value(&shared), Value::Empty);
        assert_eq!(cell(CellType::Boolean, "1").to_value(&shared), Value::Text("true".to_owned()));
    }
}
