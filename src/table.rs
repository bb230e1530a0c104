//! In-memory table of named columns, loaded from the first accepted sheet of a workbook.
use crate::config::TableOptions;
use crate::error::CatalogError;
use crate::error::ResultMessage;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use std::fmt::Display;
use std::path::Path;

static EMPTY: Value = Value::Empty;

/// A scalar cell value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Empty,
    Text(String),
    Number(f64),
}

impl Value {
    /// Text value; whitespace-only text is empty.
    pub fn text(text: &str) -> Value {
        if text.trim().is_empty() {
            Value::Empty
        } else {
            Value::Text(text.to_owned())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Text(text) => text.trim().is_empty(),
            Value::Number(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(number) => Some(*number),
            _ => None,
        }
    }
}

/// Integral numbers print without a fractional part (`1170719`, not `1170719.0`).
impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Text(text) => f.write_str(text),
            Value::Number(number) => write!(f, "{number}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Row {
        Row { values }
    }

    /// The value at `index`, or empty past the end of the row.
    pub fn get(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&EMPTY)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Information score: number of non-empty fields over all columns.
    pub fn non_empty_count(&self) -> usize {
        self.values.iter().filter(|value| !value.is_empty()).count()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Rows are padded or truncated to the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Table {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.values.resize(width, Value::Empty);
                row
            })
            .collect();
        Table { columns, rows }
    }

    /// Reads the first sheet accepted by `options`
    ///
    /// The first row of the sheet (or of the configured range) is the header;
    /// blank header cells are named `column{N}`. Empty rows at the end are
    /// dropped.
    ///
    /// # Arguments
    /// * `path` - Workbook file; its extension picks the reader
    /// * `options` - Sheet pattern, range and error-cell handling
    ///
    /// # Errors
    /// Fails on an unsupported extension, an unreadable or encrypted workbook,
    /// an invalid range, no matching sheet or, unless `error_as_null` is set,
    /// an error cell inside the range.
    pub fn read(path: &Path, options: &TableOptions) -> Result<Table, CatalogError> {
        let criteria = options.criteria()?;
        let mut spreadsheet = open_spreadsheet(path).with_prefix(&path.display().to_string())?;
        let sheets = spreadsheet.read_sheets(&criteria).with_prefix(&spreadsheet.name())?;
        let Some(sheet) = sheets.into_iter().next() else {
            let pattern = options.sheet.clone().unwrap_or_else(|| "*".to_owned());
            Err(SpreadsheetError::SheetNotFoundError(spreadsheet.name(), pattern))?
        };
        let shared_strings = spreadsheet.load_shared_strings()?;

        let mut records = sheet.grid().into_iter().map(|record| {
            record
                .into_iter()
                .map(|cell| cell.map(|cell| cell.to_value(&shared_strings)).unwrap_or_default())
                .collect::<Vec<Value>>()
        });
        let columns = records
            .next()
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(index, value)| match value {
                Value::Empty => format!("column{}", index + 1),
                value => value.to_string(),
            })
            .collect();
        let mut rows: Vec<Row> = records.map(Row::new).collect();
        while rows.last().is_some_and(|row| row.non_empty_count() == 0) {
            rows.pop();
        }
        Ok(Table::new(columns, rows))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// A new table with the same columns and the rows at `indexes`, in that order.
    pub fn select(&self, indexes: &[usize]) -> Table {
        let rows = indexes.iter().filter_map(|index| self.rows.get(*index).cloned()).collect();
        Table { columns: self.columns.clone(), rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_integral_numbers_without_fraction() {
        assert_eq!(Value::Number(1170719.0).to_string(), "1170719");
        assert_eq!(Value::Number(120.5).to_string(), "120.5");
        assert_eq!(Value::Empty.to_string(), "");
        assert!(Value::text(" \t").is_empty());
        assert_eq!(Value::Number(3.0).as_number(), Some(3.0));
    }

    #[test]
    fn pads_rows_to_columns() {
        let table = Table::new(
            vec!["FOTO".to_owned(), "PESO".to_owned()],
            vec![Row::new(vec![Value::text("L1")]), Row::new(vec![Value::text("L2"), Value::Number(1.0), Value::Number(2.0)])],
        );
        assert_eq!(table.rows()[0].values().len(), 2);
        assert_eq!(table.rows()[1].values().len(), 2);
        assert_eq!(table.rows()[0].get(1), &Value::Empty);
        assert_eq!(table.rows()[0].get(7), &Value::Empty);
        assert_eq!(table.column_index("PESO"), Some(1));
        assert_eq!(table.rows()[1].non_empty_count(), 2);
    }

    #[test]
    fn selects_rows_in_order() {
        let rows = (0..4).map(|i| Row::new(vec![Value::Number(i as f64)])).collect();
        let table = Table::new(vec!["N".to_owned()], rows);
        let selected = table.select(&[3, 1]);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected.rows()[0].get(0), &Value::Number(3.0));
        assert_eq!(selected.columns(), table.columns());
    }
}
