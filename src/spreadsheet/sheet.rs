use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::range::Range;

/// Non-empty cells of one sheet, restricted to the requested range.
pub(crate) struct Sheet {
    pub(crate) file_name: String,
    pub(crate) name: String,
    pub(crate) cells: Vec<Cell>,
    range: Range,
    skip_empty_rows: bool,
    end_at_empty_row: bool,
    last_row: Option<usize>,
    // Bounds of the cells actually pushed.
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(super) fn new(file_name: &str, name: &str, criteria: &Criteria) -> Self {
        Self {
            file_name: file_name.to_owned(),
            name: name.to_owned(),
            cells: Vec::new(),
            range: criteria.range.unwrap_or_default(),
            skip_empty_rows: criteria.skip_empty_rows,
            end_at_empty_row: criteria.end_at_empty_row,
            last_row: None,
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    pub(super) fn before_row_lower_bound(&self, row: usize) -> bool {
        self.range.row_lower_bound.is_some_and(|lower| row < lower)
    }

    pub(super) fn after_row_upper_bound(&self, row: usize) -> bool {
        self.range.row_upper_bound.is_some_and(|upper| upper < row)
    }

    pub(super) fn before_col_lower_bound(&self, col: usize) -> bool {
        self.range.col_lower_bound.is_some_and(|lower| col < lower)
    }

    pub(super) fn after_col_upper_bound(&self, col: usize) -> bool {
        self.range.col_upper_bound.is_some_and(|upper| upper < col)
    }

    pub(super) fn contains(&self, row: usize, col: usize) -> bool {
        !self.before_row_lower_bound(row)
            && !self.after_row_upper_bound(row)
            && !self.before_col_lower_bound(col)
            && !self.after_col_upper_bound(col)
    }

    /// True when `end_at_empty_row` is set and a blank row separates `row` from the data read so far.
    pub(super) fn ends_before(&self, row: usize) -> bool {
        self.end_at_empty_row && self.last_row.is_some_and(|last| last + 1 < row)
    }

    pub(super) fn push(&mut self, cell: Cell) {
        let (row, col) = (cell.row, cell.col);
        self.row_lower_bound = Some(self.row_lower_bound.map_or(row, |lower| lower.min(row)));
        self.row_upper_bound = Some(self.row_upper_bound.map_or(row, |upper| upper.max(row)));
        self.col_lower_bound = Some(self.col_lower_bound.map_or(col, |lower| lower.min(col)));
        self.col_upper_bound = Some(self.col_upper_bound.map_or(col, |upper| upper.max(col)));
        self.last_row = Some(self.last_row.map_or(row, |last| last.max(row)));
        self.cells.push(cell);
    }

    /// Lays the cells out as a dense grid.
    ///
    /// The grid starts at the range's first row (or the first row with data) and
    /// spans the range's columns, falling back to the columns that hold data.
    /// Blank rows are dropped when `skip_empty_rows` is set.
    pub(crate) fn grid(&self) -> Vec<Vec<Option<&Cell>>> {
        let bounds = (
            self.lower_row(),
            self.row_upper_bound,
            self.range.col_lower_bound.or(self.col_lower_bound),
            self.range.col_upper_bound.or(self.col_upper_bound),
        );
        let (Some(row_lower), Some(row_upper), Some(col_lower), Some(col_upper)) = bounds else {
            return Vec::new();
        };
        let mut grid = vec![vec![None; col_upper - col_lower + 1]; row_upper - row_lower + 1];
        for cell in &self.cells {
            if cell.row >= row_lower && cell.col >= col_lower && cell.col <= col_upper {
                grid[cell.row - row_lower][cell.col - col_lower] = Some(cell);
            }
        }
        if self.skip_empty_rows {
            grid.retain(|record| record.iter().any(Option::is_some));
        }
        grid
    }

    fn lower_row(&self) -> Option<usize> {
        if self.skip_empty_rows {
            self.row_lower_bound
        } else {
            self.range.row_lower_bound.or(self.row_lower_bound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::CellType;

    fn push(sheet: &mut Sheet, row: usize, col: usize) {
        sheet.push(Cell {
            row,
            col,
            kind: CellType::InlineString,
            value: format!("{row}:{col}"),
        });
    }

    fn values(grid: &[Vec<Option<&Cell>>]) -> Vec<Vec<String>> {
        grid.iter()
            .map(|record| record.iter().map(|cell| cell.map(|c| c.value.clone()).unwrap_or_default()).collect())
            .collect()
    }

    #[test]
    fn tracks_bounds() {
        let mut sheet = Sheet::new("", "", &Criteria::default());
        assert_eq!(sheet.row_lower_bound, None);
        push(&mut sheet, 1, 3);
        push(&mut sheet, 3, 1);
        assert_eq!((sheet.row_lower_bound, sheet.row_upper_bound), (Some(1), Some(3)));
        assert_eq!((sheet.col_lower_bound, sheet.col_upper_bound), (Some(1), Some(3)));
    }

    #[test]
    fn grid_keeps_blank_rows_by_default() {
        let mut sheet = Sheet::new("", "", &Criteria::default());
        push(&mut sheet, 1, 1);
        push(&mut sheet, 1, 2);
        push(&mut sheet, 3, 2);
        let grid = sheet.grid();
        assert_eq!(values(&grid), vec![
            vec!["1:1".to_owned(), "1:2".to_owned()],
            vec![String::new(), String::new()],
            vec![String::new(), "3:2".to_owned()],
        ]);
    }

    #[test]
    fn grid_skips_blank_rows() {
        let criteria = Criteria { skip_empty_rows: true, ..Criteria::default() };
        let mut sheet = Sheet::new("", "", &criteria);
        push(&mut sheet, 1, 1);
        push(&mut sheet, 3, 1);
        assert_eq!(sheet.grid().len(), 2);
    }

    #[test]
    fn grid_follows_range() {
        let criteria = Criteria {
            range: Some(Range {
                row_lower_bound: Some(0),
                row_upper_bound: Some(5),
                col_lower_bound: Some(0),
                col_upper_bound: Some(2),
            }),
            ..Criteria::default()
        };
        let mut sheet = Sheet::new("", "", &criteria);
        assert!(sheet.contains(5, 2));
        assert!(!sheet.contains(6, 0));
        assert!(!sheet.contains(0, 3));
        push(&mut sheet, 2, 1);
        let grid = sheet.grid();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0].len(), 3);
        assert_eq!(grid[2][1].map(|cell| cell.value.as_str()), Some("2:1"));
    }

    #[test]
    fn detects_gap_after_data() {
        let criteria = Criteria { end_at_empty_row: true, ..Criteria::default() };
        let mut sheet = Sheet::new("", "", &criteria);
        assert!(!sheet.ends_before(10));
        push(&mut sheet, 0, 0);
        assert!(!sheet.ends_before(1));
        assert!(sheet.ends_before(2));
    }
}
