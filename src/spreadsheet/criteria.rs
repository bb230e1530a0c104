use crate::spreadsheet::range::Range;
use glob::Pattern;

/// Which sheets and which region of them a reader should load.
#[derive(Clone, Debug, Default)]
pub(crate) struct Criteria {
    /// Glob patterns on sheet names; `None` accepts every sheet.
    pub(crate) sheet_name_patterns: Option<Vec<Pattern>>,
    pub(crate) sheet_limit: Option<usize>,
    pub(crate) range: Option<Range>,
    /// Error cells (`#N/A`, ...) are read as empty instead of failing the read.
    pub(crate) error_as_null: bool,
    pub(crate) skip_empty_rows: bool,
    /// Stop at the first blank row after data has started.
    pub(crate) end_at_empty_row: bool,
}

impl Criteria {
    pub(crate) fn accept(&self, sheet_name: &str) -> bool {
        match &self.sheet_name_patterns {
            Some(patterns) => patterns.iter().any(|pattern| pattern.matches(sheet_name)),
            None => true,
        }
    }

    /// Whether another sheet may be read after `count` were accepted.
    pub(crate) fn wants_more(&self, count: usize) -> bool {
        self.sheet_limit.map_or(true, |limit| count < limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_by_pattern() {
        let criteria = Criteria {
            sheet_name_patterns: Some(vec![Pattern::new("Campioni*").unwrap()]),
            sheet_limit: Some(1),
            ..Criteria::default()
        };
        assert!(criteria.accept("Campioni 2024"));
        assert!(!criteria.accept("Foglio1"));
        assert!(criteria.wants_more(0));
        assert!(!criteria.wants_more(1));
        assert!(Criteria::default().accept("anything"));
    }
}
