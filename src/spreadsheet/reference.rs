//! A1-style cell references.

/// Converts column letters to a 0-based index (`A` → 0, `AA` → 26).
pub(crate) fn col_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    letters
        .bytes()
        .try_fold(0usize, |acc, b| {
            acc.checked_mul(26)?.checked_add((b.to_ascii_uppercase() - b'A' + 1) as usize)
        })
        .map(|number| number - 1)
}

/// Converts a 1-based row number to a 0-based index; `0` is not a valid row.
pub(crate) fn row_to_index(digits: &str) -> Option<usize> {
    digits.parse::<usize>().ok().filter(|row| *row > 0).map(|row| row - 1)
}

pub(crate) fn index_to_col(col: usize) -> String {
    let mut letters = Vec::new();
    let mut number = col + 1;
    while number > 0 {
        let rem = (number - 1) % 26;
        letters.push(b'A' + rem as u8);
        number = (number - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", index_to_col(col), row + 1)
}

/// Splits `B12` into `(11, 1)`; returns `None` unless both parts are present.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    Some((row_to_index(digits)?, col_to_index(letters)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_columns() {
        assert_eq!(col_to_index("A"), Some(0));
        assert_eq!(col_to_index("z"), Some(25));
        assert_eq!(col_to_index("AA"), Some(26));
        assert_eq!(col_to_index("XFD"), Some(16_383));
        assert_eq!(col_to_index(""), None);
        assert_eq!(index_to_col(0), "A");
        assert_eq!(index_to_col(27), "AB");
        assert_eq!(index_to_col(16_383), "XFD");
    }

    #[test]
    fn converts_references() {
        assert_eq!(reference_to_index("B12"), Some((11, 1)));
        assert_eq!(reference_to_index("R0"), None);
        assert_eq!(reference_to_index("12"), None);
        assert_eq!(index_to_reference(0, 17), "R1");
    }
}
