//! Conversions between 0-based (row, column) indexes and A1-style references.

/// Rows in a worksheet (1..=1048576)
pub(crate) const MAX_ROWS: usize = 1_048_576;
/// Columns in a worksheet (A..=XFD)
pub(crate) const MAX_COLUMNS: usize = 16_384;

/// Converts a 0-based column index to column letters (0 -> "A", 26 -> "AA").
pub(crate) fn col_to_letters(col: usize) -> String {
    let mut col = col.saturating_add(1);
    let mut letters = String::new();
    while col > 0 {
        col -= 1;
        letters.insert(0, (b'A' + (col % 26) as u8) as char);
        col /= 26;
    }
    letters
}

/// Converts column letters to a 0-based column index.
/// `None` for anything but ASCII letters, or for columns past `XFD`.
pub(crate) fn letters_to_col(letters: &str) -> Option<usize> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    letters.bytes().try_fold(0usize, |col, byte| {
        if !byte.is_ascii_alphabetic() {
            return None;
        }
        col.checked_mul(26)?.checked_add((byte.to_ascii_uppercase() - b'A') as usize + 1)
    })
    .map(|col| col - 1)
    .filter(|col| *col < MAX_COLUMNS)
}

/// Formats a 0-based (row, col) pair as an A1-style reference.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", col_to_letters(col), row.saturating_add(1))
}

/// Parses an A1-style reference (optionally with `$` anchors) to a 0-based (row, col) pair.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let col = letters_to_col(letters)?;
    let row = digits.parse::<usize>().ok().filter(|row| (1..=MAX_ROWS).contains(row))?;
    Some((row - 1, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters() {
        assert_eq!(col_to_letters(0), "A");
        assert_eq!(col_to_letters(25), "Z");
        assert_eq!(col_to_letters(26), "AA");
        assert_eq!(col_to_letters(701), "ZZ");
        assert_eq!(col_to_letters(702), "AAA");
        assert_eq!(letters_to_col("a"), Some(0));
        assert_eq!(letters_to_col("AB"), Some(27));
        assert_eq!(letters_to_col(""), None);
        assert_eq!(letters_to_col("A1"), None);
    }

    #[test]
    fn columns_past_the_last() {
        assert_eq!(letters_to_col("XFD"), Some(MAX_COLUMNS - 1));
        assert_eq!(letters_to_col("xfd"), Some(16_383));
        assert_eq!(letters_to_col("XFE"), None);
        assert_eq!(letters_to_col("ZZZ"), None);
        assert_eq!(letters_to_col("AAAA"), None);
        assert_eq!(letters_to_col("ZZZZZZZZZZZZZZZZ"), None);
        assert_eq!(col_to_letters(MAX_COLUMNS - 1), "XFD");
        assert_eq!(col_to_letters(usize::MAX).len(), 14);
    }

    #[test]
    fn references() {
        assert_eq!(index_to_reference(0, 0), "A1");
        assert_eq!(index_to_reference(9, 27), "AB10");
        assert_eq!(reference_to_index("A1"), Some((0, 0)));
        assert_eq!(reference_to_index("$AB$10"), Some((9, 27)));
        assert_eq!(reference_to_index("A0"), None);
        assert_eq!(reference_to_index("12"), None);
        assert_eq!(reference_to_index("B"), None);
        assert_eq!(reference_to_index("XFD1048576"), Some((1_048_575, 16_383)));
        assert_eq!(reference_to_index("A1048577"), None);
        assert_eq!(reference_to_index("ZZZZZZZZZZZZZZZZ1"), None);
        assert_eq!(reference_to_index("A99999999999999999999999"), None);
        assert_eq!(index_to_reference(usize::MAX, 0), format!("A{}", usize::MAX));
    }
}
