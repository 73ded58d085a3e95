use crate::error::RosterError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::MAX_COLUMNS;
use crate::spreadsheet::reference::MAX_ROWS;
use crate::spreadsheet::SpreadsheetError;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// The used cells of one sheet, kept sparse.
#[derive(Debug)]
pub(crate) struct Sheet {
    pub(crate) name: String,
    pub(crate) cells: Vec<Cell>,
}

impl Sheet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
        }
    }

    /// Returns true if the sheet contains no cells.
    pub(crate) fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Checks if a position lies within the worksheet grid (`A1:XFD1048576`).
    pub(crate) fn contains(&self, row: usize, col: usize) -> bool {
        row < MAX_ROWS && col < MAX_COLUMNS
    }

    /// Adds a cell; positions outside the worksheet grid are rejected.
    pub(crate) fn push(&mut self, cell: Cell) -> Result<(), RosterError> {
        if !self.contains(cell.row, cell.col) {
            Err(SpreadsheetError::CellOutOfRangeError(self.name.to_owned(), index_to_reference(cell.row, cell.col)))?
        }
        self.cells.push(cell);
        Ok(())
    }

    /// Groups the cells by row, then by column, both ascending.
    /// Rows without cells are absent; a later cell at the same position wins.
    pub(crate) fn rows(&self) -> BTreeMap<usize, BTreeMap<usize, &Cell>> {
        let mut rows = BTreeMap::<usize, BTreeMap<usize, &Cell>>::new();
        for cell in &self.cells {
            rows.entry(cell.row).or_default().insert(cell.col, cell);
        }
        rows
    }

    /// Columns holding at least one cell, ascending.
    pub(crate) fn columns(&self) -> BTreeSet<usize> {
        self.cells.iter().map(|cell| cell.col).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::CellType;

    fn push(sheet: &mut Sheet, row: usize, col: usize, value: &str) -> Result<(), RosterError> {
        sheet.push(Cell {
            row,
            col,
            kind: CellType::InlineString,
            value: value.to_owned(),
        })
    }

    #[test]
    fn sheet_initial() {
        let sheet = Sheet::new("Roster");
        assert!(sheet.is_empty());
        assert!(sheet.rows().is_empty());
        assert!(sheet.columns().is_empty());
    }

    #[test]
    fn sheet_rows_are_sparse() {
        let mut sheet = Sheet::new("Roster");
        push(&mut sheet, 1, 3, "b").unwrap();
        push(&mut sheet, 1, 1, "a").unwrap();
        push(&mut sheet, 3, 2, "c").unwrap();
        push(&mut sheet, 3, 2, "d").unwrap();

        let rows = sheet.rows();
        assert_eq!(rows.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        let values: Vec<Vec<(usize, &str)>> = rows
            .values()
            .map(|row| row.iter().map(|(col, cell)| (*col, cell.value.as_str())).collect())
            .collect();
        assert_eq!(values[0], vec![(1, "a"), (3, "b")]);
        assert_eq!(values[1], vec![(2, "d")]);
        assert_eq!(sheet.columns().into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn far_cells_stay_cheap() {
        let mut sheet = Sheet::new("Roster");
        push(&mut sheet, 0, 0, "Name").unwrap();
        push(&mut sheet, 1, 0, "Ada").unwrap();
        push(&mut sheet, MAX_ROWS - 1, MAX_COLUMNS - 1, "far").unwrap();

        let rows = sheet.rows();
        assert_eq!(rows.len(), 3);
        assert!(rows.values().all(|row| row.len() == 1));
        assert_eq!(sheet.columns().len(), 2);
    }

    #[test]
    fn positions_outside_the_grid() {
        let mut sheet = Sheet::new("Roster");
        assert!(sheet.contains(MAX_ROWS - 1, MAX_COLUMNS - 1));
        assert!(!sheet.contains(MAX_ROWS, 0));
        assert!(!sheet.contains(0, MAX_COLUMNS));

        let error = push(&mut sheet, MAX_ROWS, 0, "x").unwrap_err();
        assert!(matches!(
            error,
            RosterError::SpreadsheetError(SpreadsheetError::CellOutOfRangeError(sheet, reference))
                if sheet == "Roster" && reference == "A1048577"
        ));
        assert!(push(&mut sheet, 0, usize::MAX, "x").is_err());
        assert!(sheet.is_empty());
    }
}
