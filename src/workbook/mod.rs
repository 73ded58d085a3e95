//! # Workbook Model
//!
//! In-memory workbooks produced for the generated teams. A [`Workbook`] is an
//! ordered list of [`Worksheet`]s with names that are valid and distinct in the
//! xlsx format; [`writer::write_xlsx`] turns it into bytes.
use crate::roster::CellValue;

pub mod builder;
pub mod writer;

/// Longest sheet name accepted by spreadsheet applications
pub const MAX_SHEET_NAME_LENGTH: usize = 31;

/// Name used when a sanitized sheet name ends up blank
const DEFAULT_SHEET_NAME: &str = "Sheet";

/// Characters that may not appear in a sheet name
const FORBIDDEN_SHEET_NAME_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// One sheet: a header row of column names followed by data rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Worksheet {
    pub name: String,
    pub columns: Vec<String>,
    /// Data rows, each aligned with `columns`
    pub rows: Vec<Vec<CellValue>>,
}

/// Ordered collection of uniquely named worksheets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Workbook::default()
    }

    /// Appends a sheet, sanitizing its name and suffixing ` (2)`, ` (3)`, ...
    /// when it collides with an existing sheet. Returns the name actually used.
    pub fn add_sheet(&mut self, name: &str, columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> &str {
        let name = self.unique_sheet_name(&sanitize_sheet_name(name));
        self.sheets.push(Worksheet { name, columns, rows });
        &self.sheets[self.sheets.len() - 1].name
    }

    pub fn sheets(&self) -> &[Worksheet] {
        &self.sheets
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Sheet names compare case-insensitively in spreadsheet applications.
    fn is_taken(&self, name: &str) -> bool {
        self.sheets.iter().any(|sheet| sheet.name.to_lowercase() == name.to_lowercase())
    }

    fn unique_sheet_name(&self, name: &str) -> String {
        if !self.is_taken(name) {
            return name.to_owned();
        }
        let mut counter = 2usize;
        loop {
            let suffix = format!(" ({})", counter);
            let base: String = name.chars().take(MAX_SHEET_NAME_LENGTH - suffix.chars().count()).collect();
            let candidate = format!("{}{}", base, suffix);
            if !self.is_taken(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Makes `name` acceptable as an xlsx sheet name.
///
/// `[ ] : * ? / \` become `_`, leading and trailing apostrophes are dropped,
/// the result is cut to 31 characters, and a blank result becomes `Sheet`.
pub fn sanitize_sheet_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if FORBIDDEN_SHEET_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let truncated: String = replaced
        .trim_matches('\'')
        .chars()
        .take(MAX_SHEET_NAME_LENGTH)
        .collect();
    let truncated = truncated.trim_end_matches('\'');
    if truncated.trim().is_empty() {
        DEFAULT_SHEET_NAME.to_owned()
    } else {
        truncated.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_names() {
        assert_eq!(sanitize_sheet_name("Red"), "Red");
        assert_eq!(sanitize_sheet_name("Q1/Q2: [draft]?"), "Q1_Q2_ _draft__");
        assert_eq!(sanitize_sheet_name("'quoted'"), "quoted");
        assert_eq!(sanitize_sheet_name("   "), "Sheet");
        assert_eq!(sanitize_sheet_name("''"), "Sheet");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).chars().count(), 31);
        assert_eq!(sanitize_sheet_name(&"é".repeat(40)).chars().count(), 31);
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let mut workbook = Workbook::new();
        assert_eq!(workbook.add_sheet("Team", vec![], vec![]), "Team");
        assert_eq!(workbook.add_sheet("team", vec![], vec![]), "team (2)");
        assert_eq!(workbook.add_sheet("Team", vec![], vec![]), "Team (3)");
        let long = "y".repeat(35);
        assert_eq!(workbook.add_sheet(&long, vec![], vec![]), "y".repeat(31));
        let second = workbook.add_sheet(&long, vec![], vec![]).to_owned();
        assert_eq!(second, format!("{} (2)", "y".repeat(27)));
        assert_eq!(second.chars().count(), 31);
        assert_eq!(workbook.sheets().len(), 5);
    }
}
