//! Delimited text (CSV, TSV and friends) read as a single sheet.
use crate::error::RosterError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use csv::ReaderBuilder;
use encoding_rs::Encoding;
use encoding_rs::UTF_8;
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;

/// Delimiters considered when sniffing, in tie-breaking order
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Name given to the single sheet of a delimited file
const SHEET_NAME: &str = "Sheet1";

pub(crate) struct DelimitedSpreadsheet<'a> {
    text: Cow<'a, str>,
    delimiter: u8,
}

impl<'a> DelimitedSpreadsheet<'a> {
    /// Decodes `bytes` and picks the delimiter from the first line.
    pub(crate) fn open(bytes: &'a [u8]) -> Result<Self, RosterError> {
        let text = decode_text(bytes)?;
        let delimiter = sniff_delimiter(&text);
        Ok(DelimitedSpreadsheet { text, delimiter })
    }
}

impl Spreadsheet for DelimitedSpreadsheet<'_> {
    fn read_first_sheet(&mut self) -> Result<Sheet, RosterError> {
        let mut sheet = Sheet::new(SHEET_NAME);
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(self.text.as_bytes());
        for (row, result) in reader.records().enumerate() {
            let record = result?;
            for (col, field) in record.iter().enumerate() {
                if field.is_empty() {
                    continue;
                }
                let kind = match field.trim().parse::<f64>() {
                    Ok(number) if number.is_finite() => CellType::Number,
                    _ => CellType::InlineString,
                };
                sheet.push(Cell {
                    row,
                    col,
                    kind,
                    value: field.to_owned(),
                })?;
            }
        }
        Ok(sheet)
    }
}

/// Decodes text honoring a byte order mark; without one, UTF-8 is tried before Windows-1252.
/// NUL bytes mean the input is binary rather than text.
fn decode_text(bytes: &[u8]) -> Result<Cow<'_, str>, RosterError> {
    let text = if let Some((encoding, bom_length)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_length..]);
        if had_errors {
            Err(SpreadsheetError::TextEncodingError(format!("malformed {}", encoding.name())))?
        }
        text
    } else if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        text
    } else {
        WINDOWS_1252.decode_without_bom_handling(bytes).0
    };
    if text.contains('\0') {
        Err(SpreadsheetError::TextEncodingError("binary content".to_owned()))?
    }
    Ok(text)
}

/// Picks the candidate delimiter occurring most often in the first line, ignoring quoted sections.
fn sniff_delimiter(text: &str) -> u8 {
    let mut counts = [0usize; DELIMITERS.len()];
    let mut quoted = false;
    for byte in text.bytes() {
        if !quoted && (byte == b'\n' || byte == b'\r') {
            break;
        }
        if byte == b'"' {
            quoted = !quoted;
        } else if !quoted {
            if let Some(index) = DELIMITERS.iter().position(|delimiter| *delimiter == byte) {
                counts[index] += 1;
            }
        }
    }
    let mut best = 0usize;
    for index in 1..DELIMITERS.len() {
        if counts[index] > counts[best] {
            best = index;
        }
    }
    DELIMITERS[best]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(bytes: &[u8]) -> Vec<Vec<Option<(CellType, String)>>> {
        let mut spreadsheet = DelimitedSpreadsheet::open(bytes).unwrap();
        let sheet = spreadsheet.read_first_sheet().unwrap();
        let columns = sheet.columns();
        sheet.rows()
            .values()
            .map(|row| columns.iter().map(|col| row.get(col).map(|cell| (cell.kind, cell.value.to_owned()))).collect())
            .collect()
    }

    #[test]
    fn delimiter_sniffing() {
        assert_eq!(sniff_delimiter("a,b,c\n1;2;3;4;5"), b',');
        assert_eq!(sniff_delimiter("a;b;c\n"), b';');
        assert_eq!(sniff_delimiter("a\tb\tc"), b'\t');
        assert_eq!(sniff_delimiter("\"x;y;z\"|b|c"), b'|');
        assert_eq!(sniff_delimiter("single"), b',');
    }

    #[test]
    fn reads_quoted_fields_and_numbers() {
        let table = read(b"Name,Age,Note\n\"Lovelace, Ada\",36,\n Grace ,85.5,\"line\nbreak\"\n");
        assert_eq!(table.len(), 3);
        assert_eq!(table[1][0], Some((CellType::InlineString, "Lovelace, Ada".to_owned())));
        assert_eq!(table[1][1], Some((CellType::Number, "36".to_owned())));
        assert_eq!(table[1][2], None);
        assert_eq!(table[2][0], Some((CellType::InlineString, " Grace ".to_owned())));
        assert_eq!(table[2][1], Some((CellType::Number, "85.5".to_owned())));
        assert_eq!(table[2][2], Some((CellType::InlineString, "line\nbreak".to_owned())));
    }

    #[test]
    fn decodes_bom_and_legacy_encodings() {
        let table = read(b"\xEF\xBB\xBFName\nZo\xC3\xAB\n");
        assert_eq!(table[0][0], Some((CellType::InlineString, "Name".to_owned())));
        assert_eq!(table[1][0], Some((CellType::InlineString, "Zoë".to_owned())));

        let table = read(b"Name\nZo\xEB\n");
        assert_eq!(table[1][0], Some((CellType::InlineString, "Zoë".to_owned())));
    }

    #[test]
    fn rejects_binary_content() {
        assert!(DelimitedSpreadsheet::open(b"PK\x05\x06\0\0\0\0").is_err());
    }

    #[test]
    fn ragged_rows_are_accepted() {
        let table = read(b"a;b\n1\n2;3;4\n");
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].len(), 3);
        assert_eq!(table[2][2], Some((CellType::Number, "4".to_owned())));
    }

    #[test]
    fn fields_past_the_last_column_are_rejected() {
        let line = format!("{}x\n", ",".repeat(16_384));
        let mut spreadsheet = DelimitedSpreadsheet::open(line.as_bytes()).unwrap();
        assert!(spreadsheet.read_first_sheet().is_err());
    }
}
