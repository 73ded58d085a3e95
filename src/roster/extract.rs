//! Turns the first sheet of an uploaded file into records.
//!
//! The first non-empty row is the header. Blank header cells are named
//! `__EMPTY`, `__EMPTY_1`, ... and repeated names get `_1`, `_2`, ... suffixes,
//! so every record carries the same uniquely named columns. Columns without
//! any cell are left out.

use crate::error::ResultMessage;
use crate::error::RosterError;
use crate::roster::CellValue;
use crate::roster::Record;
use crate::spreadsheet;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::SourceFormat;
use std::collections::BTreeMap;
use std::collections::HashSet;
use tracing::debug;

/// Base name for header cells without text
const EMPTY_HEADER: &str = "__EMPTY";

/// Reads every non-empty data row of the first sheet of `bytes`.
///
/// Any failure to read the container or its cells is reported as `UnreadableFormat`;
/// a sheet without data rows is `EmptyInput`.
pub fn extract_records(bytes: &[u8], format: Option<SourceFormat>) -> Result<Vec<Record>, RosterError> {
    let records = read_records(bytes, format).map_err(RosterError::into_unreadable)?;
    if records.is_empty() {
        Err(RosterError::EmptyInput)?
    }
    Ok(records)
}

fn read_records(bytes: &[u8], format: Option<SourceFormat>) -> Result<Vec<Record>, RosterError> {
    let mut spreadsheet = spreadsheet::open(bytes, format)?;
    let sheet = spreadsheet.read_first_sheet()?;
    records_from_sheet(&sheet)
}

/// Turns the used cells of `sheet` into records.
///
/// Only columns holding at least one cell take part, so a stray far-away cell
/// adds one column rather than every column up to it.
pub(crate) fn records_from_sheet(sheet: &Sheet) -> Result<Vec<Record>, RosterError> {
    if sheet.is_empty() {
        debug!(sheet = %sheet.name, "sheet has no cells");
        return Ok(Vec::new());
    }
    let used_columns: Vec<usize> = sheet.columns().into_iter().collect();
    let mut rows = sheet.rows().into_values();

    let header = match rows.next() {
        Some(header) => header,
        None => return Ok(Vec::new()),
    };
    let columns = header_names(&used_columns, &header)
        .with_prefix(&format!("Read header of sheet '{}' failed", sheet.name))?;

    let mut records = Vec::new();
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for col in &used_columns {
            values.push(cell_value(row.get(col).copied())?);
        }
        if values.iter().all(CellValue::is_empty) {
            continue;
        }
        let fields = columns.iter().cloned().zip(values).collect();
        records.push(Record::new(fields));
    }
    debug!(sheet = %sheet.name, columns = columns.len(), records = records.len(), "extracted roster");
    Ok(records)
}

fn cell_value(cell: Option<&Cell>) -> Result<CellValue, RosterError> {
    match cell {
        Some(cell) => cell.to_value().with_prefix(&format!("Invalid value in cell {}", cell.reference())),
        None => Ok(CellValue::Empty),
    }
}

/// Names every used column from the header row, giving blanks a placeholder and making repeats unique.
fn header_names(used_columns: &[usize], header: &BTreeMap<usize, &Cell>) -> Result<Vec<String>, RosterError> {
    let mut seen = HashSet::<String>::new();
    let mut names = Vec::with_capacity(used_columns.len());
    for col in used_columns {
        let text = cell_value(header.get(col).copied())?.to_string();
        let base = if text.is_empty() { EMPTY_HEADER.to_owned() } else { text };
        let mut name = base.clone();
        let mut suffix = 1usize;
        while seen.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        seen.insert(name.clone());
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::zip::Compression;
    use crate::helpers::zip::ZipBuilder;
    use crate::spreadsheet::ods::ODS_MIME_TYPE;

    fn columns(record: &Record) -> Vec<&str> {
        record.columns().collect()
    }

    fn xlsx(sheet_xml: &str, shared_strings: Option<&str>) -> Vec<u8> {
        let mut builder = ZipBuilder::new(Compression::Deflated);
        builder.add(
            "xl/workbook.xml",
            br#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Roster" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        ).unwrap();
        builder.add(
            "xl/_rels/workbook.xml.rels",
            br#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
        ).unwrap();
        builder.add(
            "xl/styles.xml",
            br#"<styleSheet><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14"/></cellXfs></styleSheet>"#,
        ).unwrap();
        if let Some(shared_strings) = shared_strings {
            builder.add("xl/sharedStrings.xml", shared_strings.as_bytes()).unwrap();
        }
        builder.add("xl/worksheets/sheet1.xml", sheet_xml.as_bytes()).unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn delimited_roster() {
        let records = extract_records(b"Name,Age,Email\nAda,36,ada@example.com\n,,\nGrace,85,\n", None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(columns(&records[0]), vec!["Name", "Age", "Email"]);
        assert_eq!(records[0].get("Age"), Some(&CellValue::Number(36.0)));
        assert_eq!(records[1].get("Email"), Some(&CellValue::Empty));
    }

    #[test]
    fn blank_and_duplicate_headers() {
        let records = extract_records(b"Name,,Name,,Name_1\na,b,c,d,e\n", Some(SourceFormat::Delimited)).unwrap();
        assert_eq!(columns(&records[0]), vec!["Name", "__EMPTY", "Name_1", "__EMPTY_1", "Name_1_1"]);
        assert_eq!(records[0].get("Name_1"), Some(&CellValue::from("c")));
    }

    #[test]
    fn header_only_is_empty_input() {
        assert!(matches!(extract_records(b"Name,Age\n", None), Err(RosterError::EmptyInput)));
        assert!(matches!(extract_records(b"\n\n", None), Err(RosterError::EmptyInput)));
    }

    #[test]
    fn binary_garbage_is_unreadable() {
        let error = extract_records(b"\x00\x01\x02garbage", None).unwrap_err();
        assert!(matches!(error, RosterError::UnreadableFormat(_)));

        let error = extract_records(b"PK\x03\x04not really a zip", None).unwrap_err();
        assert!(matches!(error, RosterError::UnreadableFormat(_)));
    }

    #[test]
    fn xlsx_roster() {
        let sheet = r#"<worksheet><sheetData>
            <row r="2"><c r="B2" t="s"><v>0</v></c><c r="C2" t="s"><v>1</v></c><c r="D2" t="inlineStr"><is><t>Joined</t></is></c></row>
            <row r="3"><c r="B3" t="s"><v>2</v></c><c r="C3"><v>36</v></c><c r="D3" s="1"><v>45000</v></c></row>
            <row r="4"><c r="B4" t="str"><v>Grace</v></c><c r="C4" t="b"><v>1</v></c></row>
        </sheetData></worksheet>"#;
        let shared = r#"<sst><si><t>Name</t></si><si><r><t>Ag</t></r><r><t>e</t></r></si><si><t>Ada</t><rPh><t>ada</t></rPh></si></sst>"#;
        let records = extract_records(&xlsx(sheet, Some(shared)), None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(columns(&records[0]), vec!["Name", "Age", "Joined"]);
        assert_eq!(records[0].get("Name"), Some(&CellValue::from("Ada")));
        assert_eq!(records[0].get("Age"), Some(&CellValue::Number(36.0)));
        assert_eq!(records[0].get("Joined"), Some(&CellValue::from("2023-03-15")));
        assert_eq!(records[1].get("Age"), Some(&CellValue::from("TRUE")));
        assert_eq!(records[1].get("Joined"), Some(&CellValue::Empty));
    }

    #[test]
    fn ods_roster() {
        let content = r#"<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0"><office:body><office:spreadsheet>
            <table:table table:name="People">
              <table:table-row><table:table-cell office:value-type="string"><text:p>Name</text:p></table:table-cell><table:table-cell office:value-type="string"><text:p>Score</text:p></table:table-cell></table:table-row>
              <table:table-row table:number-rows-repeated="2"><table:table-cell table:number-columns-repeated="2"/></table:table-row>
              <table:table-row><table:table-cell office:value-type="string"><text:p>Ada<text:s text:c="2"/>L</text:p></table:table-cell><table:table-cell office:value-type="float" office:value="9.5"><text:p>9,5</text:p></table:table-cell></table:table-row>
            </table:table>
            <table:table table:name="Ignored"><table:table-row><table:table-cell office:value-type="string"><text:p>x</text:p></table:table-cell></table:table-row></table:table>
        </office:spreadsheet></office:body></office:document-content>"#;
        let mut builder = ZipBuilder::new(Compression::Stored);
        builder.add("mimetype", ODS_MIME_TYPE).unwrap();
        builder.add("content.xml", content.as_bytes()).unwrap();
        let records = extract_records(&builder.finish().unwrap(), None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(columns(&records[0]), vec!["Name", "Score"]);
        assert_eq!(records[0].get("Name"), Some(&CellValue::from("Ada  L")));
        assert_eq!(records[0].get("Score"), Some(&CellValue::Number(9.5)));
    }

    #[test]
    fn far_cells_add_one_column() {
        let sheet = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="inlineStr"><is><t>Name</t></is></c></row>
            <row r="2"><c r="A2" t="inlineStr"><is><t>Ada</t></is></c></row>
            <row r="4000"><c r="XFD4000" t="inlineStr"><is><t>far</t></is></c></row>
        </sheetData></worksheet>"#;
        let records = extract_records(&xlsx(sheet, None), None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(columns(&records[0]), vec!["Name", "__EMPTY"]);
        assert_eq!(records[0].get("Name"), Some(&CellValue::from("Ada")));
        assert_eq!(records[1].get("__EMPTY"), Some(&CellValue::from("far")));
        assert_eq!(records[1].get("Name"), Some(&CellValue::Empty));
    }

    #[test]
    fn unparseable_references_use_the_running_position() {
        let sheet = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="inlineStr"><is><t>Name</t></is></c><c r="ZZZZZZZZZZZZZZZZ1" t="inlineStr"><is><t>Age</t></is></c></row>
            <row r="2"><c r="A2" t="inlineStr"><is><t>Ada</t></is></c><c r="B2"><v>36</v></c></row>
        </sheetData></worksheet>"#;
        let records = extract_records(&xlsx(sheet, None), None).unwrap();
        assert_eq!(columns(&records[0]), vec!["Name", "Age"]);
        assert_eq!(records[0].get("Age"), Some(&CellValue::Number(36.0)));
    }

    #[test]
    fn rows_past_the_last_are_unreadable() {
        let sheet = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="inlineStr"><is><t>Name</t></is></c></row>
            <row r="2000000"><c r="A2000000" t="inlineStr"><is><t>Ada</t></is></c></row>
        </sheetData></worksheet>"#;
        let error = extract_records(&xlsx(sheet, None), None).unwrap_err();
        assert!(matches!(error, RosterError::UnreadableFormat(_)));
    }

    #[test]
    fn date_styled_serials_beyond_the_calendar_stay_numeric() {
        let sheet = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="inlineStr"><is><t>Name</t></is></c><c r="B1" t="inlineStr"><is><t>Joined</t></is></c></row>
            <row r="2"><c r="A2" t="inlineStr"><is><t>Ada</t></is></c><c r="B2" s="1"><v>5551234567890</v></c></row>
        </sheetData></worksheet>"#;
        let records = extract_records(&xlsx(sheet, None), None).unwrap();
        assert_eq!(records[0].get("Joined"), Some(&CellValue::Number(5551234567890.0)));
    }
}
