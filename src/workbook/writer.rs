//! Office Open XML (.xlsx) serialization of [`Workbook`]s.
//!
//! The package holds only the parts spreadsheet applications require: content
//! types, package and workbook relationships, the workbook, a minimal style sheet
//! and one worksheet per sheet. Text is written as inline strings and numbers as
//! numeric cells; empty cells are left out. No timestamps or document properties
//! are written, so equal workbooks serialize to equal bytes.

use crate::error::RosterError;
use crate::helpers::xml::XmlWriter;
use crate::helpers::zip::Compression;
use crate::helpers::zip::ZipBuilder;
use crate::roster::CellValue;
use crate::spreadsheet::reference::index_to_reference;
use crate::workbook::Workbook;
use crate::workbook::Worksheet;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PACKAGE_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

const REL_OFFICE_DOCUMENT: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_WORKSHEET: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const REL_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

const TYPE_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
const TYPE_XML: &str = "application/xml";
const TYPE_WORKBOOK: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const TYPE_WORKSHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const TYPE_STYLES: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";

/// Serializes `workbook` as an xlsx package.
pub fn write_xlsx(workbook: &Workbook, compression: Compression) -> Result<Vec<u8>, RosterError> {
    if workbook.is_empty() {
        Err(RosterError::Serialization("workbook has no sheets".to_owned()))?
    }
    let sheets = workbook.sheets();
    let mut zip = ZipBuilder::new(compression);
    zip.add("[Content_Types].xml", &content_types(sheets.len())?)?;
    zip.add("_rels/.rels", &package_relationships()?)?;
    zip.add("xl/workbook.xml", &workbook_part(sheets)?)?;
    zip.add("xl/_rels/workbook.xml.rels", &workbook_relationships(sheets.len())?)?;
    zip.add("xl/styles.xml", &styles()?)?;
    for (index, sheet) in sheets.iter().enumerate() {
        zip.add(&format!("xl/worksheets/sheet{}.xml", index + 1), &worksheet_part(sheet)?)?;
    }
    zip.finish()
}

fn content_types(sheet_count: usize) -> Result<Vec<u8>, RosterError> {
    let mut xml = XmlWriter::new()?;
    xml.start("Types", &[("xmlns", NS_CONTENT_TYPES)])?;
    xml.empty("Default", &[("Extension", "rels"), ("ContentType", TYPE_RELATIONSHIPS)])?;
    xml.empty("Default", &[("Extension", "xml"), ("ContentType", TYPE_XML)])?;
    xml.empty("Override", &[("PartName", "/xl/workbook.xml"), ("ContentType", TYPE_WORKBOOK)])?;
    for index in 1..=sheet_count {
        let part = format!("/xl/worksheets/sheet{}.xml", index);
        xml.empty("Override", &[("PartName", part.as_str()), ("ContentType", TYPE_WORKSHEET)])?;
    }
    xml.empty("Override", &[("PartName", "/xl/styles.xml"), ("ContentType", TYPE_STYLES)])?;
    xml.end("Types")?;
    Ok(xml.into_bytes())
}

fn package_relationships() -> Result<Vec<u8>, RosterError> {
    let mut xml = XmlWriter::new()?;
    xml.start("Relationships", &[("xmlns", NS_PACKAGE_RELATIONSHIPS)])?;
    xml.empty("Relationship", &[("Id", "rId1"), ("Type", REL_OFFICE_DOCUMENT), ("Target", "xl/workbook.xml")])?;
    xml.end("Relationships")?;
    Ok(xml.into_bytes())
}

fn workbook_part(sheets: &[Worksheet]) -> Result<Vec<u8>, RosterError> {
    let mut xml = XmlWriter::new()?;
    xml.start("workbook", &[("xmlns", NS_MAIN), ("xmlns:r", NS_RELATIONSHIPS)])?;
    xml.start("sheets", &[])?;
    for (index, sheet) in sheets.iter().enumerate() {
        let id = (index + 1).to_string();
        let relationship = format!("rId{}", index + 1);
        xml.empty("sheet", &[("name", sheet.name.as_str()), ("sheetId", id.as_str()), ("r:id", relationship.as_str())])?;
    }
    xml.end("sheets")?;
    xml.end("workbook")?;
    Ok(xml.into_bytes())
}

/// Worksheets take `rId1..=rIdN`; the style sheet comes last.
fn workbook_relationships(sheet_count: usize) -> Result<Vec<u8>, RosterError> {
    let mut xml = XmlWriter::new()?;
    xml.start("Relationships", &[("xmlns", NS_PACKAGE_RELATIONSHIPS)])?;
    for index in 1..=sheet_count {
        let id = format!("rId{}", index);
        let target = format!("worksheets/sheet{}.xml", index);
        xml.empty("Relationship", &[("Id", id.as_str()), ("Type", REL_WORKSHEET), ("Target", target.as_str())])?;
    }
    let id = format!("rId{}", sheet_count + 1);
    xml.empty("Relationship", &[("Id", id.as_str()), ("Type", REL_STYLES), ("Target", "styles.xml")])?;
    xml.end("Relationships")?;
    Ok(xml.into_bytes())
}

/// The smallest style sheet Excel opens without repair: one font, the two
/// mandatory fills, one border and the default cell format.
fn styles() -> Result<Vec<u8>, RosterError> {
    let mut xml = XmlWriter::new()?;
    xml.start("styleSheet", &[("xmlns", NS_MAIN)])?;

    xml.start("fonts", &[("count", "1")])?;
    xml.start("font", &[])?;
    xml.empty("sz", &[("val", "11")])?;
    xml.empty("name", &[("val", "Calibri")])?;
    xml.end("font")?;
    xml.end("fonts")?;

    xml.start("fills", &[("count", "2")])?;
    for pattern in ["none", "gray125"] {
        xml.start("fill", &[])?;
        xml.empty("patternFill", &[("patternType", pattern)])?;
        xml.end("fill")?;
    }
    xml.end("fills")?;

    xml.start("borders", &[("count", "1")])?;
    xml.start("border", &[])?;
    for side in ["left", "right", "top", "bottom", "diagonal"] {
        xml.empty(side, &[])?;
    }
    xml.end("border")?;
    xml.end("borders")?;

    let format = [("numFmtId", "0"), ("fontId", "0"), ("fillId", "0"), ("borderId", "0")];
    xml.start("cellStyleXfs", &[("count", "1")])?;
    xml.empty("xf", &format)?;
    xml.end("cellStyleXfs")?;
    xml.start("cellXfs", &[("count", "1")])?;
    xml.empty("xf", &[("numFmtId", "0"), ("fontId", "0"), ("fillId", "0"), ("borderId", "0"), ("xfId", "0")])?;
    xml.end("cellXfs")?;
    xml.start("cellStyles", &[("count", "1")])?;
    xml.empty("cellStyle", &[("name", "Normal"), ("xfId", "0"), ("builtinId", "0")])?;
    xml.end("cellStyles")?;

    xml.end("styleSheet")?;
    Ok(xml.into_bytes())
}

/// Header in row 1, data rows below it.
fn worksheet_part(sheet: &Worksheet) -> Result<Vec<u8>, RosterError> {
    let width = sheet.rows.iter().map(Vec::len).fold(sheet.columns.len(), usize::max).max(1);
    let dimension = format!("A1:{}", index_to_reference(sheet.rows.len(), width - 1));

    let mut xml = XmlWriter::new()?;
    xml.start("worksheet", &[("xmlns", NS_MAIN), ("xmlns:r", NS_RELATIONSHIPS)])?;
    xml.empty("dimension", &[("ref", dimension.as_str())])?;
    xml.start("sheetData", &[])?;

    let header = sheet.columns.iter().map(|column| CellValue::Text(column.to_owned())).collect::<Vec<_>>();
    write_row(&mut xml, 0, &header)?;
    for (index, row) in sheet.rows.iter().enumerate() {
        write_row(&mut xml, index + 1, row)?;
    }

    xml.end("sheetData")?;
    xml.end("worksheet")?;
    Ok(xml.into_bytes())
}

fn write_row(xml: &mut XmlWriter, row: usize, values: &[CellValue]) -> Result<(), RosterError> {
    let number = (row + 1).to_string();
    xml.start("row", &[("r", number.as_str())])?;
    for (col, value) in values.iter().enumerate() {
        let reference = index_to_reference(row, col);
        match value {
            CellValue::Empty => (),
            CellValue::Text(text) if text.is_empty() => (),
            CellValue::Number(number) if number.is_finite() => {
                xml.start("c", &[("r", reference.as_str())])?;
                xml.element("v", &[], &number.to_string())?;
                xml.end("c")?;
            }
            other => {
                xml.start("c", &[("r", reference.as_str()), ("t", "inlineStr")])?;
                xml.start("is", &[])?;
                xml.element("t", &[("xml:space", "preserve")], &other.to_string())?;
                xml.end("is")?;
                xml.end("c")?;
            }
        }
    }
    xml.end("row")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::extract::extract_records;
    use crate::spreadsheet::SourceFormat;

    fn workbook() -> Workbook {
        let mut workbook = Workbook::new();
        workbook.add_sheet(
            "Red",
            vec!["Name".to_owned(), "Score".to_owned(), "Note".to_owned()],
            vec![
                vec![CellValue::from(" Ada & <Lovelace> "), CellValue::from(9.5), CellValue::Empty],
                vec![CellValue::from("Grace"), CellValue::from(-3.0), CellValue::from("line\nbreak")],
            ],
        );
        workbook.add_sheet("Blue", vec!["Name".to_owned()], vec![vec![CellValue::from("Linus")]]);
        workbook
    }

    #[test]
    fn written_workbook_reads_back() {
        let bytes = write_xlsx(&workbook(), Compression::Deflated).unwrap();
        assert_eq!(SourceFormat::sniff(&bytes).unwrap(), SourceFormat::Xlsx);

        let records = extract_records(&bytes, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].columns().collect::<Vec<_>>(), vec!["Name", "Score", "Note"]);
        assert_eq!(records[0].get("Name"), Some(&CellValue::from(" Ada & <Lovelace> ")));
        assert_eq!(records[0].get("Score"), Some(&CellValue::Number(9.5)));
        assert_eq!(records[0].get("Note"), Some(&CellValue::Empty));
        assert_eq!(records[1].get("Score"), Some(&CellValue::Number(-3.0)));
        assert_eq!(records[1].get("Note"), Some(&CellValue::from("line\nbreak")));
    }

    #[test]
    fn output_is_deterministic() {
        let first = write_xlsx(&workbook(), Compression::Deflated).unwrap();
        let second = write_xlsx(&workbook(), Compression::Deflated).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, write_xlsx(&workbook(), Compression::Stored).unwrap());
    }

    #[test]
    fn lists_every_sheet() {
        let bytes = workbook_part(workbook().sheets()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#"<sheet name="Red" sheetId="1" r:id="rId1"/>"#));
        assert!(text.contains(r#"<sheet name="Blue" sheetId="2" r:id="rId2"/>"#));
    }

    #[test]
    fn empty_workbook_is_rejected() {
        assert!(matches!(
            write_xlsx(&Workbook::new(), Compression::Stored),
            Err(RosterError::Serialization(_))
        ));
    }
}
