use crate::error::RosterError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::io::Read;
use std::io::Seek;
use thiserror::Error;
use zip::ZipArchive;

/// Content of the `mimetype` entry of an OpenDocument spreadsheet
pub(crate) const ODS_MIME_TYPE: &[u8] = b"application/vnd.oasis.opendocument.spreadsheet";

const TABLE: QName = QName(b"table:table");
const TABLE_ROW: QName = QName(b"table:table-row");
const TABLE_CELL: QName = QName(b"table:table-cell");
/// Cell hidden under a merged cell
const TABLE_COVERED_CELL: QName = QName(b"table:covered-table-cell");
/// Cell comment, not part of the value
const ANNOTATION: QName = QName(b"office:annotation");
const PARAGRAPH: QName = QName(b"text:p");
/// Run of repeated spaces
const SPACE: QName = QName(b"text:s");
const TAB: QName = QName(b"text:tab");
const LINE_BREAK: QName = QName(b"text:line-break");

#[derive(Error, Debug)]
pub enum OdsError {
    #[error("Invalid ODS MIME type")]
    MimeTypeError,

    #[error("Missing content.xml")]
    MissingContentError,
}

/// OpenDocument spreadsheet (.ods)
pub(crate) struct OdsSpreadsheet<RS: Read + Seek> {
    zip: ZipArchive<RS>,
}

impl<RS: Read + Seek> OdsSpreadsheet<RS> {
    /// Opens the package, validating its MIME type and rejecting encrypted documents.
    pub(crate) fn open(reader: RS) -> Result<Self, RosterError> {
        let mut zip = ZipArchive::new(reader)?;
        check_mime(&mut zip)?;
        if is_password_protected(&mut zip)? {
            Err(SpreadsheetError::PasswordProtectedError)?;
        }
        Ok(OdsSpreadsheet { zip })
    }
}

impl<RS: Read + Seek> Spreadsheet for OdsSpreadsheet<RS> {
    fn read_first_sheet(&mut self) -> Result<Sheet, RosterError> {
        let mut reader = self.zip
            .xml_reader("content.xml")?
            .ok_or(OdsError::MissingContentError)?;

        let mut sheet = None::<Sheet>;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TABLE => {
                let name = event.get_attribute_value("table:name")?.unwrap_or_default();
                sheet = Some(Sheet::new(&name));
                break;
            }
        });
        let mut sheet = sheet.ok_or(SpreadsheetError::SpreadsheetEmptyError)?;

        let mut row = 0usize;
        let mut col = 0usize;
        let mut row_count = 1usize;
        let mut col_count = 1usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        let mut text_context = false;
        let mut comment_context = false;
        match_xml_events!(reader => {
            Event::End(event) if event.name() == TABLE => break,
            Event::Start(event) if event.name() == TABLE_ROW => {
                row_count = event.parse_attribute_value("table:number-rows-repeated")?.unwrap_or(1);
                col = 0;
            }
            Event::End(event) if event.name() == TABLE_ROW => {
                row = row.saturating_add(row_count);
            }
            Event::Start(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                value.clear();
                col_count = event.parse_attribute_value("table:number-columns-repeated")?.unwrap_or(1);
                let value_type = event.get_attribute_value("office:value-type")?;
                kind = match value_type.as_deref() {
                    Some("boolean") => CellType::Boolean,
                    Some("date") => CellType::IsoDateTime,
                    Some("time") => CellType::IsoDuration,
                    Some("float") | Some("percentage") | Some("currency") => CellType::Number,
                    Some(_) => CellType::InlineString,
                    None => CellType::Empty,
                };
                let is_error = event.get_attribute_value("calcext:value-type")?
                    .map(|value_type| value_type == "error")
                    .unwrap_or(false);
                if is_error {
                    kind = CellType::Error;
                }
                let attribute = match kind {
                    CellType::Boolean => Some("office:boolean-value"),
                    CellType::IsoDateTime => Some("office:date-value"),
                    CellType::IsoDuration => Some("office:time-value"),
                    CellType::Number => Some("office:value"),
                    _ => None,
                };
                match attribute {
                    Some(attribute) => {
                        if let Some(data) = event.get_attribute_value(attribute)? {
                            value.push_str(&data);
                        }
                    }
                    None => text_context = kind != CellType::Empty,
                }
            }
            Event::End(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                if kind != CellType::Empty && !value.is_empty() {
                    for row_offset in 0..row_count {
                        for col_offset in 0..col_count {
                            sheet.push(Cell {
                                row: row.saturating_add(row_offset),
                                col: col.saturating_add(col_offset),
                                kind,
                                value: value.to_owned(),
                            })?;
                        }
                    }
                }
                col = col.saturating_add(col_count);
                text_context = false;
                comment_context = false;
            }
            Event::Start(event) if text_context && event.name() == ANNOTATION => comment_context = true,
            Event::End(event) if text_context && event.name() == ANNOTATION => comment_context = false,
            Event::Start(event) if text_context && !comment_context && event.name() == PARAGRAPH => {
                if !value.is_empty() {
                    value.push('\n');
                }
            }
            Event::Start(event) if text_context && !comment_context && event.name() == SPACE => {
                let count = event.parse_attribute_value("text:c")?.unwrap_or(1);
                value.push_str(&" ".repeat(count));
            }
            Event::Start(event) if text_context && !comment_context && event.name() == TAB => value.push('\t'),
            Event::Start(event) if text_context && !comment_context && event.name() == LINE_BREAK => value.push('\n'),
            Event::Text(event) if text_context && !comment_context => value.push_bytes_text(&event)?,
            Event::GeneralRef(event) if text_context && !comment_context => value.push_bytes_ref(&event)?,
        });
        Ok(sheet)
    }
}

/// Rejects packages whose `mimetype` entry names another document type.
fn check_mime<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(), RosterError> {
    if let Some(mime) = zip.read_bytes("mimetype")? {
        if mime.trim_ascii() != ODS_MIME_TYPE {
            Err(OdsError::MimeTypeError)?;
        }
    }
    Ok(())
}

/// An encrypted document declares `manifest:encryption-data` for its entries.
fn is_password_protected<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<bool, RosterError> {
    let mut reader = match zip.xml_reader("META-INF/manifest.xml")? {
        Some(reader) => reader,
        None => return Ok(false),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == QName(b"manifest:encryption-data") => return Ok(true),
    });
    Ok(false)
}
