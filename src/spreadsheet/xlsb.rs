use crate::error::RosterError;
use crate::error::ResultMessage;
use crate::helpers::biff12::Biff12Reader;
use crate::helpers::zip::ZipHelper;
use crate::match_biff12_record;
use crate::spreadsheet::cell::rk_to_string;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Read;
use std::io::Seek;
use zip::ZipArchive;

// BIFF12 record types
const BRT_ROW_HDR: u16 = 0;
const BRT_CELL_RK: u16 = 2;
const BRT_CELL_ERROR: u16 = 3;
const BRT_CELL_BOOL: u16 = 4;
const BRT_CELL_REAL: u16 = 5;
const BRT_CELL_ST: u16 = 6;
const BRT_CELL_ISST: u16 = 7;        // Index into the shared string table
const BRT_FMLA_STRING: u16 = 8;
const BRT_FMLA_NUM: u16 = 9;
const BRT_FMLA_BOOL: u16 = 10;
const BRT_FMLA_ERROR: u16 = 11;
const BRT_SST_ITEM: u16 = 19;
const BRT_FRT_BEGIN: u16 = 35;       // Future record section, skipped as a whole
const BRT_FRT_END: u16 = 36;
const BRT_FMT: u16 = 44;
const BRT_XF: u16 = 47;
const BRT_CELL_R_STRING: u16 = 62;
const BRT_END_BUNDLE_SHS: u16 = 144;
const BRT_BEGIN_SHEET_DATA: u16 = 145;
const BRT_END_SHEET_DATA: u16 = 146;
const BRT_WB_PROP: u16 = 153;
const BRT_BUNDLE_SH: u16 = 156;
const BRT_BEGIN_SST: u16 = 159;
const BRT_BEGIN_FMTS: u16 = 615;
const BRT_BEGIN_CELL_XFS: u16 = 617;

/// Excel binary workbook (.xlsb)
pub(crate) struct XlsbSpreadsheet<RS: Read + Seek> {
    zip: ZipArchive<RS>,
    /// Cell type per style index, for telling dates from plain numbers
    number_formats: Vec<CellType>,
    /// Worksheets in workbook order as (name, zip path)
    sheets: Vec<(String, String)>,
}

impl<RS: Read + Seek> XlsbSpreadsheet<RS> {
    /// Opens the package and loads the workbook structure and number formats.
    pub(crate) fn open(reader: RS) -> Result<Self, RosterError> {
        let mut zip = ZipArchive::new(reader)?;
        let (sheets, is_1904) = load_workbook(&mut zip).with_prefix("Read xlsb workbook failed")?;
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError)?
        }
        let number_formats = load_number_formats(&mut zip, is_1904).with_prefix("Read xlsb styles failed")?;
        Ok(XlsbSpreadsheet { zip, number_formats, sheets })
    }

    /// Loads the whole shared string table; a workbook without one has no shared strings.
    fn load_shared_strings(&mut self) -> Result<Vec<String>, RosterError> {
        let mut shared_strings = Vec::<String>::new();
        let mut reader = match self.zip.biff_reader("xl/sharedStrings.bin")? {
            Some(reader) => reader,
            None => return Ok(shared_strings),
        };
        reader.find(BRT_BEGIN_SST)?;
        for _ in 0..reader.get_usize(4)? {
            reader.find_with(BRT_SST_ITEM, &[(BRT_FRT_BEGIN, BRT_FRT_END)])?;
            shared_strings.push(reader.get_str(1)?.to_string());
        }
        Ok(shared_strings)
    }

    fn read_sheet(&mut self, index: usize) -> Result<Sheet, RosterError> {
        let shared_strings = self.load_shared_strings()?;
        let (sheet_name, zip_path) = self.sheets.get(index).cloned()
            .ok_or(SpreadsheetError::SpreadsheetEmptyError)?;
        let mut sheet = Sheet::new(&sheet_name);
        let mut row = 0usize;
        let mut reader = self.zip.biff_reader(&zip_path)?
            .ok_or_else(|| SpreadsheetError::FileError(zip_path.to_owned()))?;
        reader.find(BRT_BEGIN_SHEET_DATA)?;
        match_biff12_record!(reader => {
            BRT_END_SHEET_DATA => break,
            BRT_ROW_HDR => row = reader.get_usize(0)?,
            tag @ (BRT_CELL_RK
                | BRT_CELL_BOOL | BRT_FMLA_BOOL
                | BRT_CELL_REAL | BRT_FMLA_NUM
                | BRT_CELL_ST | BRT_FMLA_STRING
                | BRT_CELL_R_STRING
                | BRT_CELL_ISST
                | BRT_CELL_ERROR | BRT_FMLA_ERROR) => {
                let col = reader.get_usize(0)?;
                let (either, value) = match tag {
                    BRT_CELL_BOOL | BRT_FMLA_BOOL => read_bool_cell(&reader)?,
                    BRT_CELL_REAL | BRT_FMLA_NUM => read_real_cell(&reader)?,
                    BRT_CELL_ST | BRT_FMLA_STRING => read_st_cell(&reader)?,
                    BRT_CELL_R_STRING => read_rich_string_cell(&reader)?,
                    BRT_CELL_ISST => {
                        let index = reader.get_usize(8)?;
                        let value = shared_strings.get(index)
                            .cloned()
                            .ok_or_else(|| SpreadsheetError::CellValueError(
                                sheet.name.to_owned(),
                                index_to_reference(row, col),
                                format!("shared string {} out of range", index),
                            ))?;
                        (Either::Left(CellType::InlineString), value)
                    }
                    BRT_CELL_ERROR | BRT_FMLA_ERROR => read_error_cell(&reader)?,
                    _ => read_rk_cell(&reader)?,
                };
                let kind = match either {
                    Either::Left(kind) => kind,
                    Either::Right(index) => self.number_formats.get(index).copied().unwrap_or(CellType::Number),
                };
                if !value.is_empty() {
                    sheet.push(Cell { row, col, kind, value })?;
                }
            }
        });
        Ok(sheet)
    }
}

impl<RS: Read + Seek> Spreadsheet for XlsbSpreadsheet<RS> {
    fn read_first_sheet(&mut self) -> Result<Sheet, RosterError> {
        self.read_sheet(0).with_prefix("Read xlsb worksheet failed")
    }
}

/// Reads sheet names with their part paths, and whether dates use the 1904 system.
fn load_workbook<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(Vec<(String, String)>, bool), RosterError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.bin.rels")?;
    let mut reader = zip.biff_reader("xl/workbook.bin")?
        .ok_or_else(|| SpreadsheetError::FileError("xl/workbook.bin".to_string()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_biff12_record!(reader => {
        BRT_END_BUNDLE_SHS => break,
        BRT_BUNDLE_SH => {
            let (id, index) = reader.get_str_and_bound(8)?;
            if let Some(zip_path) = relationships.get(id.as_ref()) {
                let sheet_name = reader.get_str(index)?;
                sheets.push((sheet_name.to_string(), zip_path.to_owned()));
            }
        }
        BRT_WB_PROP => is_1904 = (reader.get_u8(0)? & 0x1) != 0,
    });
    Ok((sheets, is_1904))
}

/// Maps every cell style (`BrtXF` under `BrtBeginCellXFs`) to the cell type implied by its number format.
fn load_number_formats<RS: Read + Seek>(zip: &mut ZipArchive<RS>, is_1904: bool) -> Result<Vec<CellType>, RosterError> {
    let mut reader = match zip.biff_reader("xl/styles.bin")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats: HashMap<String, CellType> = HashMap::new();
    let mut format_indexes: Vec<String> = Vec::new();
    match_biff12_record!(reader => {
        BRT_BEGIN_FMTS => {
            for _ in 0..reader.get_usize(0)? {
                reader.find(BRT_FMT)?;
                let id = reader.get_u16(0)?;
                let format = reader.get_str(2)?;
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
        }
        BRT_BEGIN_CELL_XFS => {
            for _ in 0..reader.get_usize(0)? {
                reader.find(BRT_XF)?;
                format_indexes.push(reader.get_u16(2)?.to_string());
            }
            break;
        }
    });

    Ok(excel::load_number_formats(format_indexes, custom_formats, is_1904))
}

// Cell records share a layout: column (4 bytes), style (3 bytes), flags (1 byte), then the value.

fn read_bool_cell<R: BufRead>(reader: &Biff12Reader<R>) -> Result<(Either<CellType, usize>, String), RosterError> {
    let value = if reader.get_u8(8)? != 0 { "1" } else { "0" };
    Ok((Either::Left(CellType::Boolean), value.to_owned()))
}

fn read_real_cell<R: BufRead>(reader: &Biff12Reader<R>) -> Result<(Either<CellType, usize>, String), RosterError> {
    let index = reader.get_style(4)?;
    let value = reader.get_f64(8)?.to_string();
    Ok((Either::Right(index), value))
}

fn read_st_cell<R: BufRead>(reader: &Biff12Reader<R>) -> Result<(Either<CellType, usize>, String), RosterError> {
    let value = reader.get_str(8)?.to_string();
    Ok((Either::Left(CellType::InlineString), value))
}

/// Rich strings carry a flags byte ahead of the text.
fn read_rich_string_cell<R: BufRead>(reader: &Biff12Reader<R>) -> Result<(Either<CellType, usize>, String), RosterError> {
    let value = reader.get_str(8 + 1)?.to_string();
    Ok((Either::Left(CellType::InlineString), value))
}

fn read_error_cell<R: BufRead>(reader: &Biff12Reader<R>) -> Result<(Either<CellType, usize>, String), RosterError> {
    let value = to_error_value(reader.get_u8(8)?).to_owned();
    Ok((Either::Left(CellType::Error), value))
}

fn read_rk_cell<R: BufRead>(reader: &Biff12Reader<R>) -> Result<(Either<CellType, usize>, String), RosterError> {
    let index = reader.get_style(4)?;
    let value = rk_to_string(reader.get_u32(8)?);
    Ok((Either::Right(index), value))
}
