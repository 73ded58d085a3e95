use crate::error::RosterError;
use crate::error::ResultMessage;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use std::collections::HashMap;
use thiserror::Error;

// BIFF8 record types
const FORMULA: u16 = 6;
const EOF: u16 = 10;           // End of a substream
const DATE1904: u16 = 34;
const FILE_PASS: u16 = 47;     // Workbook is encrypted
const CODE_PAGE: u16 = 66;
const BOUND_SHEET8: u16 = 133; // Sheet name, kind and substream position
const MUL_RK: u16 = 189;       // Run of RK numbers in one row
const XF: u16 = 224;
const SST: u16 = 252;
const LABEL_SST: u16 = 253;
const NUMBER: u16 = 515;
const LABEL: u16 = 516;
const BOOL_ERR: u16 = 517;
const STRING: u16 = 519;       // Text result of the preceding formula
const ARRAY: u16 = 545;
const RK: u16 = 638;
const SHR_FMLA: u16 = 1212;
const FORMAT: u16 = 1054;
const BOF: u16 = 2057;

/// Sheet type of a worksheet in `BOUND_SHEET8`; charts, macro and VB modules are skipped
const WORKSHEET: u8 = 0;

#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Invalid Code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid Formula value '{0}'")]
    FormulaValueError(u64),
}

/// Legacy Excel 97-2003 workbook (.xls)
pub(crate) struct XlsSpreadsheet {
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    /// Cell type per XF index, for telling dates from plain numbers
    number_formats: Vec<CellType>,
    /// Worksheets in workbook order as (name, substream offset)
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Reads the workbook globals: code page, date system, formats, shared strings and sheets.
    pub(crate) fn open(bytes: &[u8]) -> Result<XlsSpreadsheet, RosterError> {
        let cfb = Cfb::new(bytes)?;
        let stream = match cfb.read("Workbook")? {
            Some(stream) => stream,
            None => cfb.read("Book")?.ok_or(SpreadsheetError::SpreadsheetBinaryFormatError)?,
        };
        let mut reader = Biff8Reader::new(stream);
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::PasswordProtectedError)?,
            DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
            XF => {
                reader.skip(2)?;
                let id = reader.read_u16()?;
                format_indexes.push(id.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                reader.skip(1)?;
                let sheet_type = reader.read_u8()?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                if sheet_type == WORKSHEET {
                    sheets.push((sheet_name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError)?
        }

        let number_formats = load_number_formats(format_indexes, custom_formats, is_1904);
        Ok(XlsSpreadsheet {
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    /// Resolves an XF index to a cell type; unknown indexes read as plain numbers.
    fn number_format(&self, index: usize) -> CellType {
        self.number_formats.get(index).copied().unwrap_or(CellType::Number)
    }

    fn read_sheet(&mut self, index: usize) -> Result<Sheet, RosterError> {
        let (sheet_name, pointer) = self.sheets.get(index).cloned()
            .ok_or(SpreadsheetError::SpreadsheetEmptyError)?;
        let mut sheet = Sheet::new(&sheet_name);
        self.reader.goto(pointer);
        if self.reader.next()? != Some(BOF) {
            Err(SpreadsheetError::FileError(sheet_name.to_owned()))?
        }
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let col_upper_bound = self.reader.get_u16_back(2)? as usize;
                    for col in col_lower_bound..=col_upper_bound {
                        let index = self.reader.read_u16()? as usize;
                        let value = self.reader.read_rk_number()?;
                        let kind = self.number_format(index);
                        sheet.push(Cell { row, col, kind, value })?;
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader, &self.shared_strings, &sheet, row, col)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let kind = match either {
                        Either::Left(kind) => kind,
                        Either::Right(index) => self.number_format(index),
                    };
                    if !value.is_empty() {
                        sheet.push(Cell { row, col, kind, value })?;
                    }
                }
                _ => (),
            }
        }
        Ok(sheet)
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn read_first_sheet(&mut self) -> Result<Sheet, RosterError> {
        self.read_sheet(0).with_prefix("Read xls worksheet failed")
    }
}

/// Reads every entry of the `SST` record; entries may run on into `CONTINUE` records.
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, RosterError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings: Vec<String> = Vec::with_capacity(count.min(u16::MAX as usize));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

/// Reads a `BOOL_ERR` record: a boolean, or an error code when the flag byte is set.
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    if flag == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value))
}

/// Reads a `LABEL_SST` record and resolves its index into the shared string table.
fn read_label_sst_cell(
    reader: &mut Biff8Reader,
    shared_strings: &[String],
    sheet: &Sheet,
    row: usize,
    col: usize,
) -> Result<(Either<CellType, usize>, String), RosterError> {
    reader.skip(2)?;
    let index = reader.read_usize()?;
    let value = shared_strings.get(index)
        .cloned()
        .ok_or_else(|| SpreadsheetError::CellValueError(
            sheet.name.to_owned(),
            index_to_reference(row, col),
            format!("shared string {} out of range", index),
        ))?;
    Ok((Either::Left(CellType::InlineString), value))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::InlineString), value))
}

/// Reads the cached result of a `FORMULA` record.
///
/// The 8-byte result is a double unless its top two bytes are `0xFFFF`; then the low
/// byte tells a string (held in the following `STRING` record), a boolean, an error or
/// an empty string apart.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF000000000000) != 0xFFFF000000000000;
    let flag = formula & 0xFF;
    if is_number {
        Ok((Either::Right(index), f64::from_bits(formula).to_string()))
    } else if flag == 0 {
        // Shared and array formula definitions may sit between the formula and its string
        while let Some(kind) = reader.next()? {
            match kind {
                STRING => return Ok((Either::Left(CellType::InlineString), reader.read_xl_unicode_string()?)),
                SHR_FMLA | ARRAY => continue,
                _ => break,
            }
        }
        Err(XlsError::FormulaValueError(formula))?
    } else if flag == 1 {
        let value = if (formula & 0xFF0000) > 0 { "1" } else { "0" };
        Ok((Either::Left(CellType::Boolean), value.to_owned()))
    } else if flag == 2 {
        let code = ((formula >> 16) & 0xFF) as u8;
        Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
    } else if flag == 3 {
        Ok((Either::Left(CellType::InlineString), String::new()))
    } else {
        Err(XlsError::FormulaValueError(formula))?
    }
}
