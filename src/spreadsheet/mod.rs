//! # Spreadsheet Readers
//!
//! Readers for the roster formats accepted on upload: Office Open XML workbooks
//! (`.xlsx`, `.xlsm`), binary workbooks (`.xlsb`), legacy Excel 97-2003 workbooks
//! (`.xls`), OpenDocument spreadsheets (`.ods`) and delimited text (`.csv`, `.tsv`,
//! `.txt`). Each reader yields the used cells of the first sheet; turning those
//! cells into records is the job of [`crate::roster::extract`].
use crate::error::RosterError;
use crate::helpers::cfb::Cfb;
use crate::helpers::cfb::CFB_SIGNATURE;
use crate::helpers::zip::ZipHelper;
use crate::helpers::zip::ZIP_SIGNATURE;
use crate::spreadsheet::delimited::DelimitedSpreadsheet;
use crate::spreadsheet::ods::OdsSpreadsheet;
use crate::spreadsheet::ods::ODS_MIME_TYPE;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsb::XlsbSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use serde::Deserialize;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use zip::ZipArchive;

pub(crate) mod cell;
pub(crate) mod delimited;
pub(crate) mod excel;
pub(crate) mod ods;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsb;
pub(crate) mod xlsx;

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Compound file contains no workbook stream")]
    SpreadsheetBinaryFormatError,

    #[error("Spreadsheet is password protected")]
    PasswordProtectedError,

    #[error("Zip container is neither an xlsx, xlsb nor ods workbook")]
    UnknownContainerError,

    #[error("Missing workbook part '{0}'")]
    FileError(String),

    #[error("Workbook contains no sheets")]
    SpreadsheetEmptyError,

    #[error("Invalid cell value at sheet '{0}' cell '{1}': {2}")]
    CellValueError(String, String, String),

    #[error("Cell '{1}' of sheet '{0}' lies outside the worksheet grid")]
    CellOutOfRangeError(String, String),

    #[error("Input is not valid text: {0}")]
    TextEncodingError(String),
}

/// Container format of an uploaded roster.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Xlsx,
    Xlsb,
    Xls,
    Ods,
    Delimited,
}

impl SourceFormat {
    /// Format implied by a file name's extension, if recognized.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "xlsx" | "xlsm" | "xltx" | "xltm" => Some(Self::Xlsx),
            "xlsb" => Some(Self::Xlsb),
            "xls" | "xlt" => Some(Self::Xls),
            "ods" => Some(Self::Ods),
            "csv" | "tsv" | "tab" | "txt" => Some(Self::Delimited),
            _ => None,
        }
    }

    /// Guesses the format from the leading bytes and, for zip containers, their entries.
    pub fn sniff(bytes: &[u8]) -> Result<Self, RosterError> {
        if bytes.starts_with(CFB_SIGNATURE) {
            let cfb = Cfb::new(bytes)?;
            if cfb.exists("EncryptedPackage") {
                Err(SpreadsheetError::PasswordProtectedError)?
            }
            if cfb.exists("Workbook") || cfb.exists("Book") {
                return Ok(Self::Xls);
            }
            Err(SpreadsheetError::SpreadsheetBinaryFormatError)?
        }
        if !bytes.starts_with(ZIP_SIGNATURE) {
            return Ok(Self::Delimited);
        }
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        if let Some(mime) = zip.read_bytes("mimetype")? {
            if mime.trim_ascii() == ODS_MIME_TYPE {
                return Ok(Self::Ods);
            }
        }
        if zip.file("xl/workbook.xml")?.is_some() {
            return Ok(Self::Xlsx);
        }
        if zip.file("xl/workbook.bin")?.is_some() {
            return Ok(Self::Xlsb);
        }
        Err(SpreadsheetError::UnknownContainerError)?
    }
}

/// A parsed spreadsheet able to hand out its first sheet.
pub(crate) trait Spreadsheet {
    /// Reads every used cell of the first sheet.
    fn read_first_sheet(&mut self) -> Result<Sheet, RosterError>;
}

/// Opens `bytes` as a spreadsheet of the given or sniffed format.
pub(crate) fn open(bytes: &[u8], format: Option<SourceFormat>) -> Result<Box<dyn Spreadsheet + '_>, RosterError> {
    let format = match format {
        Some(format) => format,
        None => SourceFormat::sniff(bytes)?,
    };
    let spreadsheet: Box<dyn Spreadsheet + '_> = match format {
        SourceFormat::Xlsx => Box::new(XlsxSpreadsheet::open(Cursor::new(bytes))?),
        SourceFormat::Xlsb => Box::new(XlsbSpreadsheet::open(Cursor::new(bytes))?),
        SourceFormat::Xls => Box::new(XlsSpreadsheet::open(bytes)?),
        SourceFormat::Ods => Box::new(OdsSpreadsheet::open(Cursor::new(bytes))?),
        SourceFormat::Delimited => Box::new(DelimitedSpreadsheet::open(bytes)?),
    };
    Ok(spreadsheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::cfb::build_compound_file;
    use crate::helpers::zip::Compression;
    use crate::helpers::zip::ZipBuilder;

    #[test]
    fn format_from_file_name() {
        assert_eq!(SourceFormat::from_file_name("roster.XLSX"), Some(SourceFormat::Xlsx));
        assert_eq!(SourceFormat::from_file_name("roster.ods"), Some(SourceFormat::Ods));
        assert_eq!(SourceFormat::from_file_name("people.csv"), Some(SourceFormat::Delimited));
        assert_eq!(SourceFormat::from_file_name("legacy.xls"), Some(SourceFormat::Xls));
        assert_eq!(SourceFormat::from_file_name("big.XLSB"), Some(SourceFormat::Xlsb));
        assert_eq!(SourceFormat::from_file_name("notes.docx"), None);
        assert_eq!(SourceFormat::from_file_name("no_extension"), None);
    }

    #[test]
    fn sniff_formats() {
        assert_eq!(SourceFormat::sniff(b"Name,Age\nAda,36\n").unwrap(), SourceFormat::Delimited);

        let mut builder = ZipBuilder::new(Compression::Stored);
        builder.add("mimetype", ODS_MIME_TYPE).unwrap();
        builder.add("content.xml", b"<x/>").unwrap();
        assert_eq!(SourceFormat::sniff(&builder.finish().unwrap()).unwrap(), SourceFormat::Ods);

        let mut builder = ZipBuilder::new(Compression::Deflated);
        builder.add("xl/workbook.xml", b"<workbook/>").unwrap();
        assert_eq!(SourceFormat::sniff(&builder.finish().unwrap()).unwrap(), SourceFormat::Xlsx);

        let mut builder = ZipBuilder::new(Compression::Deflated);
        builder.add("readme.txt", b"hello").unwrap();
        assert!(SourceFormat::sniff(&builder.finish().unwrap()).is_err());

        let mut builder = ZipBuilder::new(Compression::Deflated);
        builder.add("xl/workbook.bin", &[]).unwrap();
        assert_eq!(SourceFormat::sniff(&builder.finish().unwrap()).unwrap(), SourceFormat::Xlsb);
    }

    #[test]
    fn sniff_compound_files() {
        let legacy = build_compound_file(&[("Workbook", b"\x09\x08")]);
        assert_eq!(SourceFormat::sniff(&legacy).unwrap(), SourceFormat::Xls);
        let legacy = build_compound_file(&[("Book", b"\x09\x08")]);
        assert_eq!(SourceFormat::sniff(&legacy).unwrap(), SourceFormat::Xls);

        let encrypted = build_compound_file(&[("EncryptionInfo", &[1]), ("EncryptedPackage", &[2])]);
        assert!(matches!(
            SourceFormat::sniff(&encrypted),
            Err(RosterError::SpreadsheetError(SpreadsheetError::PasswordProtectedError))
        ));

        let other = build_compound_file(&[("WordDocument", &[3])]);
        assert!(matches!(
            SourceFormat::sniff(&other),
            Err(RosterError::SpreadsheetError(SpreadsheetError::SpreadsheetBinaryFormatError))
        ));

        let mut truncated = CFB_SIGNATURE.to_vec();
        truncated.extend_from_slice(&[0u8; 64]);
        assert!(matches!(SourceFormat::sniff(&truncated), Err(RosterError::CfbError(_))));
    }
}
