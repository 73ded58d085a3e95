//! ZIP archive helpers for the OOXML (.xlsx) and OpenDocument (.ods) containers,
//! and for packing generated files into archives.

use crate::error::RosterError;
use crate::helpers::biff12::Biff12Reader;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::DateTime;
use zip::ZipArchive;
use zip::ZipWriter;

/// Local file header signature that starts every non-empty zip file
pub(crate) const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Helper trait for reading entries of a ZIP archive
pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Gets a file from the ZIP archive by name (case-insensitive, path separator agnostic)
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, RosterError>;

    /// Creates an XML reader for a file within the ZIP archive
    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, RosterError>;

    /// Creates a BIFF12 record reader for a file within the ZIP archive
    fn biff_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<Biff12Reader<BufReader<ZipFile<'_, RS>>>>, RosterError>;

    /// Reads a whole entry into memory
    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, RosterError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, RosterError> {
        let pattern = name.replace('\\', "/");
        let path = self.file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(&file_name.replace('\\', "/")))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, RosterError> {
        let reader = self
            .file(name)?
            .map(|file| XmlReader::new(BufReader::new(file)));
        Ok(reader)
    }

    fn biff_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<Biff12Reader<BufReader<ZipFile<'_, RS>>>>, RosterError> {
        let reader = self
            .file(name)?
            .map(|file| Biff12Reader::new(BufReader::new(file)));
        Ok(reader)
    }

    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, RosterError> {
        match self.file(name)? {
            Some(mut file) => {
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }
}

/// Compression applied to entries of generated archives and workbook containers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Deflated => CompressionMethod::Deflated,
            Compression::Stored => CompressionMethod::Stored,
        }
    }
}

/// Builds a zip archive in memory.
///
/// Every entry carries the same fixed modification time (1980-01-01 00:00:00),
/// so identical input produces identical bytes.
pub(crate) struct ZipBuilder {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

impl ZipBuilder {
    pub(crate) fn new(compression: Compression) -> Self {
        let options = SimpleFileOptions::default()
            .compression_method(compression.method())
            .last_modified_time(DateTime::default());
        ZipBuilder {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options,
        }
    }

    /// Appends one entry; names must be unique within the archive
    pub(crate) fn add(&mut self, name: &str, bytes: &[u8]) -> Result<(), RosterError> {
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<Vec<u8>, RosterError> {
        Ok(self.zip.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(compression: Compression) -> Vec<u8> {
        let mut builder = ZipBuilder::new(compression);
        builder.add("xl/workbook.xml", b"<workbook/>").unwrap();
        builder.add("docs/Readme.txt", b"hello").unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn archive_lookup_ignores_case_and_separators() {
        let bytes = build(Compression::Deflated);
        assert!(bytes.starts_with(ZIP_SIGNATURE));

        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.read_bytes("XL/Workbook.xml").unwrap(), Some(b"<workbook/>".to_vec()));
        assert_eq!(zip.read_bytes("DOCS\\readme.txt").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(zip.read_bytes("missing.xml").unwrap(), None);
    }

    #[test]
    fn archives_are_reproducible() {
        assert_eq!(build(Compression::Deflated), build(Compression::Deflated));
        assert_eq!(build(Compression::Stored), build(Compression::Stored));
    }
}
