//! Binary Interchange File Format 8 (BIFF8), the record stream inside legacy `.xls` workbooks.
//!
//! A record is a 2-byte type, a 2-byte size and its payload. Payloads longer than
//! 8224 bytes spill into `CONTINUE` records; the reader stitches those chunks back
//! together so callers read a record as one sequence of bytes.

use crate::error::RosterError;
use crate::helpers::bytes::f64_at;
use crate::helpers::bytes::u16_at;
use crate::helpers::bytes::u32_at;
use crate::helpers::bytes::u64_at;
use crate::spreadsheet::cell::rk_to_string;
use encoding_rs::Encoding;
use encoding_rs::UTF_16BE;
use encoding_rs::UTF_16LE;
use thiserror::Error;

const CONTINUE: u16 = 60;

#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining")]
    NoEnoughDataError(usize),
}

pub(crate) struct Biff8Reader {
    /// Encoding of single-byte strings, set by the `CODEPAGE` record.
    /// Under UTF-16 code pages they hold the low bytes of each character.
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    /// Start of the next record header
    pointer: usize,
    /// Payload chunks (start, end) of the current record and its continuations
    chunks: Vec<(usize, usize)>,
    /// Current chunk
    index: usize,
    /// Read position within the current chunk
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: UTF_16LE,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Advances to the next record and returns its type, `None` at the end of the stream.
    /// Payloads running past the end of the stream are cut short.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, RosterError> {
        let Some(kind) = self.record_header(self.pointer) else {
            return Ok(None);
        };
        self.index = 0;
        self.offset = 0;
        self.chunks.clear();
        self.push_chunk();
        while self.record_header(self.pointer).map(|kind| kind == CONTINUE).unwrap_or(false) {
            self.push_chunk();
        }
        Ok(Some(kind))
    }

    /// Type of the record whose header starts at `pointer`, if a whole header fits.
    fn record_header(&self, pointer: usize) -> Option<u16> {
        u16_at(&self.buffer, pointer.checked_add(2)?)?;
        u16_at(&self.buffer, pointer)
    }

    /// Records the payload of the record at `pointer` and moves past it.
    fn push_chunk(&mut self) {
        let size = u16_at(&self.buffer, self.pointer + 2).unwrap_or_default() as usize;
        let lower = self.pointer + 4;
        let upper = self.buffer.len().min(lower + size);
        self.pointer = lower + size;
        self.chunks.push((lower, upper));
    }

    /// Jumps to a stream offset, such as the start of a worksheet substream.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.chunks.clear();
    }

    /// Reads exactly `length` bytes of the current chunk.
    fn read_exact(&mut self, length: usize) -> Result<&[u8], RosterError> {
        let (lower, upper) = self.read(length);
        if upper - lower == length {
            Ok(&self.buffer[lower..upper])
        } else {
            Err(Biff8Error::NoEnoughDataError(length))?
        }
    }

    /// Reads up to `length` bytes, stopping at the end of the current chunk.
    /// Returns the buffer range read; exhausted chunks are stepped over first.
    fn read(&mut self, length: usize) -> (usize, usize) {
        while let Some((lower, upper)) = self.chunks.get(self.index).copied() {
            let source = lower + self.offset;
            if source >= upper {
                self.index += 1;
                self.offset = 0;
                continue;
            }
            let target = upper.min(source.saturating_add(length));
            self.offset += target - source;
            return (source, target);
        }
        (0, 0)
    }

    /// Skips `length` bytes, crossing into continuation chunks as needed.
    pub(crate) fn skip(&mut self, length: usize) -> Result<(), RosterError> {
        let mut remaining = length;
        while remaining > 0 {
            let (lower, upper) = self.read(remaining);
            if lower == upper {
                Err(Biff8Error::NoEnoughDataError(remaining))?
            }
            remaining -= upper - lower;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, RosterError> {
        Ok(self.read_exact(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, RosterError> {
        let bytes = self.read_exact(2)?;
        Ok(u16_at(bytes, 0).ok_or(Biff8Error::NoEnoughDataError(2))?)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, RosterError> {
        let bytes = self.read_exact(4)?;
        Ok(u32_at(bytes, 0).ok_or(Biff8Error::NoEnoughDataError(4))?)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, RosterError> {
        Ok(self.read_u32()? as usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, RosterError> {
        let bytes = self.read_exact(8)?;
        Ok(u64_at(bytes, 0).ok_or(Biff8Error::NoEnoughDataError(8))?)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, RosterError> {
        let bytes = self.read_exact(8)?;
        Ok(f64_at(bytes, 0).ok_or(Biff8Error::NoEnoughDataError(8))?)
    }

    /// Reads the 16-bit value `offset` bytes before the end of the current record.
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, RosterError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if *lower + offset <= *upper {
                return Ok(u16_at(&self.buffer, *upper - offset).ok_or(Biff8Error::NoEnoughDataError(2))?);
            }
            offset -= *upper - *lower;
        }
        Err(Biff8Error::NoEnoughDataError(2))?
    }

    /// Reads an RK number, the compressed numeric form of `RK` and `MULRK` records.
    pub(crate) fn read_rk_number(&mut self) -> Result<String, RosterError> {
        Ok(rk_to_string(self.read_u32()?))
    }

    /// Reads a string with a 1-byte character count.
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, RosterError> {
        let chars = self.read_u8()? as usize;
        self.read_string(chars, false)
    }

    /// Reads a string with a 2-byte character count.
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, RosterError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars, false)
    }

    /// Reads a shared string table entry, which may carry formatting runs and phonetic data.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, RosterError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars, true)
    }

    /// Reads `chars` characters following a flags byte.
    /// A string cut by a `CONTINUE` boundary repeats the flags byte at the start of the next
    /// chunk, so each part may switch between one and two bytes per character.
    fn read_string(&mut self, chars: usize, is_extend: bool) -> Result<String, RosterError> {
        let mut string = String::new();
        let flag = self.read_u8()?;
        let rich_string_count = if is_extend && (flag & 0x8) > 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_count = if is_extend && (flag & 0x4) > 0 {
            self.read_usize()?
        } else {
            0
        };
        let mut remaining = chars - self.read_chars_into(chars, flag, &mut string);
        while remaining > 0 {
            let flag = self.read_u8()?;
            remaining -= self.read_chars_into(remaining, flag, &mut string);
        }
        // Formatting runs, then phonetic data
        self.skip((4 * rich_string_count).saturating_add(phonetic_count))?;
        Ok(string)
    }

    /// Appends up to `chars` characters from the current chunk and returns how many were read.
    fn read_chars_into(&mut self, chars: usize, flag: u8, content: &mut String) -> usize {
        let is_high_byte = (flag & 0x1) > 0;
        let (lower, upper) = self.read(if is_high_byte { chars << 1 } else { chars });
        let bytes = &self.buffer[lower..upper];
        if is_high_byte {
            let (string, _) = UTF_16LE.decode_without_bom_handling(bytes);
            content.push_str(&string);
            bytes.len() >> 1
        } else if self.encoding == UTF_16LE || self.encoding == UTF_16BE {
            content.extend(bytes.iter().map(|byte| *byte as char));
            bytes.len()
        } else {
            let (string, _) = self.encoding.decode_without_bom_handling(bytes);
            content.push_str(&string);
            bytes.len()
        }
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

/// Encodes one record, for building workbook streams in tests.
#[cfg(test)]
pub(crate) fn record(kind: u16, payload: &[u8]) -> Vec<u8> {
    let mut bytes = kind.to_le_bytes().to_vec();
    bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_continuations() {
        let mut stream = record(0x0203, &[1, 0, 2, 0]);
        stream.extend(record(0x00FC, &[5, 0, 0x00, b'H', b'e']));
        stream.extend(record(CONTINUE, &[0x01, b'l', 0, b'l', 0, b'o', 0]));
        stream.extend(record(0x000A, &[]));

        let mut reader = Biff8Reader::new(stream);
        assert_eq!(reader.next().unwrap(), Some(0x0203));
        assert_eq!(reader.read_u16().unwrap(), 1);
        assert_eq!(reader.get_u16_back(2).unwrap(), 2);

        assert_eq!(reader.next().unwrap(), Some(0x00FC));
        assert_eq!(reader.read_xl_unicode_rich_extended_string().unwrap(), "Hello");

        assert_eq!(reader.next().unwrap(), Some(0x000A));
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn truncated_records_are_errors() {
        let mut stream = record(0x0204, &[0, 0, 0, 0, 0, 0, 9, 0]);
        stream.truncate(stream.len() - 1);
        let mut reader = Biff8Reader::new(stream);
        assert_eq!(reader.next().unwrap(), Some(0x0204));
        reader.skip(6).unwrap();
        assert!(reader.read_xl_unicode_string().is_err());
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn single_byte_strings_follow_the_code_page() {
        let payload = [2, 0, 0x00, 0xC0, 0xE9];
        let mut reader = Biff8Reader::new(record(0x0204, &payload));
        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "Àé");

        let mut reader = Biff8Reader::new(record(0x0204, &payload));
        reader.encoding = encoding_rs::WINDOWS_1251;
        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "Ай");
    }

    #[test]
    fn rk_numbers() {
        let mut reader = Biff8Reader::new(record(0x027E, &[((42 << 2) | 0x2) as u8, 0, 0, 0]));
        reader.next().unwrap();
        assert_eq!(reader.read_rk_number().unwrap(), "42");
    }
}
