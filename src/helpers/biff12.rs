//! Binary Interchange File Format 12 (BIFF12), the record stream inside `.xlsb` parts.
//!
//! Record types and sizes are 7-bit continuation integers; each record is read
//! whole into a buffer and its fields are decoded at fixed offsets.

use crate::error::RosterError;
use crate::helpers::bytes::f64_at;
use crate::helpers::bytes::u16_at;
use crate::helpers::bytes::u32_at;
use crate::helpers::bytes::usize_at;
use encoding_rs::UTF_16LE;
use std::borrow::Cow;
use std::io::BufRead;
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Biff12Error {
    #[error("No enough data: expect '{0}' bytes, actual '{1}' bytes")]
    NoEnoughData(usize, usize),
}

/// Reader over the records of one BIFF12 part.
pub(crate) struct Biff12Reader<R: BufRead> {
    reader: R,
    /// Payload of the current record
    pub(crate) buffer: Vec<u8>,
}

impl<R: BufRead> Biff12Reader<R> {
    pub(crate) fn new(reader: R) -> Biff12Reader<R> {
        Biff12Reader {
            reader,
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Reads a length-prefixed UTF-16 string at `at`.
    /// Returns the string and the offset just past it.
    pub(crate) fn get_str_and_bound(&'_ self, at: usize) -> Result<(Cow<'_, str>, usize), RosterError> {
        let size = self.get_usize(at)?;
        let lower_bound = at + 4;
        let upper_bound = size.checked_mul(2)
            .and_then(|bytes| bytes.checked_add(lower_bound))
            .filter(|upper_bound| *upper_bound <= self.buffer.len())
            .ok_or(Biff12Error::NoEnoughData(lower_bound.saturating_add(size.saturating_mul(2)), self.buffer.len()))?;
        let (value, _) = UTF_16LE.decode_without_bom_handling(&self.buffer[lower_bound..upper_bound]);
        Ok((value, upper_bound))
    }

    pub(crate) fn get_str(&'_ self, at: usize) -> Result<Cow<'_, str>, RosterError> {
        let (data, _) = self.get_str_and_bound(at)?;
        Ok(data)
    }

    pub(crate) fn get_u8(&self, at: usize) -> Result<u8, RosterError> {
        Ok(*self.buffer.get(at).ok_or(self.shortage(at, 1))?)
    }

    pub(crate) fn get_u16(&self, at: usize) -> Result<u16, RosterError> {
        Ok(u16_at(&self.buffer, at).ok_or(self.shortage(at, 2))?)
    }

    pub(crate) fn get_u32(&self, at: usize) -> Result<u32, RosterError> {
        Ok(u32_at(&self.buffer, at).ok_or(self.shortage(at, 4))?)
    }

    pub(crate) fn get_usize(&self, at: usize) -> Result<usize, RosterError> {
        Ok(usize_at(&self.buffer, at).ok_or(self.shortage(at, 4))?)
    }

    pub(crate) fn get_f64(&self, at: usize) -> Result<f64, RosterError> {
        Ok(f64_at(&self.buffer, at).ok_or(self.shortage(at, 8))?)
    }

    /// Reads a 24-bit style index.
    pub(crate) fn get_style(&self, at: usize) -> Result<usize, RosterError> {
        let bytes = self.buffer.get(at..at.saturating_add(3)).ok_or(self.shortage(at, 3))?;
        Ok(bytes.iter().rev().fold(0usize, |style, byte| (style << 8) | *byte as usize))
    }

    fn shortage(&self, at: usize, size: usize) -> Biff12Error {
        Biff12Error::NoEnoughData(at.saturating_add(size), self.buffer.len())
    }

    /// Reads a 7-bit continuation integer of at most `limit` bytes, `None` at end of input.
    fn read_7bit_continuation_integer(&mut self, limit: usize) -> Result<Option<usize>, RosterError> {
        let mut integer = 0usize;
        for index in 0..limit {
            let mut byte = [0u8; 1];
            if self.reader.read(&mut byte)? == 0 {
                if index == 0 {
                    return Ok(None);
                }
                Err(Biff12Error::NoEnoughData(index + 1, index))?
            }
            integer |= ((byte[0] & 0x7F) as usize) << (7 * index);
            if (byte[0] & 0x80) == 0 {
                break;
            }
        }
        Ok(Some(integer))
    }

    /// Reads the next record and returns its type, `None` at the end of the part.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, RosterError> {
        Ok(self.read()?.map(|(kind, _)| kind))
    }

    /// Reads the next record into the buffer and returns its type and size.
    pub(crate) fn read(&mut self) -> Result<Option<(u16, usize)>, RosterError> {
        let Some(kind) = self.read_7bit_continuation_integer(2)? else {
            return Ok(None);
        };
        let size = self.read_7bit_continuation_integer(4)?
            .ok_or(Biff12Error::NoEnoughData(1, 0))?;
        self.buffer.clear();
        (&mut self.reader).take(size as u64).read_to_end(&mut self.buffer)?;
        if self.buffer.len() < size {
            Err(Biff12Error::NoEnoughData(size, self.buffer.len()))?
        }
        Ok(Some((kind as u16, size)))
    }

    /// Reads up to the next record of type `target`, stepping over any section that
    /// opens with the first type of a pair in `skips` until its closing type.
    /// Returns the size of the found record.
    pub(crate) fn find_with(&mut self, target: u16, skips: &[(u16, u16)]) -> Result<usize, RosterError> {
        let mut expected = target;
        loop {
            let (actual, size) = self.read()?
                .ok_or(Biff12Error::NoEnoughData(1, 0))?;
            if actual == expected && expected == target {
                return Ok(size);
            } else if actual == expected {
                expected = target;
            } else if let Some((_, ending)) = skips.iter().find(|(beginning, _)| actual == *beginning) {
                expected = *ending;
            }
        }
    }

    /// Reads up to the next record of type `target`.
    pub(crate) fn find(&mut self, target: u16) -> Result<usize, RosterError> {
        self.find_with(target, &[])
    }
}

#[macro_export]
macro_rules! match_biff12_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

/// Encodes one record with 7-bit continuation type and size, for building parts in tests.
#[cfg(test)]
pub(crate) fn record(kind: u16, payload: &[u8]) -> Vec<u8> {
    fn push_7bit(bytes: &mut Vec<u8>, mut value: usize) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                bytes.push(byte);
                break;
            }
            bytes.push(byte | 0x80);
        }
    }
    let mut bytes = Vec::new();
    push_7bit(&mut bytes, kind as usize);
    push_7bit(&mut bytes, payload.len());
    bytes.extend_from_slice(payload);
    bytes
}

/// Encodes a length-prefixed UTF-16 string as stored in records.
#[cfg(test)]
pub(crate) fn wide_string(value: &str) -> Vec<u8> {
    let units: Vec<u16> = value.encode_utf16().collect();
    let mut bytes = (units.len() as u32).to_le_bytes().to_vec();
    units.iter().for_each(|unit| bytes.extend_from_slice(&unit.to_le_bytes()));
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn records_with_long_types_and_sizes() {
        let mut stream = record(615, &[2, 0, 0, 0]);
        let mut format = vec![0xA4, 0x00];
        format.extend(wide_string("yyyy"));
        stream.extend(record(44, &format));
        stream.extend(record(7, &vec![0u8; 300]));
        assert_eq!(&stream[0..2], &[0xE7, 0x04]);

        let mut reader = Biff12Reader::new(Cursor::new(stream));
        assert_eq!(reader.read().unwrap(), Some((615, 4)));
        assert_eq!(reader.get_usize(0).unwrap(), 2);
        assert_eq!(reader.find(44).unwrap(), 14);
        assert_eq!(reader.get_u16(0).unwrap(), 164);
        assert_eq!(reader.get_style(0).unwrap(), 0x04_00A4);
        assert_eq!(reader.get_str(2).unwrap(), "yyyy");
        assert_eq!(reader.next().unwrap(), Some(7));
        assert_eq!(reader.buffer.len(), 300);
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn find_steps_over_sections() {
        let mut stream = record(35, &[]);
        stream.extend(record(19, &[1]));
        stream.extend(record(36, &[]));
        stream.extend(record(19, &[2]));
        let mut reader = Biff12Reader::new(Cursor::new(stream));
        reader.find_with(19, &[(35, 36)]).unwrap();
        assert_eq!(reader.get_u8(0).unwrap(), 2);
        assert!(reader.find(19).is_err());
    }

    #[test]
    fn malformed_records_are_errors() {
        let mut stream = record(6, &[0u8; 12]);
        stream.truncate(stream.len() - 2);
        let mut reader = Biff12Reader::new(Cursor::new(stream));
        assert!(reader.read().is_err());

        let mut reader = Biff12Reader::new(Cursor::new(record(6, &[0xFF, 0xFF, 0xFF, 0x7F, b'a', 0])));
        reader.next().unwrap();
        assert!(reader.get_str(0).is_err());
        assert!(reader.get_f64(0).is_err());
        assert!(reader.get_u8(6).is_err());

        let mut reader = Biff12Reader::new(Cursor::new(vec![0x80]));
        assert!(reader.read().is_err());
    }
}
