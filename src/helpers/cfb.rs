//! OLE Compound File Binary (CFB) reader.
//! Legacy `.xls` workbooks live in its `Workbook` stream; password-protected
//! OOXML packages are wrapped in one as `EncryptedPackage`.

use crate::error::RosterError;
use crate::helpers::bytes::u16_at;
use crate::helpers::bytes::u64_at;
use crate::helpers::bytes::usize_at;
use crate::helpers::bytes::usize_iter;
use encoding_rs::UTF_16LE;
use std::borrow::Cow;
use std::collections::HashMap;
use thiserror::Error;

/// Signature of every compound file
pub(crate) const CFB_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const HEADER_SIZE: usize = 512;
/// Sector ids from here on are markers (end of chain, free, ...) rather than positions
const MAX_REG_SECT: usize = 0xFFFFFFFB;
const MINI_SECTOR_SIZE: usize = 64;
/// Streams smaller than this are stored in the mini stream
const MINI_STREAM_CUTOFF: usize = 4096;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const ROOT_ENTRY: &str = "root entry";

#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid Sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Sector '{0}' is outside the file")]
    SectorError(usize),

    #[error("Sector chain starting at '{0}' does not terminate")]
    SectorChainError(usize),

    #[error("The number of double indirect file allocation table error: expect '{0}', actual '{1}'")]
    DoubleIndirectFileAllocationTableError(usize, usize),

    #[error("The number of file allocation table error: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Stream '{0}' is truncated: expect '{1}' bytes, actual '{2}' bytes")]
    StreamSizeError(String, usize, usize),

    #[error("Empty Root directory")]
    RootDirectoryError,
}

/// A parsed compound file borrowing the uploaded bytes.
pub(crate) struct Cfb<'a> {
    /// Directory entries keyed by lowercase name; CFB names compare case-insensitively
    directories: HashMap<String, Directory>,
    file_allocation_table: Vec<usize>,
    sectors: Sectors<'a>,
    mini_file_allocation_table: Vec<usize>,
    mini_sectors: Sectors<'a>,
}

impl<'a> Cfb<'a> {
    /// Parses the header, allocation tables and directory of `data`.
    pub(crate) fn new(data: &'a [u8]) -> Result<Cfb<'a>, RosterError> {
        let header = Header::new(data)?;
        let sector_size = header.sector_size()?;
        // The header occupies the whole first sector, so sector 0 starts one sector in
        let sectors = Sectors { data: Cow::Borrowed(data), offset: sector_size, size: sector_size };
        let file_allocation_table = Self::load_file_allocation_table(&sectors, &header)?;
        let directories = Self::load_directories(&file_allocation_table, &sectors, &header)?;
        let mini_file_allocation_table = Self::load_mini_file_allocation_table(&file_allocation_table, &sectors, &header)?;
        let mut mini_stream = Vec::new();
        if let Some(root) = directories.get(ROOT_ENTRY) {
            mini_stream = read_chain(&file_allocation_table, &sectors, root.index)?;
            mini_stream.truncate(root.count);
        }
        let mini_sectors = Sectors { data: Cow::Owned(mini_stream), offset: 0, size: MINI_SECTOR_SIZE };

        Ok(Cfb {
            directories,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors,
        })
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.directories.contains_key(&name.to_lowercase())
    }

    /// Reads a whole stream, `None` if the file has no stream of that name.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, RosterError> {
        let Some(directory) = self.directories.get(&name.to_lowercase()) else {
            return Ok(None);
        };
        let mut bytes = if directory.count < MINI_STREAM_CUTOFF {
            read_chain(&self.mini_file_allocation_table, &self.mini_sectors, directory.index)?
        } else {
            read_chain(&self.file_allocation_table, &self.sectors, directory.index)?
        };
        if bytes.len() < directory.count {
            Err(CfbError::StreamSizeError(name.to_owned(), directory.count, bytes.len()))?
        }
        bytes.truncate(directory.count);
        Ok(Some(bytes))
    }

    /// Follows the double indirect table (header entries, then chained sectors) to every FAT sector.
    fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, RosterError> {
        let mut double_indirect_file_allocation_table: Vec<usize> = header.double_indirect_file_allocation_table.clone();

        let mut count = 0usize;
        let mut index = header.double_indirect_file_allocation_table_shift;
        while index < MAX_REG_SECT {
            if count >= header.double_indirect_file_allocation_table_count {
                Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_file_allocation_table_count, count + 1))?
            }
            double_indirect_file_allocation_table.extend(usize_iter(sectors.get(index)?));
            // The last entry of each chained sector points at the next one
            index = double_indirect_file_allocation_table.pop().ok_or(CfbError::FileFormatError)?;
            count += 1;
        }
        if count != header.double_indirect_file_allocation_table_count {
            Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_file_allocation_table_count, count))?
        }

        let mut file_allocation_table: Vec<usize> = Vec::new();
        let mut count = 0usize;
        for index in double_indirect_file_allocation_table {
            if index < MAX_REG_SECT {
                file_allocation_table.extend(usize_iter(sectors.get(index)?));
                count += 1;
            }
        }
        if count != header.file_allocation_table_count {
            Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count))?
        }
        Ok(file_allocation_table)
    }

    fn load_directories(file_allocation_table: &[usize], sectors: &Sectors, header: &Header) -> Result<HashMap<String, Directory>, RosterError> {
        let bytes = read_chain(file_allocation_table, sectors, header.directory_shift)?;
        let directories: HashMap<String, Directory> = bytes
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .filter_map(|entry| Directory::new(entry, header.major_version))
            .collect();
        if directories.is_empty() {
            Err(CfbError::RootDirectoryError)?
        }
        Ok(directories)
    }

    fn load_mini_file_allocation_table(file_allocation_table: &[usize], sectors: &Sectors, header: &Header) -> Result<Vec<usize>, RosterError> {
        if header.mini_file_allocation_table_sector_count == 0 {
            return Ok(Vec::new());
        }
        let bytes = read_chain(file_allocation_table, sectors, header.mini_file_allocation_table_sector_shift)?;
        Ok(usize_iter(&bytes).collect())
    }
}

/// Concatenates the sectors of the chain starting at `index`.
/// A chain longer than its table must loop, and is rejected.
fn read_chain(table: &[usize], sectors: &Sectors, index: usize) -> Result<Vec<u8>, RosterError> {
    let start = index;
    let mut content: Vec<u8> = Vec::new();
    let mut index = index;
    let mut visited = 0usize;
    while index < MAX_REG_SECT {
        if visited >= table.len() {
            Err(CfbError::SectorChainError(start))?
        }
        content.extend_from_slice(sectors.get(index)?);
        index = *table.get(index).ok_or(CfbError::SectorError(index))?;
        visited += 1;
    }
    Ok(content)
}

/// Fixed-size sectors laid out after `offset` bytes.
struct Sectors<'a> {
    data: Cow<'a, [u8]>,
    offset: usize,
    size: usize,
}

impl Sectors<'_> {
    /// The sector at `index`; the last sector of the file may be short.
    fn get(&self, index: usize) -> Result<&[u8], RosterError> {
        let lower = index
            .checked_mul(self.size)
            .and_then(|lower| lower.checked_add(self.offset))
            .filter(|lower| *lower < self.data.len())
            .ok_or(CfbError::SectorError(index))?;
        let upper = self.data.len().min(lower.saturating_add(self.size));
        Ok(&self.data[lower..upper])
    }
}

struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_shift: usize,
    mini_file_allocation_table_sector_shift: usize,
    mini_file_allocation_table_sector_count: usize,
    double_indirect_file_allocation_table_shift: usize,
    double_indirect_file_allocation_table_count: usize,
    /// The first 109 table entries, stored in the header itself
    double_indirect_file_allocation_table: Vec<usize>,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, RosterError> {
        if data.len() < HEADER_SIZE {
            Err(CfbError::FileFormatError)?
        }
        if !data.starts_with(CFB_SIGNATURE) {
            Err(CfbError::OleSignatureError)?
        }
        let short = |at: usize| u16_at(data, at).ok_or(CfbError::FileFormatError);
        let long = |at: usize| usize_at(data, at).ok_or(CfbError::FileFormatError);
        Ok(Header {
            major_version: short(26)?,
            sector_shift: short(30)?,
            file_allocation_table_count: long(44)?,
            directory_shift: long(48)?,
            mini_file_allocation_table_sector_shift: long(60)?,
            mini_file_allocation_table_sector_count: long(64)?,
            double_indirect_file_allocation_table_shift: long(68)?,
            double_indirect_file_allocation_table_count: long(72)?,
            double_indirect_file_allocation_table: usize_iter(&data[76..HEADER_SIZE]).collect(),
        })
    }

    fn sector_size(&self) -> Result<usize, RosterError> {
        match (self.major_version, self.sector_shift) {
            (3, 0x0009) => Ok(512),
            // Version 4 pads the header with zeroes up to a full 4096-byte sector
            (4, 0x000C) => Ok(4096),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift))?,
        }
    }
}

struct Directory {
    /// First sector of the stream
    index: usize,
    /// Stream size in bytes
    count: usize,
}

impl Directory {
    /// Decodes one 128-byte entry, `None` for unallocated slots.
    fn new(bytes: &[u8], major_version: u16) -> Option<(String, Directory)> {
        if *bytes.get(66)? == 0 {
            return None;
        }
        let size = (u16_at(bytes, 64)? as usize).min(64);
        let (name, _) = UTF_16LE.decode_without_bom_handling(bytes.get(..size)?);
        let name = name.split('\0').next().unwrap_or_default().to_lowercase();
        let index = usize_at(bytes, 116)?;
        // Version 3 writers may leave garbage in the high half of the size
        let count = if major_version == 3 {
            usize_at(bytes, 120)?
        } else {
            u64_at(bytes, 120)? as usize
        };
        Some((name, Directory { index, count }))
    }
}

/// Writes a version 3 compound file holding `streams`; small streams go to the mini stream.
#[cfg(test)]
pub(crate) fn build_compound_file(streams: &[(&str, &[u8])]) -> Vec<u8> {
    const SECTOR_SIZE: usize = 512;
    const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
    const FREE_SECT: u32 = 0xFFFF_FFFF;
    const FAT_SECT: u32 = 0xFFFF_FFFD;

    fn chain(data: &[u8], size: usize, pool: &mut Vec<u8>, table: &mut Vec<u32>) -> u32 {
        if data.is_empty() {
            return END_OF_CHAIN;
        }
        let start = table.len();
        let count = data.len().div_ceil(size);
        for offset in 0..count {
            table.push(if offset + 1 == count { END_OF_CHAIN } else { (start + offset + 1) as u32 });
        }
        pool.extend_from_slice(data);
        pool.resize(table.len() * size, 0);
        start as u32
    }
    let to_bytes = |values: &[u32]| values.iter().flat_map(|value| value.to_le_bytes()).collect::<Vec<u8>>();

    let mut body = Vec::new();
    let mut fat = Vec::new();
    let mut mini_stream = Vec::new();
    let mut mini_fat = Vec::new();
    let mut entries = Vec::new();
    for (name, data) in streams {
        let start = if data.len() < MINI_STREAM_CUTOFF {
            chain(data, MINI_SECTOR_SIZE, &mut mini_stream, &mut mini_fat)
        } else {
            chain(data, SECTOR_SIZE, &mut body, &mut fat)
        };
        entries.push((name.to_string(), 2u8, start, data.len()));
    }
    let root_size = mini_stream.len();
    let root_start = chain(&mini_stream, SECTOR_SIZE, &mut body, &mut fat);
    entries.insert(0, ("Root Entry".to_owned(), 5u8, root_start, root_size));
    let mini_fat_bytes = to_bytes(&mini_fat);
    let mini_fat_start = chain(&mini_fat_bytes, SECTOR_SIZE, &mut body, &mut fat);

    let mut directory = Vec::new();
    for (name, kind, start, size) in &entries {
        let mut entry = [0u8; DIRECTORY_ENTRY_SIZE];
        let encoded: Vec<u8> = name.encode_utf16().chain([0]).flat_map(|unit| unit.to_le_bytes()).collect();
        entry[..encoded.len()].copy_from_slice(&encoded);
        entry[64..66].copy_from_slice(&(encoded.len() as u16).to_le_bytes());
        entry[66] = *kind;
        entry[68..80].fill(0xFF);
        entry[116..120].copy_from_slice(&start.to_le_bytes());
        entry[120..128].copy_from_slice(&(*size as u64).to_le_bytes());
        directory.extend_from_slice(&entry);
    }
    let directory_start = chain(&directory, SECTOR_SIZE, &mut body, &mut fat);

    // FAT sectors go last and are listed in the FAT themselves
    let mut fat_sectors = 1usize;
    while (fat.len() + fat_sectors) * 4 > fat_sectors * SECTOR_SIZE {
        fat_sectors += 1;
    }
    let fat_start = fat.len();
    fat.extend(std::iter::repeat(FAT_SECT).take(fat_sectors));
    fat.resize(fat_sectors * SECTOR_SIZE / 4, FREE_SECT);
    body.extend(to_bytes(&fat));

    let mut file = vec![0u8; HEADER_SIZE];
    file[..8].copy_from_slice(CFB_SIGNATURE);
    file[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
    file[26..28].copy_from_slice(&3u16.to_le_bytes());
    file[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    file[30..32].copy_from_slice(&9u16.to_le_bytes());
    file[32..34].copy_from_slice(&6u16.to_le_bytes());
    file[44..48].copy_from_slice(&(fat_sectors as u32).to_le_bytes());
    file[48..52].copy_from_slice(&directory_start.to_le_bytes());
    file[56..60].copy_from_slice(&(MINI_STREAM_CUTOFF as u32).to_le_bytes());
    file[60..64].copy_from_slice(&mini_fat_start.to_le_bytes());
    file[64..68].copy_from_slice(&(mini_fat_bytes.len().div_ceil(SECTOR_SIZE) as u32).to_le_bytes());
    file[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    for slot in 0..109 {
        let value = if slot < fat_sectors { (fat_start + slot) as u32 } else { FREE_SECT };
        file[76 + slot * 4..80 + slot * 4].copy_from_slice(&value.to_le_bytes());
    }
    file.extend(body);
    file
}
