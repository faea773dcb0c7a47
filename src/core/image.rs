//! Purpose: Read the embedded version resource from a PE (DLL/EXE) image.
//! Exports: `ImageInfo`, `ImageFormat`, `Machine`, `read_image_info`, `parse_image_info`.
//! Role: Metadata reader behind the verifier; never loads or executes the image.
//! Invariants: Every offset read from the file is bounds-checked; malformed input is `Corrupt`.
//! Invariants: Only the first language of the first `RT_VERSION` entry is consulted.
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::version::FileVersion;

pub const DOS_MAGIC: [u8; 2] = *b"MZ";
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32_MAGIC: u16 = 0x10b;
pub const PE32_PLUS_MAGIC: u16 = 0x20b;
pub const RT_VERSION: u32 = 16;
pub const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
pub const VERSION_INFO_KEY: &str = "VS_VERSION_INFO";

const E_LFANEW_OFFSET: usize = 0x3C;
const COFF_HEADER_LEN: usize = 20;
const SECTION_HEADER_LEN: usize = 40;
const RESOURCE_DIRECTORY_INDEX: usize = 2;
const RESOURCE_DIR_LEN: usize = 16;
const RESOURCE_ENTRY_LEN: usize = 8;
const FIXED_FILE_INFO_LEN: usize = 52;
const HIGH_BIT: u32 = 0x8000_0000;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Machine {
    X86,
    X64,
    Arm64,
    Other(u16),
}

impl Machine {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x014C => Machine::X86,
            0x8664 => Machine::X64,
            0xAA64 => Machine::Arm64,
            other => Machine::Other(other),
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            Machine::X86 => 0x014C,
            Machine::X64 => 0x8664,
            Machine::Arm64 => 0xAA64,
            Machine::Other(raw) => raw,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ImageFormat {
    #[serde(rename = "pe32")]
    Pe32,
    #[serde(rename = "pe32+")]
    Pe32Plus,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct ImageInfo {
    pub machine: Machine,
    pub format: ImageFormat,
    pub file_version: FileVersion,
    pub product_version: FileVersion,
}

#[derive(Clone, Copy, Debug)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_size: u32,
    raw_offset: u32,
}

pub fn read_image_info(path: &Path) -> Result<ImageInfo, Error> {
    let file = File::open(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to open library image")
            .with_path(path)
            .with_source(err)
    })?;
    let len = file
        .metadata()
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to stat library image")
                .with_path(path)
                .with_source(err)
        })?
        .len();
    if len == 0 {
        return Err(corrupt("library image is empty").with_path(path));
    }
    // Read-only map; the image is never written through it.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to map library image")
            .with_path(path)
            .with_source(err)
    })?;
    parse_image_info(&mmap).map_err(|err| err.with_path(path))
}

pub fn parse_image_info(buf: &[u8]) -> Result<ImageInfo, Error> {
    if slice_at(buf, 0, 2).ok() != Some(&DOS_MAGIC[..]) {
        return Err(corrupt("missing MZ header"));
    }
    let pe_offset = read_u32(buf, E_LFANEW_OFFSET)? as usize;
    if slice_at(buf, pe_offset, 4).ok() != Some(&PE_SIGNATURE[..]) {
        return Err(corrupt("missing PE signature"));
    }

    let coff = pe_offset + 4;
    let machine = Machine::from_raw(read_u16(buf, coff)?);
    let section_count = read_u16(buf, coff + 2)? as usize;
    let optional_len = read_u16(buf, coff + 16)? as usize;

    let optional = coff + COFF_HEADER_LEN;
    let (format, count_offset) = match read_u16(buf, optional)? {
        PE32_MAGIC => (ImageFormat::Pe32, 92),
        PE32_PLUS_MAGIC => (ImageFormat::Pe32Plus, 108),
        _ => return Err(corrupt("unknown optional header magic")),
    };
    let directory_count = read_u32(buf, optional + count_offset)? as usize;
    if directory_count <= RESOURCE_DIRECTORY_INDEX {
        return Err(corrupt("image has no resource directory"));
    }
    let resource_entry = optional + count_offset + 4 + RESOURCE_DIRECTORY_INDEX * 8;
    if resource_entry + 8 > optional + optional_len {
        return Err(corrupt("resource directory lies outside the optional header"));
    }
    let resource_rva = read_u32(buf, resource_entry)?;
    if resource_rva == 0 {
        return Err(corrupt("image has no resources"));
    }

    let sections = read_sections(buf, optional + optional_len, section_count)?;
    let root = rva_to_offset(&sections, resource_rva, buf.len())?;
    let block = find_version_block(buf, &sections, root)?;
    let fixed = fixed_file_info(block)?;

    Ok(ImageInfo {
        machine,
        format,
        file_version: FileVersion::from_ms_ls(read_u32(fixed, 8)?, read_u32(fixed, 12)?),
        product_version: FileVersion::from_ms_ls(read_u32(fixed, 16)?, read_u32(fixed, 20)?),
    })
}

fn read_sections(buf: &[u8], table: usize, count: usize) -> Result<Vec<Section>, Error> {
    let mut sections = Vec::with_capacity(count);
    for index in 0..count {
        let base = table + index * SECTION_HEADER_LEN;
        sections.push(Section {
            virtual_size: read_u32(buf, base + 8)?,
            virtual_address: read_u32(buf, base + 12)?,
            raw_size: read_u32(buf, base + 16)?,
            raw_offset: read_u32(buf, base + 20)?,
        });
    }
    Ok(sections)
}

fn rva_to_offset(sections: &[Section], rva: u32, len: usize) -> Result<usize, Error> {
    for section in sections {
        let span = section.virtual_size.max(section.raw_size);
        let start = section.virtual_address;
        if rva >= start && u64::from(rva) < u64::from(start) + u64::from(span) {
            let offset = section.raw_offset as usize + (rva - start) as usize;
            if offset >= len {
                return Err(corrupt("section data lies past end of file"));
            }
            return Ok(offset);
        }
    }
    Err(corrupt("address is not mapped by any section"))
}

fn find_version_block<'a>(
    buf: &'a [u8],
    sections: &[Section],
    root: usize,
) -> Result<&'a [u8], Error> {
    let by_type = find_id_entry(buf, root, RT_VERSION)?
        .ok_or_else(|| corrupt("image has no version resource"))?;
    let by_name = first_entry(buf, root, expect_directory(by_type)?)?;
    let by_language = first_entry(buf, root, expect_directory(by_name)?)?;
    if by_language & HIGH_BIT != 0 {
        return Err(corrupt("version resource nests too deep"));
    }

    let data_entry = root + by_language as usize;
    let data_rva = read_u32(buf, data_entry)?;
    let data_len = read_u32(buf, data_entry + 4)? as usize;
    let start = rva_to_offset(sections, data_rva, buf.len())?;
    slice_at(buf, start, data_len).map_err(|_| corrupt("version resource runs past end of file"))
}

fn expect_directory(entry_data: u32) -> Result<usize, Error> {
    if entry_data & HIGH_BIT == 0 {
        return Err(corrupt("expected a resource subdirectory"));
    }
    Ok((entry_data & !HIGH_BIT) as usize)
}

fn find_id_entry(buf: &[u8], dir: usize, id: u32) -> Result<Option<u32>, Error> {
    let named = read_u16(buf, dir + 12)? as usize;
    let ids = read_u16(buf, dir + 14)? as usize;
    for index in named..named + ids {
        let entry = dir + RESOURCE_DIR_LEN + index * RESOURCE_ENTRY_LEN;
        if read_u32(buf, entry)? == id {
            return Ok(Some(read_u32(buf, entry + 4)?));
        }
    }
    Ok(None)
}

fn first_entry(buf: &[u8], root: usize, relative: usize) -> Result<u32, Error> {
    let dir = root + relative;
    let total = read_u16(buf, dir + 12)? as usize + read_u16(buf, dir + 14)? as usize;
    if total == 0 {
        return Err(corrupt("empty resource directory"));
    }
    read_u32(buf, dir + RESOURCE_DIR_LEN + 4)
}

fn fixed_file_info(block: &[u8]) -> Result<&[u8], Error> {
    let length = read_u16(block, 0)? as usize;
    let value_len = read_u16(block, 2)? as usize;
    if length > block.len() {
        return Err(corrupt("version block length exceeds resource size"));
    }
    if value_len < FIXED_FILE_INFO_LEN {
        return Err(corrupt("version block carries no fixed file info"));
    }

    let mut key = String::new();
    let mut cursor = 6;
    loop {
        let unit = read_u16(block, cursor)?;
        cursor += 2;
        if unit == 0 {
            break;
        }
        key.push(char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER));
        if key.len() > VERSION_INFO_KEY.len() {
            break;
        }
    }
    if key != VERSION_INFO_KEY {
        return Err(corrupt("version block key is not VS_VERSION_INFO"));
    }

    let value = align4(cursor);
    let fixed = slice_at(block, value, FIXED_FILE_INFO_LEN)
        .map_err(|_| corrupt("fixed file info truncated"))?;
    if read_u32(fixed, 0)? != FIXED_FILE_INFO_SIGNATURE {
        return Err(corrupt("bad fixed file info signature"));
    }
    Ok(fixed)
}

fn align4(value: usize) -> usize {
    (value + 3) & !3
}

fn corrupt(message: &str) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(message)
}

fn slice_at(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], Error> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or_else(|| corrupt("image truncated"))
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, Error> {
    let bytes = slice_at(buf, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, Error> {
    let bytes = slice_at(buf, offset, 4)?;
    let mut out = [0u8; 4];
    out.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(out))
}
