//! Purpose: Test fixtures: synthetic PE images and an in-memory filesystem.
//! Exports: `ImageSpec`, `pe_image`, `write_library`, `FakeFs`, `FIXED_FILE_INFO_FILE_OFFSET`.
//! Role: Shared by unit tests and the integration suites under `tests/`.
//! Invariants: Images produced here parse with `core::image::parse_image_info`.
//! Invariants: `FakeFs` records every probe and version read in call order.
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};
use crate::core::image::{
    DOS_MAGIC, FIXED_FILE_INFO_SIGNATURE, Machine, PE_SIGNATURE, PE32_MAGIC, PE32_PLUS_MAGIC,
    RT_VERSION, VERSION_INFO_KEY,
};
use crate::core::search::FileProbe;
use crate::core::verify::VersionSource;
use crate::core::version::FileVersion;

const PE_OFFSET: usize = 0x40;
const OPTIONAL_OFFSET: usize = PE_OFFSET + 4 + 20;
const RESOURCE_FILE_OFFSET: usize = 0x200;
const RESOURCE_RVA: u32 = 0x1000;
const VERSION_BLOCK_OFFSET: usize = 88;
const VERSION_BLOCK_LEN: usize = 92;
const RT_ICON: u32 = 3;

/// File offset of `VS_FIXEDFILEINFO` inside images built by [`pe_image`].
pub const FIXED_FILE_INFO_FILE_OFFSET: usize = RESOURCE_FILE_OFFSET + VERSION_BLOCK_OFFSET + 40;

#[derive(Clone, Copy, Debug)]
pub struct ImageSpec {
    pub machine: Machine,
    pub file_version: FileVersion,
    pub product_version: FileVersion,
    pub version_resource: bool,
}

impl ImageSpec {
    pub fn new(file_version: FileVersion) -> Self {
        Self {
            machine: Machine::X64,
            file_version,
            product_version: file_version,
            version_resource: true,
        }
    }

    pub fn with_machine(mut self, machine: Machine) -> Self {
        self.machine = machine;
        self
    }

    pub fn with_product_version(mut self, version: FileVersion) -> Self {
        self.product_version = version;
        self
    }

    pub fn without_version_resource(mut self) -> Self {
        self.version_resource = false;
        self
    }
}

/// Builds a minimal single-section image whose only resource is a version block.
pub fn pe_image(spec: &ImageSpec) -> Vec<u8> {
    let mut buf = vec![0u8; 0x400];
    buf[0..2].copy_from_slice(&DOS_MAGIC);
    put_u32(&mut buf, 0x3C, PE_OFFSET as u32);
    buf[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(&PE_SIGNATURE);

    let pe32 = spec.machine == Machine::X86;
    let (magic, count_offset, optional_len) = if pe32 {
        (PE32_MAGIC, 92, 96 + 16 * 8)
    } else {
        (PE32_PLUS_MAGIC, 108, 112 + 16 * 8)
    };
    let coff = PE_OFFSET + 4;
    put_u16(&mut buf, coff, spec.machine.raw());
    put_u16(&mut buf, coff + 2, 1);
    put_u16(&mut buf, coff + 16, optional_len as u16);
    put_u16(&mut buf, OPTIONAL_OFFSET, magic);
    put_u32(&mut buf, OPTIONAL_OFFSET + count_offset, 16);
    let resource_size = (VERSION_BLOCK_OFFSET + VERSION_BLOCK_LEN) as u32;
    let directories = OPTIONAL_OFFSET + count_offset + 4;
    put_u32(&mut buf, directories + 2 * 8, RESOURCE_RVA);
    put_u32(&mut buf, directories + 2 * 8 + 4, resource_size);

    let section = OPTIONAL_OFFSET + optional_len;
    buf[section..section + 5].copy_from_slice(b".rsrc");
    put_u32(&mut buf, section + 8, resource_size);
    put_u32(&mut buf, section + 12, RESOURCE_RVA);
    put_u32(&mut buf, section + 16, 0x200);
    put_u32(&mut buf, section + 20, RESOURCE_FILE_OFFSET as u32);

    let root = RESOURCE_FILE_OFFSET;
    let type_id = if spec.version_resource { RT_VERSION } else { RT_ICON };
    // type -> name -> language -> data entry
    put_u16(&mut buf, root + 14, 1);
    put_u32(&mut buf, root + 16, type_id);
    put_u32(&mut buf, root + 20, 0x8000_0000 | 24);
    put_u16(&mut buf, root + 24 + 14, 1);
    put_u32(&mut buf, root + 40, 1);
    put_u32(&mut buf, root + 44, 0x8000_0000 | 48);
    put_u16(&mut buf, root + 48 + 14, 1);
    put_u32(&mut buf, root + 64, 0x0409);
    put_u32(&mut buf, root + 68, 72);
    put_u32(&mut buf, root + 72, RESOURCE_RVA + VERSION_BLOCK_OFFSET as u32);
    put_u32(&mut buf, root + 76, VERSION_BLOCK_LEN as u32);

    let block = root + VERSION_BLOCK_OFFSET;
    put_u16(&mut buf, block, VERSION_BLOCK_LEN as u16);
    put_u16(&mut buf, block + 2, 52);
    let mut cursor = block + 6;
    for unit in VERSION_INFO_KEY.encode_utf16().chain(std::iter::once(0)) {
        put_u16(&mut buf, cursor, unit);
        cursor += 2;
    }
    let fixed = block + 40;
    let (file_ms, file_ls) = spec.file_version.to_ms_ls();
    let (product_ms, product_ls) = spec.product_version.to_ms_ls();
    let fields = [
        FIXED_FILE_INFO_SIGNATURE,
        0x0001_0000,
        file_ms,
        file_ls,
        product_ms,
        product_ls,
        0x3F,
        0,
        0x0004_0004,
        2,
        0,
        0,
        0,
    ];
    for (index, value) in fields.into_iter().enumerate() {
        put_u32(&mut buf, fixed + index * 4, value);
    }
    buf
}

pub fn write_library(dir: &Path, file_name: &str, version: FileVersion) -> io::Result<PathBuf> {
    let path = dir.join(file_name);
    std::fs::write(&path, pe_image(&ImageSpec::new(version)))?;
    Ok(path)
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[derive(Clone, Debug)]
enum FakeEntry {
    Plain,
    Library(FileVersion),
    Unreadable,
}

/// In-memory [`FileProbe`] and [`VersionSource`].
#[derive(Debug, Default)]
pub struct FakeFs {
    files: HashMap<PathBuf, FakeEntry>,
    probes: RefCell<Vec<PathBuf>>,
    version_reads: RefCell<Vec<PathBuf>>,
}

impl FakeFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.insert(path.into(), FakeEntry::Plain);
        self
    }

    pub fn with_library(mut self, path: impl Into<PathBuf>, version: FileVersion) -> Self {
        self.files.insert(path.into(), FakeEntry::Library(version));
        self
    }

    pub fn with_unreadable(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.insert(path.into(), FakeEntry::Unreadable);
        self
    }

    pub fn probes(&self) -> Vec<PathBuf> {
        self.probes.borrow().clone()
    }

    pub fn version_reads(&self) -> Vec<PathBuf> {
        self.version_reads.borrow().clone()
    }
}

impl FileProbe for FakeFs {
    fn is_file(&self, path: &Path) -> bool {
        self.probes.borrow_mut().push(path.to_path_buf());
        self.files.contains_key(path)
    }
}

impl VersionSource for FakeFs {
    fn file_version(&self, path: &Path) -> Result<FileVersion, Error> {
        self.version_reads.borrow_mut().push(path.to_path_buf());
        match self.files.get(path) {
            Some(FakeEntry::Library(version)) => Ok(*version),
            Some(FakeEntry::Plain) | Some(FakeEntry::Unreadable) => Err(Error::new(
                ErrorKind::Corrupt,
            )
            .with_message("missing MZ header")
            .with_path(path)),
            None => Err(Error::new(ErrorKind::Io)
                .with_message("failed to open library image")
                .with_path(path)
                .with_source(io::Error::from(io::ErrorKind::NotFound))),
        }
    }
}
