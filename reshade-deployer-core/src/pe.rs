//! Read-only inspection of Windows PE images.
//!
//! Everything here works on raw file bytes: the image is never mapped or executed. All
//! offsets coming from the file are bounds-checked, a malformed image yields `PeError`
//! instead of panicking.

use byteorder::{ByteOrder, LittleEndian};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::version_info::VersionInfo;

pub const IMAGE_FILE_MACHINE_I386: u16 = 0x014c;
pub const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;

pub const RT_RCDATA: u32 = 10;
pub const RT_VERSION: u32 = 16;

const DIRECTORY_IMPORT: usize = 1;
const DIRECTORY_RESOURCE: usize = 2;
const IMPORT_DESCRIPTOR_SIZE: usize = 20;
const MAX_IMPORTS: usize = 4096;
const MAX_NAME_LEN: usize = 260;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeError {
    #[error("missing MZ signature")]
    NotMz,
    #[error("missing PE signature")]
    NotPe,
    #[error("unknown optional header magic {0:#x}")]
    BadMagic(u16),
    #[error("image truncated at offset {0:#x}")]
    Truncated(usize),
}

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_size: u32,
    raw_pointer: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct DataDirectory {
    rva: u32,
    size: u32,
}

/// A parsed view over the bytes of a PE file.
pub struct PeImage<'a> {
    data: &'a [u8],
    machine: u16,
    headers_size: usize,
    sections: Vec<Section>,
    directories: Vec<DataDirectory>,
}

fn u16_at(data: &[u8], off: usize) -> Result<u16, PeError> {
    field(data, off, 2).map(LittleEndian::read_u16).ok_or(PeError::Truncated(off))
}

fn u32_at(data: &[u8], off: usize) -> Result<u32, PeError> {
    field(data, off, 4).map(LittleEndian::read_u32).ok_or(PeError::Truncated(off))
}

fn field(data: &[u8], off: usize, len: usize) -> Option<&[u8]> {
    data.get(off..off.checked_add(len)?)
}

impl<'a> PeImage<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, PeError> {
        if data.get(0..2) != Some(b"MZ") {
            return Err(PeError::NotMz);
        }
        let pe_off = u32_at(data, 0x3c)? as usize;
        if field(data, pe_off, 4) != Some(b"PE\0\0") {
            return Err(PeError::NotPe);
        }
        let coff = pe_off + 4;
        let machine = u16_at(data, coff)?;
        let section_count = u16_at(data, coff + 2)? as usize;
        let optional_size = u16_at(data, coff + 16)? as usize;
        let optional = coff + 20;

        let magic = u16_at(data, optional)?;
        let (count_off, dirs_off) = match magic {
            0x10b => (optional + 92, optional + 96),
            0x20b => (optional + 108, optional + 112),
            other => return Err(PeError::BadMagic(other)),
        };
        let dir_count = (u32_at(data, count_off)? as usize).min(16);
        let mut directories = Vec::with_capacity(dir_count);
        for i in 0..dir_count {
            let off = dirs_off + i * 8;
            directories.push(DataDirectory { rva: u32_at(data, off)?, size: u32_at(data, off + 4)? });
        }

        let table = optional + optional_size;
        let mut sections = Vec::with_capacity(section_count);
        for i in 0..section_count {
            let off = table + i * 40;
            sections.push(Section {
                virtual_size: u32_at(data, off + 8)?,
                virtual_address: u32_at(data, off + 12)?,
                raw_size: u32_at(data, off + 16)?,
                raw_pointer: u32_at(data, off + 20)?,
            });
        }
        let headers_size = table + section_count * 40;

        Ok(Self { data, machine, headers_size, sections, directories })
    }

    pub fn machine(&self) -> u16 {
        self.machine
    }

    pub fn is_x64(&self) -> bool {
        self.machine == IMAGE_FILE_MACHINE_AMD64
    }

    fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        if (rva as usize) < self.headers_size {
            return Some(rva as usize);
        }
        self.sections.iter().find_map(|s| {
            let span = s.virtual_size.max(s.raw_size);
            let delta = rva.checked_sub(s.virtual_address)?;
            if delta < span && delta < s.raw_size {
                let off = s.raw_pointer as usize + delta as usize;
                (off < self.data.len()).then_some(off)
            } else {
                None
            }
        })
    }

    fn directory(&self, index: usize) -> Option<DataDirectory> {
        self.directories.get(index).copied().filter(|d| d.rva != 0)
    }

    fn c_string_at_rva(&self, rva: u32) -> Option<String> {
        let off = self.rva_to_offset(rva)?;
        let bytes = self.data.get(off..)?;
        let end = bytes.iter().take(MAX_NAME_LEN).position(|&b| b == 0)?;
        let name = std::str::from_utf8(&bytes[..end]).ok()?;
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Names of the statically imported modules, in descriptor order.
    pub fn imported_modules(&self) -> Result<Vec<String>, PeError> {
        let Some(dir) = self.directory(DIRECTORY_IMPORT) else { return Ok(Vec::new()) };
        let start = self.rva_to_offset(dir.rva).ok_or(PeError::Truncated(dir.rva as usize))?;
        let mut modules = Vec::new();
        for i in 0..MAX_IMPORTS {
            let off = start + i * IMPORT_DESCRIPTOR_SIZE;
            let desc = field(self.data, off, IMPORT_DESCRIPTOR_SIZE).ok_or(PeError::Truncated(off))?;
            if desc.iter().all(|&b| b == 0) {
                break;
            }
            let name_rva = LittleEndian::read_u32(&desc[12..16]);
            if let Some(name) = self.c_string_at_rva(name_rva) {
                modules.push(name);
            }
        }
        Ok(modules)
    }

    /// Raw bytes of resource `type_id`/`name_id`, first language found.
    pub fn resource(&self, type_id: u32, name_id: u32) -> Option<&'a [u8]> {
        let dir = self.directory(DIRECTORY_RESOURCE)?;
        let base = self.rva_to_offset(dir.rva)?;
        let by_type = self.resource_child(base, 0, Some(type_id))?;
        let by_name = self.resource_child(base, by_type, Some(name_id))?;
        let language = self.resource_child(base, by_name, None)?;
        // Leaf: data entry rather than another directory.
        let entry = base + language;
        let data_rva = u32_at(self.data, entry).ok()?;
        let size = u32_at(self.data, entry + 4).ok()? as usize;
        let off = self.rva_to_offset(data_rva)?;
        self.data.get(off..off.checked_add(size)?)
    }

    /// Find the entry with `id` (or the first entry) in the directory at `dir_off`.
    /// Returns the offset of the child relative to the resource section start.
    fn resource_child(&self, base: usize, dir_off: usize, id: Option<u32>) -> Option<usize> {
        let dir = base + dir_off;
        let named = u16_at(self.data, dir + 12).ok()? as usize;
        let ids = u16_at(self.data, dir + 14).ok()? as usize;
        (0..named + ids).find_map(|i| {
            let entry = dir + 16 + i * 8;
            let name = u32_at(self.data, entry).ok()?;
            let target = u32_at(self.data, entry + 4).ok()?;
            let matches = match id {
                Some(want) => name & 0x8000_0000 == 0 && name == want,
                None => true,
            };
            matches.then_some((target & 0x7fff_ffff) as usize)
        })
    }

    pub fn version_info(&self) -> Option<VersionInfo> {
        VersionInfo::parse(self.resource(RT_VERSION, 1)?)
    }

    /// Resource holding a NUL-terminated UTF-16 string, as Unreal's bootstrap launcher uses.
    pub fn resource_string(&self, type_id: u32, name_id: u32) -> Option<String> {
        let bytes = self.resource(type_id, name_id)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .take_while(|&u| u != 0)
            .collect();
        let s = String::from_utf16(&units).ok()?;
        let s = s.trim().to_string();
        (!s.is_empty()).then_some(s)
    }
}

/// What could be learned about an executable. Missing information is a normal outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryInfo {
    pub machine: Option<u16>,
    pub modules: Vec<String>,
}

impl BinaryInfo {
    pub fn from_bytes(data: &[u8]) -> Self {
        match PeImage::parse(data) {
            Ok(pe) => {
                let modules = pe.imported_modules().unwrap_or_else(|e| {
                    debug!("import table unreadable: {e}");
                    Vec::new()
                });
                Self { machine: Some(pe.machine()), modules }
            }
            Err(e) => {
                debug!("not a PE image: {e}");
                Self::default()
            }
        }
    }

    pub fn is_x64(&self) -> bool {
        self.machine == Some(IMAGE_FILE_MACHINE_AMD64)
    }
}

/// Inspect the executable at `path`. Never fails: unreadable or foreign files produce an
/// empty `BinaryInfo`.
pub fn inspect(path: &Path) -> BinaryInfo {
    match std::fs::read(path) {
        Ok(data) => BinaryInfo::from_bytes(&data),
        Err(e) => {
            debug!("cannot read {}: {e}", path.display());
            BinaryInfo::default()
        }
    }
}

/// Version resource of the file at `path`, if it has one.
pub fn read_version_info(path: &Path) -> Option<VersionInfo> {
    let data = std::fs::read(path).ok()?;
    PeImage::parse(&data).ok()?.version_info()
}
