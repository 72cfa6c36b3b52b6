//! Pulls the ReShade libraries out of the vendor's self-extracting installer.
//!
//! The installer is a PE executable with a zip archive appended. Older installers wrapped
//! the payload in a nested archive stored as an entry named `[0]`.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::ArchiveError;
use crate::fs_linker::{is_file_locked, path_with_suffix, remove_file_if_exists};
use crate::paths::{RESHADE32_DLL, RESHADE64_DLL};

pub const ZIP_LOCAL_HEADER: [u8; 4] = *b"PK\x03\x04";
const LOCAL_HEADER_FIELDS: usize = 26;
const NESTED_ARCHIVE_ENTRY: &str = "[0]";

pub const REQUIRED_ENTRIES: [&str; 2] = [RESHADE32_DLL, RESHADE64_DLL];
/// Vulkan layer manifests, shipped next to the dlls by newer installers.
pub const OPTIONAL_ENTRIES: [&str; 2] = ["ReShade32.json", "ReShade64.json"];

/// Offsets of every local file header signature followed by plausible header fields.
pub fn embedded_zip_candidates(data: &[u8]) -> impl Iterator<Item = usize> + '_ {
    let mut from = 0;
    std::iter::from_fn(move || loop {
        let pos = from + twoway::find_bytes(data.get(from..)?, &ZIP_LOCAL_HEADER)?;
        from = pos + 1;
        let fields = data.get(pos + 4..pos + 4 + LOCAL_HEADER_FIELDS)?;
        if fields.iter().any(|&b| b != 0) {
            return Some(pos);
        }
    })
}

/// Start of the first archive embedded in `data`.
pub fn find_embedded_zip(data: &[u8]) -> Option<usize> {
    embedded_zip_candidates(data).next()
}

fn missing_entry<R: Read + io::Seek>(zip: &ZipArchive<R>) -> Option<&'static str> {
    REQUIRED_ENTRIES
        .into_iter()
        .find(|name| !zip.file_names().any(|n| n == *name))
}

/// Bytes of the archive that carries the ReShade libraries, wherever it sits in `data`.
pub fn locate_payload(data: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut missing = None;

    if let Ok(mut zip) = ZipArchive::new(Cursor::new(data)) {
        match missing_entry(&zip) {
            None => return Ok(data.to_vec()),
            Some(name) => missing = Some(name),
        }
        if let Ok(mut nested) = zip.by_name(NESTED_ARCHIVE_ENTRY) {
            let mut inner = Vec::with_capacity(nested.size() as usize);
            nested.read_to_end(&mut inner)?;
            let inner_missing = {
                let inner_zip = ZipArchive::new(Cursor::new(inner.as_slice()))?;
                missing_entry(&inner_zip)
            };
            match inner_missing {
                None => {
                    debug!("payload found in nested archive");
                    return Ok(inner);
                }
                Some(name) => missing = Some(name),
            }
        }
    }

    for offset in embedded_zip_candidates(data) {
        let slice = &data[offset..];
        let Ok(zip) = ZipArchive::new(Cursor::new(slice)) else { continue };
        match missing_entry(&zip) {
            None => {
                debug!("payload archive starts at offset {offset:#x}");
                return Ok(slice.to_vec());
            }
            Some(name) => missing = Some(name),
        }
    }

    Err(match missing {
        Some(name) => ArchiveError::MissingEntry(name.to_string()),
        None => ArchiveError::NoEmbeddedArchive,
    })
}

/// Put `contents` at `target` without ever exposing a half-written file. A target held
/// open by another process is renamed to `<name>.oldver` first.
pub(crate) fn install_file(target: &Path, contents: &mut impl Read) -> io::Result<()> {
    install_file_with(target, contents, is_file_locked)
}

fn install_file_with(target: &Path, contents: &mut impl Read, locked: impl Fn(&Path) -> bool) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let part = path_with_suffix(target, ".part");
    {
        let mut out = fs::File::create(&part)?;
        io::copy(contents, &mut out)?;
        out.sync_all()?;
    }
    if target.exists() && locked(target) {
        let aside = path_with_suffix(target, ".oldver");
        remove_file_if_exists(&aside)?;
        fs::rename(target, &aside)?;
        info!("{} is in use, moved it to {}", target.display(), aside.display());
    }
    fs::rename(&part, target)
}

/// Extract the libraries (and manifests when present) from `archive` into `dest`.
pub fn extract_entries(archive: &[u8], dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    if let Some(name) = missing_entry(&zip) {
        return Err(ArchiveError::MissingEntry(name.to_string()));
    }
    let mut written = Vec::new();
    for name in REQUIRED_ENTRIES.into_iter().chain(OPTIONAL_ENTRIES) {
        let mut entry = match zip.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => continue,
            Err(e) => return Err(e.into()),
        };
        let target = dest.join(name);
        install_file(&target, &mut entry)?;
        debug!("extracted {}", target.display());
        written.push(target);
    }
    Ok(written)
}

/// Extract every entry of the zip at `archive` below `root`, overwriting existing files.
pub fn extract_all(archive: &Path, root: &Path) -> Result<usize, ArchiveError> {
    let mut zip = ZipArchive::new(fs::File::open(archive)?)?;
    let mut count = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            debug!("skipping unsafe entry {}", entry.name());
            continue;
        };
        let target = root.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        install_file(&target, &mut entry)?;
        count += 1;
    }
    Ok(count)
}
