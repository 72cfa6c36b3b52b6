use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(windows)]
use std::os::windows::fs as winfs;

/// Creates file symbolic links. Kept behind a trait so deployment logic can be exercised
/// without symlink privileges.
pub trait SymlinkService: Send + Sync {
    /// Create `link` pointing at `target`.
    fn symlink_file(&self, target: &Path, link: &Path) -> io::Result<()>;
}

/// Symlinks through the host filesystem. On Windows this needs elevation or Developer Mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSymlinks;

impl SymlinkService for OsSymlinks {
    fn symlink_file(&self, target: &Path, link: &Path) -> io::Result<()> {
        #[cfg(windows)]
        {
            winfs::symlink_file(target, link)
        }
        #[cfg(not(windows))]
        {
            std::os::unix::fs::symlink(target, link)
        }
    }
}

/// True if anything (including a dangling symlink) occupies `path`.
pub fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// `path` with `suffix` appended to its full file name (`dxgi.dll` -> `dxgi.dll.old`).
pub fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// First free name among `<path><suffix>`, `<path><suffix>1`, `<path><suffix>2`, ...
pub fn unique_aside_path(path: &Path, suffix: &str) -> PathBuf {
    let mut candidate = path_with_suffix(path, suffix);
    let mut n = 1u32;
    while entry_exists(&candidate) {
        candidate = path_with_suffix(path, &format!("{suffix}{n}"));
        n += 1;
    }
    candidate
}

/// Move `path` out of the way without destroying it. Returns the new location.
pub fn rename_aside(path: &Path, suffix: &str) -> io::Result<PathBuf> {
    let aside = unique_aside_path(path, suffix);
    fs::rename(path, &aside)?;
    Ok(aside)
}

/// Delete a file or symlink; a missing entry is not an error. Returns whether anything
/// was removed.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Deletes a transient file when dropped, whatever happened in between.
pub(crate) struct RemoveOnDrop(pub PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if let Err(e) = remove_file_if_exists(&self.0) {
            tracing::warn!("failed to remove {}: {e}", self.0.display());
        }
    }
}

/// Whether `path` is a symlink whose target lies inside one of `dirs`.
pub fn is_link_into(path: &Path, dirs: &[&Path]) -> bool {
    let Ok(target) = fs::read_link(path) else { return false };
    let resolved = fs::canonicalize(&target).ok();
    dirs.iter().any(|dir| {
        target.starts_with(dir)
            || match (&resolved, fs::canonicalize(dir)) {
                (Some(t), Ok(d)) => t.starts_with(d),
                _ => false,
            }
    })
}

/// Whether another process holds `path` open in a way that blocks replacing it.
#[cfg(windows)]
pub fn is_file_locked(path: &Path) -> bool {
    use std::os::windows::fs::OpenOptionsExt;
    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;
    match fs::OpenOptions::new().read(true).write(true).share_mode(0).open(path) {
        Ok(_) => false,
        Err(e) => matches!(e.raw_os_error(), Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)),
    }
}

/// Unix lets open files be replaced, so nothing is ever locked.
#[cfg(not(windows))]
pub fn is_file_locked(_path: &Path) -> bool {
    false
}
