//! Replaces the running deployer with the latest GitHub release.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::archive::extract_all;
use crate::download::DownloadService;
use crate::elevation::{forwarded_arguments, relaunch_elevated};
use crate::error::DeployerError;
use crate::fs_linker::{path_with_suffix, remove_file_if_exists, RemoveOnDrop};
use crate::github::fetch_latest_release;
use crate::paths::AppPaths;

pub const UPDATE_ARCHIVE_NAME: &str = "ReShade-Deployer.zip";
const OLD_VERSION_SUFFIX: &str = ".oldver";
const CLEANUP_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Swap the application files for those in `archive`. The running executable cannot be
/// overwritten, so it is renamed to `<exe>.oldver` first; if extraction fails it is put
/// back.
pub fn install_release_archive(archive: &Path, root: &Path, current_exe: &Path) -> Result<usize, DeployerError> {
    let old_exe = path_with_suffix(current_exe, OLD_VERSION_SUFFIX);
    remove_file_if_exists(&old_exe).map_err(|source| DeployerError::SelfUpdate {
        stage: "remove the previous backup",
        source,
    })?;
    fs::rename(current_exe, &old_exe).map_err(|source| DeployerError::SelfUpdate {
        stage: "move the running executable aside",
        source,
    })?;

    match extract_all(archive, root) {
        Ok(count) => {
            info!("Extracted {count} file(s) into {}", root.display());
            Ok(count)
        }
        Err(e) => {
            if !current_exe.exists() {
                if let Err(restore) = fs::rename(&old_exe, current_exe) {
                    warn!("could not restore {}: {restore}", current_exe.display());
                }
            }
            Err(DeployerError::extraction(archive, e))
        }
    }
}

/// Download and install the latest release, then start it elevated with the same
/// target. The caller must exit right after this returns `Ok`.
pub async fn update_self(
    paths: &AppPaths,
    service: &DownloadService,
    current_exe: &Path,
    target: Option<&Path>,
    mut progress: impl FnMut(&str, u8),
) -> Result<(), DeployerError> {
    progress("Looking up the latest release", 0);
    let release = fetch_latest_release(service).await?;
    let url = release
        .archive_asset()
        .and_then(|a| a.browser_download_url.clone())
        .ok_or_else(|| DeployerError::UnexpectedResponse {
            url: crate::github::DEPLOYER_RELEASES_URL.to_string(),
            reason: "the latest release has no downloadable archive".to_string(),
        })?;
    info!("Updating to {}", release.version().unwrap_or_else(|| "unknown version".into()));

    let archive: PathBuf = paths.lib.join(UPDATE_ARCHIVE_NAME);
    service.download_to_file(&url, &archive, |m, p| progress(m, (u16::from(p) * 9 / 10) as u8)).await?;
    {
        let _cleanup = RemoveOnDrop(archive.clone());
        progress("Installing update", 92);
        install_release_archive(&archive, &paths.root, current_exe)?;
    }

    progress("Restarting", 100);
    relaunch_elevated(current_exe, &forwarded_arguments(target))
        .map_err(|source| DeployerError::SelfUpdate { stage: "start the new version", source })
}

fn remove_leftover(path: &Path) -> bool {
    match remove_file_if_exists(path) {
        Ok(_) => true,
        Err(e) => {
            debug!("could not remove {}: {e}", path.display());
            false
        }
    }
}

/// Startup housekeeping after an update or a locked-file extraction: deletes
/// `<exe>.oldver` and any `*.dll.oldver` in the library folders. The executable backup is
/// retried once, since the previous instance may still be shutting down.
pub async fn clean_up_old_version(paths: &AppPaths, current_exe: &Path) {
    let old_exe = path_with_suffix(current_exe, OLD_VERSION_SUFFIX);
    if !remove_leftover(&old_exe) {
        tokio::time::sleep(CLEANUP_RETRY_DELAY).await;
        remove_leftover(&old_exe);
    }

    for dir in paths.library_dirs() {
        let Ok(entries) = fs::read_dir(dir) else { continue };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            if name.ends_with(".dll.oldver") {
                remove_leftover(&entry.path());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::app_layout;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut w = zip::ZipWriter::new(file);
        for (name, data) in entries {
            w.start_file(*name, zip::write::FileOptions::default()).unwrap();
            w.write_all(data).unwrap();
        }
        w.finish().unwrap();
    }

    #[test]
    fn release_archive_replaces_running_executable() {
        let tmp = TempDir::new().unwrap();
        let paths = app_layout(tmp.path());
        let exe = paths.root.join("ReShade Deployer.exe");
        fs::write(&exe, b"old build").unwrap();
        let archive = paths.lib.join(UPDATE_ARCHIVE_NAME);
        write_zip(&archive, &[("ReShade Deployer.exe", b"new build"), ("Shaders/readme.txt", b"hi")]);

        install_release_archive(&archive, &paths.root, &exe).unwrap();
        assert_eq!(fs::read(&exe).unwrap(), b"new build");
        assert_eq!(fs::read(path_with_suffix(&exe, ".oldver")).unwrap(), b"old build");
        assert!(paths.shaders.join("readme.txt").is_file());
    }

    #[test]
    fn broken_archive_puts_executable_back() {
        let tmp = TempDir::new().unwrap();
        let paths = app_layout(tmp.path());
        let exe = paths.root.join("ReShade Deployer.exe");
        fs::write(&exe, b"old build").unwrap();
        let archive = paths.lib.join(UPDATE_ARCHIVE_NAME);
        fs::write(&archive, b"not a zip").unwrap();

        let err = install_release_archive(&archive, &paths.root, &exe).unwrap_err();
        assert!(matches!(err, DeployerError::Extraction { .. }));
        assert_eq!(fs::read(&exe).unwrap(), b"old build");
    }

    #[tokio::test]
    async fn startup_cleanup_removes_leftovers_only() {
        let tmp = TempDir::new().unwrap();
        let paths = app_layout(tmp.path());
        let exe = paths.root.join("ReShade Deployer.exe");
        fs::write(&exe, b"current").unwrap();
        fs::write(path_with_suffix(&exe, ".oldver"), b"previous").unwrap();
        fs::write(paths.dlls.join("ReShade64.dll.oldver"), b"locked").unwrap();
        fs::write(paths.addon_dlls.join("ReShade32.dll.oldver"), b"locked").unwrap();

        clean_up_old_version(&paths, &exe).await;

        assert!(exe.is_file());
        assert!(!path_with_suffix(&exe, ".oldver").exists());
        assert!(!paths.dlls.join("ReShade64.dll.oldver").exists());
        assert!(!paths.addon_dlls.join("ReShade32.dll.oldver").exists());
        assert!(paths.dlls.join("ReShade64.dll").is_file());
    }
}
