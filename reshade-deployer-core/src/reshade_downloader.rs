use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::archive::{extract_entries, locate_payload};
use crate::download::DownloadService;
use crate::error::{ArchiveError, DeployerError};
use crate::fs_linker::RemoveOnDrop;
use crate::paths::{AppPaths, RESHADE64_DLL};
use crate::pe::read_version_info;
use crate::version::extract_version;

pub const RESHADE_WEBSITE: &str = "https://reshade.me";
pub const COMPATIBILITY_INI_URL: &str =
    "https://raw.githubusercontent.com/crosire/reshade-shaders/list/Compatibility.ini";
/// Name the installer is saved under inside each library folder while it is unpacked.
pub const INSTALLER_TEMP_NAME: &str = "ReShade.exe";

static DOWNLOAD_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"/downloads/[^\s"'<>]+?\.exe"#).expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLinks {
    pub standard: String,
    pub addon: String,
}

impl DownloadLinks {
    pub fn version(&self) -> Option<String> {
        extract_version(&self.standard)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyUpToDate { version: String },
    Installed { version: Option<String> },
}

/// Installer links from the vendor's front page. The addon build is the one whose file
/// name ends in `_Addon.exe`.
pub fn parse_download_links(page: &str) -> Option<DownloadLinks> {
    let mut standard = None;
    let mut addon = None;
    for m in DOWNLOAD_LINK.find_iter(page) {
        let link = m.as_str();
        if link.ends_with("_Addon.exe") {
            addon.get_or_insert_with(|| link.to_string());
        } else {
            standard.get_or_insert_with(|| link.to_string());
        }
    }
    Some(DownloadLinks { standard: standard?, addon: addon? })
}

fn absolute_url(link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!("{RESHADE_WEBSITE}{link}")
    }
}

/// Folders the deployer expects next to its executable.
pub fn create_directories(paths: &AppPaths) -> std::io::Result<()> {
    for dir in [&paths.shaders, &paths.textures, &paths.dlls, &paths.addon_dlls, &paths.cache] {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Version of the cached 64-bit library, `None` when nothing has been downloaded yet.
pub fn local_version(paths: &AppPaths) -> Option<String> {
    read_version_info(&paths.dlls.join(RESHADE64_DLL))?.file_version_short()
}

pub async fn latest_online_version(service: &DownloadService) -> Result<Option<String>, DeployerError> {
    let page = service.get_text(RESHADE_WEBSITE).await?;
    Ok(parse_download_links(&page).and_then(|links| links.version()))
}

/// Unpack the libraries from a downloaded installer into `dest`. The installer is deleted
/// afterwards whether or not extraction worked.
pub fn extract_installer(installer: &Path, dest: &Path) -> Result<Vec<PathBuf>, DeployerError> {
    let _cleanup = RemoveOnDrop(installer.to_path_buf());
    let result: Result<Vec<PathBuf>, ArchiveError> = (|| {
        let data = fs::read(installer)?;
        let payload = locate_payload(&data)?;
        extract_entries(&payload, dest)
    })();
    result.map_err(|e| DeployerError::extraction(installer, e))
}

/// Best effort: a missing compatibility list only costs the per-game tweaks.
pub async fn download_compatibility_database(paths: &AppPaths, service: &DownloadService) {
    if let Err(e) = service.download_to_file(COMPATIBILITY_INI_URL, &paths.compatibility_ini, |_, _| {}).await {
        warn!("Compatibility list not updated: {}", e.details());
    }
}

/// Download both installer variants and refresh the cached libraries.
///
/// Returns early without downloading anything when the version on the website matches
/// the cached one. A failed variant does not stop the other; the first error is returned
/// once everything else has run.
pub async fn fetch_and_install(
    paths: &AppPaths,
    service: &DownloadService,
    mut progress: impl FnMut(&str, u8),
) -> Result<FetchOutcome, DeployerError> {
    progress("Checking for the latest ReShade version", 0);
    let page = service.get_text(RESHADE_WEBSITE).await?;
    let links = parse_download_links(&page).ok_or_else(|| DeployerError::UnexpectedResponse {
        url: RESHADE_WEBSITE.to_string(),
        reason: "no installer download links found".to_string(),
    })?;
    let online_version = links.version();

    if let (Some(online), Some(local)) = (&online_version, local_version(paths)) {
        if *online == local && paths.addon_dlls.join(RESHADE64_DLL).is_file() {
            info!("ReShade {local} is already up to date");
            return Ok(FetchOutcome::AlreadyUpToDate { version: local });
        }
    }

    create_directories(paths).map_err(|e| DeployerError::deployment("lib", &paths.lib, e))?;

    let mut first_error = None;
    let variants = [(links.standard.as_str(), false, 0u8), (links.addon.as_str(), true, 45u8)];
    for (link, addon, base) in variants {
        let url = absolute_url(link);
        let dest = paths.dll_dir(addon).to_path_buf();
        let installer = dest.join(INSTALLER_TEMP_NAME);
        let downloaded = service
            .download_to_file(&url, &installer, |m, p| progress(m, base + (u16::from(p) * 4 / 10) as u8))
            .await;
        if let Err(e) = downloaded {
            warn!("{}", e.details());
            first_error.get_or_insert(e);
            continue;
        }
        progress(&format!("Extracting {}", dest.display()), base + 42);
        match extract_installer(&installer, &dest) {
            Ok(files) => info!("Installed {} file(s) into {}", files.len(), dest.display()),
            Err(e) => {
                warn!("{}", e.details());
                first_error.get_or_insert(e);
            }
        }
    }

    progress("Downloading compatibility list", 92);
    download_compatibility_database(paths, service).await;

    if let Some(e) = first_error {
        return Err(e);
    }
    progress("ReShade is ready", 100);
    Ok(FetchOutcome::Installed { version: online_version })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::RT_VERSION;
    use crate::test_support::{app_layout, version_resource, PeBuilder};
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    const FRONT_PAGE: &str = r#"
        <a class="btn" href="/downloads/ReShade_Setup_6.3.3.exe">Download ReShade 6.3.3</a>
        <a class="btn" href="/downloads/ReShade_Setup_6.3.3_Addon.exe">with full add-on support</a>
        <a href="/downloads/ReShade_Setup_6.3.3.exe">mirror</a>
    "#;

    #[test]
    fn both_installer_links_are_found() {
        let links = parse_download_links(FRONT_PAGE).unwrap();
        assert_eq!(links.standard, "/downloads/ReShade_Setup_6.3.3.exe");
        assert_eq!(links.addon, "/downloads/ReShade_Setup_6.3.3_Addon.exe");
        assert_eq!(links.version().as_deref(), Some("6.3.3"));
        assert_eq!(absolute_url(&links.addon), "https://reshade.me/downloads/ReShade_Setup_6.3.3_Addon.exe");
        assert_eq!(parse_download_links("<html>maintenance</html>"), None);
    }

    #[test]
    fn local_version_reads_cached_library_metadata() {
        let tmp = TempDir::new().unwrap();
        let paths = app_layout(tmp.path());
        assert_eq!(local_version(&paths), None);

        PeBuilder::new(true)
            .resource(RT_VERSION, 1, version_resource(&[("FileVersion", "6.3.3.2075")], [6, 3, 3, 2075]))
            .write_to(&paths.dlls.join(RESHADE64_DLL));
        assert_eq!(local_version(&paths).as_deref(), Some("6.3.3"));
    }

    #[test]
    fn first_time_setup_creates_folder_structure() {
        let tmp = TempDir::new().unwrap();
        let paths = AppPaths::from_root(tmp.path().join("app"));
        create_directories(&paths).unwrap();
        for dir in [&paths.shaders, &paths.textures, &paths.dlls, &paths.addon_dlls, &paths.cache] {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
    }

    fn fake_installer() -> Vec<u8> {
        let mut data = PeBuilder::new(false).import("KERNEL32.dll").build();
        let mut buf = Cursor::new(Vec::new());
        {
            let mut w = zip::ZipWriter::new(&mut buf);
            for (name, body) in [("ReShade32.dll", b"new32"), ("ReShade64.dll", b"new64")] {
                w.start_file(name, zip::write::FileOptions::default()).unwrap();
                w.write_all(body).unwrap();
            }
            w.finish().unwrap();
        }
        data.extend_from_slice(&buf.into_inner());
        data
    }

    #[test]
    fn installer_is_unpacked_and_removed() {
        let tmp = TempDir::new().unwrap();
        let paths = app_layout(tmp.path());
        let installer = paths.addon_dlls.join(INSTALLER_TEMP_NAME);
        fs::write(&installer, fake_installer()).unwrap();

        let files = extract_installer(&installer, &paths.addon_dlls).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(fs::read(paths.addon_dlls.join("ReShade64.dll")).unwrap(), b"new64");
        assert!(!installer.exists());
    }

    #[test]
    fn corrupt_installer_is_an_extraction_error_and_still_removed() {
        let tmp = TempDir::new().unwrap();
        let paths = app_layout(tmp.path());
        let installer = paths.dlls.join(INSTALLER_TEMP_NAME);
        fs::write(&installer, PeBuilder::new(true).build()).unwrap();

        let err = extract_installer(&installer, &paths.dlls).unwrap_err();
        assert!(matches!(err, DeployerError::Extraction { .. }));
        assert!(!installer.exists());
        assert_eq!(fs::read(paths.dlls.join("ReShade64.dll")).unwrap(), b"reshade64");
    }
}
