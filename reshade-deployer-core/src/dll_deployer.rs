use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::{ExecutableContext, GraphicsApi};
use crate::error::DeployerError;
use crate::fs_linker::{entry_exists, is_link_into, rename_aside, SymlinkService};
use crate::paths::{AppPaths, RESHADE32_DLL, RESHADE64_DLL};
use crate::pe::read_version_info;
use crate::vulkan::VulkanDeployer;

/// Whether the file at `path` is a ReShade build we may delete: either a link into our own
/// library folders or a binary describing itself as ReShade.
pub fn is_own_library(path: &Path, library_dirs: &[&Path]) -> bool {
    if is_link_into(path, library_dirs) {
        return true;
    }
    read_version_info(path)
        .and_then(|info| info.file_description().map(|d| d.contains("ReShade")))
        .unwrap_or(false)
}

/// Links the right ReShade build into a game folder.
pub struct DllDeployer {
    paths: AppPaths,
    symlinks: Arc<dyn SymlinkService>,
    vulkan: VulkanDeployer,
}

impl DllDeployer {
    pub fn new(paths: AppPaths, symlinks: Arc<dyn SymlinkService>, vulkan: VulkanDeployer) -> Self {
        Self { paths, symlinks, vulkan }
    }

    pub fn vulkan(&self) -> &VulkanDeployer {
        &self.vulkan
    }

    /// Deploy for `api`. Vulkan registers system-wide; every other API gets a proxy dll
    /// symlink next to the game. Returns the link path, or `None` for Vulkan.
    pub fn deploy(
        &self,
        ctx: &ExecutableContext,
        api: GraphicsApi,
        addon_support: bool,
    ) -> Result<Option<PathBuf>, DeployerError> {
        let dll_dir = self.paths.dll_dir(addon_support);
        let Some(dll_name) = api.dll_name() else {
            self.vulkan.deploy_globally(dll_dir)?;
            return Ok(None);
        };

        let fail = |e: io::Error| DeployerError::deployment(dll_name, &ctx.directory, e);
        let link = ctx.directory.join(dll_name);
        let source = dll_dir.join(if ctx.is_x64 { RESHADE64_DLL } else { RESHADE32_DLL });
        if !source.is_file() {
            return Err(fail(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} has not been downloaded", source.display()),
            )));
        }

        if entry_exists(&link) {
            if is_own_library(&link, &self.paths.library_dirs()) {
                fs::remove_file(&link).map_err(fail)?;
                debug!("removed previous deployment {}", link.display());
            } else {
                let aside = rename_aside(&link, ".old").map_err(fail)?;
                info!("Kept existing {} as {}", link.display(), aside.display());
            }
        }

        self.symlinks.symlink_file(&source, &link).map_err(fail)?;
        info!("Linked {} -> {}", link.display(), source.display());
        Ok(Some(link))
    }
}
