use anyhow::Result;
use std::path::{Path, PathBuf};

pub const RESHADE32_DLL: &str = "ReShade32.dll";
pub const RESHADE64_DLL: &str = "ReShade64.dll";

/// Locations inside the application directory, plus the shared ProgramData folder used by
/// the Vulkan system-wide install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub root: PathBuf,
    pub shaders: PathBuf,
    pub textures: PathBuf,
    pub reshade_ini: PathBuf,
    pub reshade_preset_ini: PathBuf,
    pub lib: PathBuf,
    pub dlls: PathBuf,
    pub addon_dlls: PathBuf,
    pub cache: PathBuf,
    pub config_ini: PathBuf,
    pub compatibility_ini: PathBuf,
    pub logs: PathBuf,
    /// `C:\ProgramData\ReShade`, the same folder the official installer uses.
    pub common_local: PathBuf,
    /// `%LOCALAPPDATA%\ReShade`, only referenced to clean up older Vulkan installs.
    pub local_app_data: PathBuf,
}

impl AppPaths {
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let lib = root.join("lib");
        Self {
            shaders: root.join("Shaders"),
            textures: root.join("Textures"),
            reshade_ini: root.join("ReShade.ini"),
            reshade_preset_ini: root.join("ReShadePreset.ini"),
            dlls: lib.join("ReShade"),
            addon_dlls: lib.join("ReShade-AddonSupport"),
            cache: lib.join("Cache"),
            config_ini: lib.join("Config.ini"),
            compatibility_ini: lib.join("Compatibility.ini"),
            logs: lib.join("logs"),
            common_local: env_dir("ProgramData", r"C:\ProgramData").join("ReShade"),
            local_app_data: env_dir("LOCALAPPDATA", r"C:\Users\Default\AppData\Local").join("ReShade"),
            lib,
            root,
        }
    }

    /// Resolve the layout next to the running executable.
    pub fn from_current_exe() -> Result<Self> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .ok_or_else(|| anyhow::anyhow!("failed to resolve deployer directory"))?;
        Ok(Self::from_root(exe_dir))
    }

    /// Redirect the system-wide folders, used by tests and portable setups.
    pub fn with_system_dirs(mut self, common_local: impl Into<PathBuf>, local_app_data: impl Into<PathBuf>) -> Self {
        self.common_local = common_local.into();
        self.local_app_data = local_app_data.into();
        self
    }

    pub fn dll_dir(&self, addon_support: bool) -> &Path {
        if addon_support { &self.addon_dlls } else { &self.dlls }
    }

    pub fn library_dirs(&self) -> [&Path; 2] {
        [&self.dlls, &self.addon_dlls]
    }
}

fn env_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_application_folder_structure() {
        let p = AppPaths::from_root("/app");
        assert_eq!(p.dlls, Path::new("/app/lib/ReShade"));
        assert_eq!(p.addon_dlls, Path::new("/app/lib/ReShade-AddonSupport"));
        assert_eq!(p.compatibility_ini, Path::new("/app/lib/Compatibility.ini"));
        assert_eq!(p.reshade_preset_ini, Path::new("/app/ReShadePreset.ini"));
        assert_eq!(p.dll_dir(true), p.addon_dlls.as_path());
        assert_eq!(p.dll_dir(false), p.dlls.as_path());
    }
}
