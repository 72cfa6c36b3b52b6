use anyhow::{anyhow, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::compatibility::{CompatibilityDatabase, CompatibilityEntry};
use crate::pe::{BinaryInfo, PeImage, RT_RCDATA};
use crate::version_info::VersionInfo;

/// Resource id Unreal Engine's packaged-game bootstrapper uses for the path of the real
/// game executable (`IDI_EXEC_FILE`).
const UNREAL_BOOTSTRAP_RESOURCE: u32 = 201;
const NV_REMIX_DIR: &str = ".trex";
const NV_REMIX_BRIDGE: &str = "NvRemixBridge.exe";

/// A deployable graphics API. D3D8 titles deploy as D3D9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsApi {
    D3D9,
    DXGI,
    OpenGL,
    Vulkan,
}

impl GraphicsApi {
    pub const ALL: [GraphicsApi; 4] = [GraphicsApi::D3D9, GraphicsApi::DXGI, GraphicsApi::OpenGL, GraphicsApi::Vulkan];

    /// Name of the proxy dll placed next to the game. Vulkan installs system-wide instead.
    pub fn dll_name(self) -> Option<&'static str> {
        match self {
            GraphicsApi::D3D9 => Some("d3d9.dll"),
            GraphicsApi::DXGI => Some("dxgi.dll"),
            GraphicsApi::OpenGL => Some("opengl32.dll"),
            GraphicsApi::Vulkan => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GraphicsApi::D3D9 => "D3D9",
            GraphicsApi::DXGI => "DXGI",
            GraphicsApi::OpenGL => "OpenGL",
            GraphicsApi::Vulkan => "Vulkan",
        }
    }
}

impl fmt::Display for GraphicsApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ApiFlags {
    pub d3d8: bool,
    pub d3d9: bool,
    pub dxgi: bool,
    pub opengl: bool,
    pub vulkan: bool,
}

impl ApiFlags {
    /// Non-exclusive classification by case-insensitive module name prefix.
    pub fn from_modules<S: AsRef<str>>(modules: &[S]) -> Self {
        let mut flags = Self::default();
        for module in modules {
            let name = module.as_ref().to_ascii_lowercase();
            if name.starts_with("d3d8") {
                flags.d3d8 = true;
                flags.d3d9 = true;
            }
            if name.starts_with("d3d9") {
                flags.d3d9 = true;
            }
            if name.starts_with("dxgi") || name.starts_with("d3d1") || name.starts_with("gfsdk") {
                flags.dxgi = true;
            }
            if name.starts_with("opengl32") {
                flags.opengl = true;
            }
            if name.starts_with("vulkan-1") {
                flags.vulkan = true;
            }
        }
        flags
    }

    /// Flags for a `RenderApi` database value, `None` if the value is not recognized.
    pub fn from_render_api(value: &str) -> Option<Self> {
        let v = value.trim().to_ascii_lowercase();
        let mut flags = Self::default();
        match v.as_str() {
            "d3d8" => {
                flags.d3d8 = true;
                flags.d3d9 = true;
            }
            "d3d9" => flags.d3d9 = true,
            "dxgi" => flags.dxgi = true,
            _ if v.starts_with("d3d1") => flags.dxgi = true,
            "opengl" => flags.opengl = true,
            "vulkan" => flags.vulkan = true,
            _ => return None,
        }
        Some(flags)
    }
}

/// Everything needed to deploy into one game, resolved once per target selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableContext {
    pub file_name: String,
    pub directory: PathBuf,
    pub is_x64: bool,
    pub is_d3d8: bool,
    pub is_d3d9: bool,
    pub is_dxgi: bool,
    pub is_opengl: bool,
    pub is_vulkan: bool,
    pub depth_reversed: String,
    pub depth_upside_down: String,
    pub depth_logarithmic: String,
    pub depth_copy_before_clears: String,
    pub use_aspect_ratio_heuristics: String,
    pub modules: Vec<String>,
}

struct Defaults {
    depth_reversed: String,
    depth_upside_down: String,
    depth_logarithmic: String,
    depth_copy_before_clears: String,
    use_aspect_ratio_heuristics: String,
}

impl Defaults {
    fn heuristic(copyright_year: Option<u32>) -> Self {
        // Modern titles usually render with reversed depth.
        let reversed = matches!(copyright_year, Some(y) if y >= 2012);
        Self {
            depth_reversed: if reversed { "1" } else { "0" }.to_string(),
            depth_upside_down: "0".to_string(),
            depth_logarithmic: "0".to_string(),
            depth_copy_before_clears: "0".to_string(),
            use_aspect_ratio_heuristics: "1".to_string(),
        }
    }

    fn with_entry(mut self, entry: &CompatibilityEntry) -> Self {
        let pick = |slot: &mut String, value: &Option<String>| {
            if let Some(v) = value {
                *slot = v.clone();
            }
        };
        pick(&mut self.depth_reversed, &entry.depth_reversed);
        pick(&mut self.depth_upside_down, &entry.depth_upside_down);
        pick(&mut self.depth_logarithmic, &entry.depth_logarithmic);
        pick(&mut self.depth_copy_before_clears, &entry.depth_copy_before_clears);
        pick(&mut self.use_aspect_ratio_heuristics, &entry.use_aspect_ratio_heuristics);
        self
    }
}

fn split_location(path: &Path) -> Result<(String, PathBuf)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))?
        .to_string_lossy()
        .into_owned();
    let directory = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?
        .to_path_buf();
    Ok((file_name, directory))
}

/// Path from the bootstrap resource, relative to the launcher. Accepts either separator.
fn bootstrap_target(image: &PeImage<'_>, launcher_dir: &Path) -> Option<PathBuf> {
    let relative = image.resource_string(RT_RCDATA, UNREAL_BOOTSTRAP_RESOURCE)?;
    let mut target = launcher_dir.to_path_buf();
    for part in relative.split(['\\', '/']).filter(|p| !p.is_empty() && *p != ".") {
        target.push(part);
    }
    if target.is_file() {
        Some(target)
    } else {
        debug!("bootstrap target {} does not exist", target.display());
        None
    }
}

impl ExecutableContext {
    /// Resolve the deployment context for `executable`. Never fails: unreadable binaries
    /// and database problems degrade to heuristics with no detected API.
    pub fn resolve(executable: &Path, compatibility_ini: &Path) -> Self {
        match Self::try_resolve(executable, compatibility_ini) {
            Ok(ctx) => {
                info!(
                    "Resolved {} -> {} (x64: {}, api: {:?})",
                    executable.display(),
                    ctx.directory.display(),
                    ctx.is_x64,
                    ctx.preferred_api()
                );
                ctx
            }
            Err(e) => {
                warn!("Falling back to plain context for {}: {e:#}", executable.display());
                Self::fallback(executable)
            }
        }
    }

    fn try_resolve(executable: &Path, compatibility_ini: &Path) -> Result<Self> {
        let (mut file_name, mut directory) = split_location(executable)?;
        let bytes = std::fs::read(executable).unwrap_or_else(|e| {
            debug!("cannot read {}: {e}", executable.display());
            Vec::new()
        });
        let image = PeImage::parse(&bytes).ok();
        let binary = BinaryInfo::from_bytes(&bytes);
        let copyright_year = image
            .as_ref()
            .and_then(PeImage::version_info)
            .and_then(|v| v.copyright_year());

        if let Some(target) = image.as_ref().and_then(|img| bootstrap_target(img, &directory)) {
            info!("Bootstrap launcher redirects to {}", target.display());
            (file_name, directory) = split_location(&target)?;
        }

        let mut flags = ApiFlags::from_modules(binary.modules.as_slice());
        let mut is_x64 = binary.is_x64();
        let mut defaults = Defaults::heuristic(copyright_year);

        if compatibility_ini.is_file() {
            match CompatibilityDatabase::load(compatibility_ini) {
                Ok(db) => {
                    if let Some(entry) = db.entry(&file_name) {
                        debug!("compatibility entry for {file_name}: {entry:?}");
                        if let Some(sub) = &entry.install_target {
                            let candidate = directory.join(sub);
                            if candidate.is_dir() {
                                directory = candidate;
                            } else {
                                warn!("InstallTarget {} does not exist, ignoring", candidate.display());
                            }
                        }
                        if let Some(api) = &entry.render_api {
                            match ApiFlags::from_render_api(api) {
                                Some(f) => flags = f,
                                None => warn!("Unknown RenderApi '{api}' for {file_name}"),
                            }
                        }
                        defaults = defaults.with_entry(&entry);
                    }
                }
                Err(e) => warn!("{e:#}"),
            }
        }

        let remix_dir = directory.join(NV_REMIX_DIR);
        if remix_dir.join(NV_REMIX_BRIDGE).is_file() {
            info!("NVIDIA RTX Remix bridge detected, deploying into {}", remix_dir.display());
            flags = ApiFlags { vulkan: true, ..ApiFlags::default() };
            is_x64 = true;
            directory = remix_dir;
        }

        Ok(Self::assemble(file_name, directory, is_x64, flags, defaults, binary.modules))
    }

    /// Context derived from the path alone, with heuristic defaults and no detected API.
    pub fn fallback(executable: &Path) -> Self {
        let file_name = executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let directory = executable.parent().map(Path::to_path_buf).unwrap_or_default();
        let year = crate::pe::read_version_info(executable).as_ref().and_then(VersionInfo::copyright_year);
        Self::assemble(file_name, directory, false, ApiFlags::default(), Defaults::heuristic(year), Vec::new())
    }

    fn assemble(
        file_name: String,
        directory: PathBuf,
        is_x64: bool,
        flags: ApiFlags,
        defaults: Defaults,
        modules: Vec<String>,
    ) -> Self {
        Self {
            file_name,
            directory,
            is_x64,
            is_d3d8: flags.d3d8,
            is_d3d9: flags.d3d9,
            is_dxgi: flags.dxgi,
            is_opengl: flags.opengl,
            is_vulkan: flags.vulkan,
            depth_reversed: defaults.depth_reversed,
            depth_upside_down: defaults.depth_upside_down,
            depth_logarithmic: defaults.depth_logarithmic,
            depth_copy_before_clears: defaults.depth_copy_before_clears,
            use_aspect_ratio_heuristics: defaults.use_aspect_ratio_heuristics,
            modules,
        }
    }

    pub fn supports(&self, api: GraphicsApi) -> bool {
        match api {
            GraphicsApi::D3D9 => self.is_d3d9,
            GraphicsApi::DXGI => self.is_dxgi,
            GraphicsApi::OpenGL => self.is_opengl,
            GraphicsApi::Vulkan => self.is_vulkan,
        }
    }

    /// API to preselect when several were detected: Vulkan, then DXGI, D3D9, OpenGL.
    pub fn preferred_api(&self) -> Option<GraphicsApi> {
        [GraphicsApi::Vulkan, GraphicsApi::DXGI, GraphicsApi::D3D9, GraphicsApi::OpenGL]
            .into_iter()
            .find(|api| self.supports(*api))
    }
}

impl fmt::Display for ExecutableContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Target")?;
        writeln!(f, "    {} ({})", self.file_name, if self.is_x64 { "x64" } else { "x86" })?;
        writeln!(f)?;
        writeln!(f, "Deployment Path")?;
        writeln!(f, "    {}", self.directory.display())?;
        writeln!(f)?;
        writeln!(f, "Graphics APIs")?;
        for (flag, name) in [
            (self.is_d3d8, "D3D8"),
            (self.is_d3d9, "D3D9"),
            (self.is_dxgi, "DXGI"),
            (self.is_opengl, "OpenGL"),
            (self.is_vulkan, "Vulkan"),
        ] {
            if flag {
                writeln!(f, "    {name}")?;
            }
        }
        writeln!(f)?;
        writeln!(f, ".ini Defaults")?;
        writeln!(f, "    DepthReversed: {}", self.depth_reversed)?;
        writeln!(f, "    DepthUpsideDown: {}", self.depth_upside_down)?;
        writeln!(f, "    DepthLogarithmic: {}", self.depth_logarithmic)?;
        writeln!(f, "    DepthCopyBeforeClears: {}", self.depth_copy_before_clears)?;
        write!(f, "    UseAspectRatioHeuristics: {}", self.use_aspect_ratio_heuristics)?;
        if !self.modules.is_empty() {
            writeln!(f)?;
            writeln!(f)?;
            write!(f, "Modules")?;
            for module in &self.modules {
                write!(f, "\n    {module}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::PeBuilder;
    use std::fs;
    use tempfile::TempDir;

    fn no_db(dir: &TempDir) -> PathBuf {
        dir.path().join("Compatibility.ini")
    }

    #[test]
    fn dxgi_x64_title_from_2015_gets_reversed_depth() {
        let tmp = TempDir::new().unwrap();
        let exe = PeBuilder::new(true)
            .import("dxgi.dll")
            .version(&[("LegalCopyright", "Copyright 2015 Studio")], [1, 0, 0, 0])
            .write_to(&tmp.path().join("game").join("Game.exe"));

        let ctx = ExecutableContext::resolve(&exe, &no_db(&tmp));
        assert!(ctx.is_dxgi);
        assert!(!ctx.is_d3d8 && !ctx.is_d3d9 && !ctx.is_opengl && !ctx.is_vulkan);
        assert!(ctx.is_x64);
        assert_eq!(ctx.depth_reversed, "1");
        assert_eq!(ctx.depth_upside_down, "0");
        assert_eq!(ctx.use_aspect_ratio_heuristics, "1");
        assert_eq!(ctx.directory, tmp.path().join("game"));
        assert_eq!(ctx.preferred_api(), Some(GraphicsApi::DXGI));
    }

    #[test]
    fn adding_dxgi_only_flips_dxgi() {
        let base = ["KERNEL32.dll", "d3d9.dll", "USER32.dll"];
        let before = ApiFlags::from_modules(&base[..]);
        let mut with_dxgi = base.to_vec();
        with_dxgi.push("dxgi.dll");
        let after = ApiFlags::from_modules(&with_dxgi[..]);
        assert!(!before.dxgi && after.dxgi);
        assert_eq!(ApiFlags { dxgi: false, ..after }, before);
    }

    #[test]
    fn classification_is_case_insensitive_and_non_exclusive() {
        let flags = ApiFlags::from_modules(&["D3D8.DLL", "OPENGL32.dll", "GFSDK_SSAO.win64.dll", "vulkan-1.dll"][..]);
        assert_eq!(flags, ApiFlags { d3d8: true, d3d9: true, dxgi: true, opengl: true, vulkan: true });
        assert!(ApiFlags::from_modules(&["d3d12.dll"][..]).dxgi);
    }

    #[test]
    fn render_api_override_replaces_import_flags() {
        let tmp = TempDir::new().unwrap();
        let exe = PeBuilder::new(true).import("opengl32.dll").write_to(&tmp.path().join("Quake.exe"));
        let db = tmp.path().join("Compatibility.ini");
        fs::write(&db, "[Quake.exe]\nRenderApi=Vulkan\nDepthUpsideDown=1\n").unwrap();

        let ctx = ExecutableContext::resolve(&exe, &db);
        assert!(ctx.is_vulkan);
        assert!(!ctx.is_opengl);
        assert_eq!(ctx.depth_upside_down, "1");
        assert_eq!(ctx.depth_reversed, "0");
    }

    #[test]
    fn unknown_render_api_keeps_import_flags() {
        let tmp = TempDir::new().unwrap();
        let exe = PeBuilder::new(false).import("d3d9.dll").write_to(&tmp.path().join("Old.exe"));
        let db = tmp.path().join("Compatibility.ini");
        fs::write(&db, "[Old.exe]\nRenderApi=Glide\n").unwrap();

        let ctx = ExecutableContext::resolve(&exe, &db);
        assert!(ctx.is_d3d9);
        assert!(!ctx.is_x64);
    }

    #[test]
    fn redirects_apply_bootstrap_then_database_then_remix() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("MyGame");
        let real_dir = root.join("MyGame").join("Binaries").join("Win64");
        PeBuilder::new(true).import("d3d12.dll").write_to(&real_dir.join("MyGame-Win64-Shipping.exe"));
        let launcher = PeBuilder::new(true)
            .import("KERNEL32.dll")
            .utf16_resource(RT_RCDATA, UNREAL_BOOTSTRAP_RESOURCE, "MyGame\\Binaries\\Win64\\MyGame-Win64-Shipping.exe")
            .write_to(&root.join("MyGame.exe"));

        let db = tmp.path().join("Compatibility.ini");
        fs::write(&db, "[MyGame-Win64-Shipping.exe]\nInstallTarget=bin\n").unwrap();
        let bin = real_dir.join("bin");
        fs::create_dir_all(bin.join(NV_REMIX_DIR)).unwrap();

        let ctx = ExecutableContext::resolve(&launcher, &db);
        assert_eq!(ctx.file_name, "MyGame-Win64-Shipping.exe");
        assert_eq!(ctx.directory, bin);

        fs::write(bin.join(NV_REMIX_DIR).join(NV_REMIX_BRIDGE), b"").unwrap();
        let ctx = ExecutableContext::resolve(&launcher, &db);
        assert_eq!(ctx.directory, bin.join(NV_REMIX_DIR));
        assert!(ctx.is_vulkan && ctx.is_x64);
        assert!(!ctx.is_dxgi);
    }

    #[test]
    fn remix_bridge_makes_classification_vulkan_only() {
        let tmp = TempDir::new().unwrap();
        let exe = PeBuilder::new(false).import("d3d9.dll").write_to(&tmp.path().join("Classic.exe"));
        fs::create_dir_all(tmp.path().join(NV_REMIX_DIR)).unwrap();
        fs::write(tmp.path().join(NV_REMIX_DIR).join(NV_REMIX_BRIDGE), b"").unwrap();

        let ctx = ExecutableContext::resolve(&exe, &no_db(&tmp));
        assert!(ctx.is_vulkan);
        assert!(!ctx.is_d3d9);
        assert!(ctx.is_x64);
        assert_eq!(ctx.preferred_api(), Some(GraphicsApi::Vulkan));
    }

    #[test]
    fn missing_bootstrap_target_keeps_launcher() {
        let tmp = TempDir::new().unwrap();
        let launcher = PeBuilder::new(true)
            .import("dxgi.dll")
            .utf16_resource(RT_RCDATA, UNREAL_BOOTSTRAP_RESOURCE, "Gone\\Binaries\\Win64\\Gone.exe")
            .write_to(&tmp.path().join("Gone.exe"));
        let ctx = ExecutableContext::resolve(&launcher, &no_db(&tmp));
        assert_eq!(ctx.file_name, "Gone.exe");
        assert_eq!(ctx.directory, tmp.path());
    }

    #[test]
    fn non_pe_file_yields_no_api_and_heuristic_defaults() {
        let tmp = TempDir::new().unwrap();
        let exe = tmp.path().join("script.exe");
        fs::write(&exe, b"not a binary").unwrap();
        let ctx = ExecutableContext::resolve(&exe, &no_db(&tmp));
        assert_eq!(ctx.preferred_api(), None);
        assert!(!ctx.is_x64);
        assert_eq!(ctx.depth_reversed, "0");
        assert_eq!(ctx.directory, tmp.path());
    }

    #[test]
    fn report_lists_sections() {
        let tmp = TempDir::new().unwrap();
        let exe = PeBuilder::new(true).import("vulkan-1.dll").write_to(&tmp.path().join("Doom.exe"));
        let report = ExecutableContext::resolve(&exe, &no_db(&tmp)).to_string();
        assert!(report.starts_with("Target\n    Doom.exe (x64)"));
        assert!(report.contains("Graphics APIs\n    Vulkan\n"));
        assert!(report.contains("DepthReversed: 0"));
        assert!(report.ends_with("Modules\n    vulkan-1.dll"));
    }
}
