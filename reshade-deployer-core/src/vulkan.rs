use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::DeployerError;
use crate::fs_linker::{remove_file_if_exists, SymlinkService};
use crate::registry::{RegistryHive, RegistryService};

const IMPLICIT_LAYERS: &str = r"Software\Khronos\Vulkan\ImplicitLayers";
const IMPLICIT_LAYERS_WOW64: &str = r"Software\Wow6432Node\Khronos\Vulkan\ImplicitLayers";
const EXPLICIT_LAYERS: &str = r"Software\Khronos\Vulkan\ExplicitLayers";

const LAYERS: [&str; 2] = ["ReShade64", "ReShade32"];

/// Whether the host is 64-bit Windows, including a 32-bit build running under WOW64.
pub fn is_64bit_os() -> bool {
    cfg!(target_pointer_width = "64") || std::env::var_os("PROCESSOR_ARCHITEW6432").is_some()
}

/// Registers ReShade as a Vulkan implicit layer for every application on the machine.
pub struct VulkanDeployer {
    common_local: PathBuf,
    local_app_data: PathBuf,
    symlinks: Arc<dyn SymlinkService>,
    registry: Arc<dyn RegistryService>,
    wow64_node: bool,
}

impl VulkanDeployer {
    pub fn new(
        common_local: impl Into<PathBuf>,
        local_app_data: impl Into<PathBuf>,
        symlinks: Arc<dyn SymlinkService>,
        registry: Arc<dyn RegistryService>,
    ) -> Self {
        Self {
            common_local: common_local.into(),
            local_app_data: local_app_data.into(),
            symlinks,
            registry,
            wow64_node: is_64bit_os(),
        }
    }

    /// Override the WOW64 decision instead of asking the host.
    pub fn with_wow64_node(mut self, enabled: bool) -> Self {
        self.wow64_node = enabled;
        self
    }

    fn layer_key(&self, layer: &str) -> &'static str {
        if self.wow64_node && layer == "ReShade32" {
            IMPLICIT_LAYERS_WOW64
        } else {
            IMPLICIT_LAYERS
        }
    }

    fn manifest_link(&self, layer: &str) -> PathBuf {
        self.common_local.join(format!("{layer}.json"))
    }

    /// Link both layer variants from `dll_dir` into the shared folder and enable them.
    pub fn deploy_globally(&self, dll_dir: &Path) -> Result<(), DeployerError> {
        self.try_deploy(dll_dir).map_err(DeployerError::VulkanDeployment)
    }

    fn try_deploy(&self, dll_dir: &Path) -> io::Result<()> {
        for layer in LAYERS {
            for ext in ["dll", "json"] {
                let source = dll_dir.join(format!("{layer}.{ext}"));
                if !source.is_file() {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{} has not been downloaded", source.display()),
                    ));
                }
            }
        }
        self.remove_globally()?;
        fs::create_dir_all(&self.common_local)?;
        for layer in LAYERS {
            let dll_link = self.common_local.join(format!("{layer}.dll"));
            let json_link = self.manifest_link(layer);
            self.symlinks.symlink_file(&dll_dir.join(format!("{layer}.dll")), &dll_link)?;
            self.symlinks.symlink_file(&dll_dir.join(format!("{layer}.json")), &json_link)?;
            self.registry.set_dword(
                RegistryHive::LocalMachine,
                self.layer_key(layer),
                &json_link.to_string_lossy(),
                0,
            )?;
            debug!("registered Vulkan layer {}", json_link.display());
        }
        info!("Vulkan layers registered from {}", dll_dir.display());
        Ok(())
    }

    /// Remove the current install and every registration older releases left behind.
    /// Anything already absent is skipped.
    pub fn remove_globally(&self) -> io::Result<()> {
        let legacy = |parts: &[&str]| {
            let mut p = self.local_app_data.clone();
            p.extend(parts);
            p.to_string_lossy().into_owned()
        };
        let sub32 = legacy(&["ReShade32", "ReShade32.json"]);
        let sub64 = legacy(&["ReShade64", "ReShade64.json"]);

        let reg = &self.registry;
        reg.delete_value(RegistryHive::CurrentUser, EXPLICIT_LAYERS, &sub32)?;
        reg.delete_value(RegistryHive::CurrentUser, EXPLICIT_LAYERS, &sub64)?;
        for name in [
            legacy(&["ReShade.json"]),
            legacy(&["VkLayer_override.json"]),
            legacy(&["ReShade32_vk_override_layer.json"]),
            legacy(&["ReShade64_vk_override_layer.json"]),
            sub32.clone(),
            sub64.clone(),
        ] {
            reg.delete_value(RegistryHive::CurrentUser, IMPLICIT_LAYERS, &name)?;
        }
        reg.delete_value(RegistryHive::LocalMachine, IMPLICIT_LAYERS, &sub32)?;
        reg.delete_value(RegistryHive::LocalMachine, IMPLICIT_LAYERS, &sub64)?;
        reg.delete_value(RegistryHive::LocalMachine, IMPLICIT_LAYERS_WOW64, &sub32)?;

        for layer in LAYERS {
            let json_link = self.manifest_link(layer);
            remove_file_if_exists(&self.common_local.join(format!("{layer}.dll")))?;
            remove_file_if_exists(&json_link)?;
            reg.delete_value(RegistryHive::LocalMachine, self.layer_key(layer), &json_link.to_string_lossy())?;
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fs_linker::OsSymlinks;
    use crate::registry::{InMemoryRegistry, RegistryValue};
    use tempfile::TempDir;

    fn fixture(tmp: &TempDir) -> (VulkanDeployer, Arc<InMemoryRegistry>, PathBuf) {
        let dlls = tmp.path().join("lib").join("ReShade");
        fs::create_dir_all(&dlls).unwrap();
        for f in ["ReShade32.dll", "ReShade64.dll", "ReShade32.json", "ReShade64.json"] {
            fs::write(dlls.join(f), f).unwrap();
        }
        let registry = Arc::new(InMemoryRegistry::new());
        let deployer = VulkanDeployer::new(
            tmp.path().join("ProgramData").join("ReShade"),
            tmp.path().join("LocalAppData").join("ReShade"),
            Arc::new(OsSymlinks),
            registry.clone(),
        )
        .with_wow64_node(true);
        (deployer, registry, dlls)
    }

    #[test]
    fn deploying_twice_matches_deploying_once() {
        let tmp = TempDir::new().unwrap();
        let (deployer, registry, dlls) = fixture(&tmp);

        deployer.deploy_globally(&dlls).unwrap();
        let once = registry.snapshot();
        deployer.deploy_globally(&dlls).unwrap();
        assert_eq!(registry.snapshot(), once);
        assert_eq!(registry.value_count(), 2);

        let json64 = tmp.path().join("ProgramData").join("ReShade").join("ReShade64.json");
        let json32 = tmp.path().join("ProgramData").join("ReShade").join("ReShade32.json");
        assert_eq!(
            registry.value(RegistryHive::LocalMachine, IMPLICIT_LAYERS, &json64.to_string_lossy()),
            Some(RegistryValue::Dword(0))
        );
        assert_eq!(
            registry.value(RegistryHive::LocalMachine, IMPLICIT_LAYERS_WOW64, &json32.to_string_lossy()),
            Some(RegistryValue::Dword(0))
        );
        assert_eq!(fs::read_link(&json64).unwrap(), dlls.join("ReShade64.json"));
    }

    #[test]
    fn removal_clears_legacy_and_current_state() {
        let tmp = TempDir::new().unwrap();
        let (deployer, registry, dlls) = fixture(&tmp);
        let legacy = tmp.path().join("LocalAppData").join("ReShade").join("ReShade.json");
        registry
            .set_dword(RegistryHive::CurrentUser, IMPLICIT_LAYERS, &legacy.to_string_lossy(), 0)
            .unwrap();

        deployer.deploy_globally(&dlls).unwrap();
        assert_eq!(registry.value_count(), 2);

        deployer.remove_globally().unwrap();
        assert_eq!(registry.value_count(), 0);
        assert!(!tmp.path().join("ProgramData").join("ReShade").join("ReShade64.dll").exists());
        deployer.remove_globally().unwrap();
    }

    #[test]
    fn missing_layer_files_leave_registry_untouched() {
        let tmp = TempDir::new().unwrap();
        let (deployer, registry, dlls) = fixture(&tmp);
        deployer.deploy_globally(&dlls).unwrap();
        let before = registry.snapshot();

        let empty = tmp.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        let err = deployer.deploy_globally(&empty).unwrap_err();
        let DeployerError::VulkanDeployment(source) = err else { panic!("unexpected error {err:?}") };
        assert_eq!(source.kind(), io::ErrorKind::NotFound);
        assert_eq!(registry.snapshot(), before);

        fs::remove_file(dlls.join("ReShade32.json")).unwrap();
        assert!(deployer.deploy_globally(&dlls).is_err());
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn registry_failure_is_a_vulkan_error() {
        let tmp = TempDir::new().unwrap();
        let (_, _, dlls) = fixture(&tmp);
        let deployer = VulkanDeployer::new(
            tmp.path().join("ProgramData").join("ReShade"),
            tmp.path().join("LocalAppData").join("ReShade"),
            Arc::new(OsSymlinks),
            Arc::new(crate::registry::UnsupportedRegistry),
        );
        let err = deployer.deploy_globally(&dlls).unwrap_err();
        assert!(matches!(err, DeployerError::VulkanDeployment(_)));
    }
}
