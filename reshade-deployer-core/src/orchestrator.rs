use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::context::{ExecutableContext, GraphicsApi};
use crate::dll_deployer::DllDeployer;
use crate::error::DeployerError;
use crate::ini_deployer::deploy_ini;
use crate::notify::{Notifier, Tone};
use crate::paths::AppPaths;
use crate::preset_deployer::{deploy_preset, PresetOutcome};
use crate::settings::SettingsStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Deployed {
        /// The proxy dll that was linked, `None` for the system-wide Vulkan layer.
        dll: Option<PathBuf>,
        ini: PathBuf,
        preset: PresetOutcome,
        /// Whether the caller should close the application now.
        exit_after: bool,
    },
    Cancelled,
}

/// Runs one deployment against a resolved game: dll, then `ReShade.ini`, then the
/// preset. A failing step stops the sequence.
pub struct DeploymentOrchestrator {
    paths: AppPaths,
    dll: DllDeployer,
    settings: SettingsStore,
    notifier: Arc<dyn Notifier>,
}

impl DeploymentOrchestrator {
    pub fn new(paths: AppPaths, dll: DllDeployer, settings: SettingsStore, notifier: Arc<dyn Notifier>) -> Self {
        Self { paths, dll, settings, notifier }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn dll_deployer(&self) -> &DllDeployer {
        &self.dll
    }

    pub fn resolve(&self, executable: &Path) -> ExecutableContext {
        ExecutableContext::resolve(executable, &self.paths.compatibility_ini)
    }

    pub fn deploy(
        &self,
        ctx: &ExecutableContext,
        api: GraphicsApi,
        addon_support: bool,
    ) -> Result<DeployOutcome, DeployerError> {
        if !ctx.directory.is_dir() {
            return Err(DeployerError::deployment(
                ctx.file_name.as_str(),
                &ctx.directory,
                io::Error::new(io::ErrorKind::NotFound, "target folder does not exist"),
            ));
        }

        if api == GraphicsApi::Vulkan && addon_support {
            let choice = self.notifier.ask(
                "Add-on support for Vulkan is installed system-wide and affects every Vulkan game on this PC, \
                 including online games whose anti-cheat may not allow add-ons. Continue?",
                "Vulkan add-on support",
                "Continue",
                "Cancel",
                Tone::Caution,
            );
            if !choice.is_primary() {
                return Ok(DeployOutcome::Cancelled);
            }
        }

        if api == GraphicsApi::D3D9 && ctx.is_d3d8 {
            self.notifier.inform(
                &format!(
                    "{} uses Direct3D 8. ReShade only hooks it through a d3d8to9 wrapper, \
                     which has to be placed next to the game as d3d8.dll.",
                    ctx.file_name
                ),
                "Direct3D 8 game",
            );
        }

        info!("Deploying {api} to {}", ctx.directory.display());
        let dll = self.dll.deploy(ctx, api, addon_support)?;
        let ini = deploy_ini(&self.paths, ctx)?;
        let preset = deploy_preset(&self.paths, ctx, self.notifier.as_ref())?;

        Ok(DeployOutcome::Deployed { dll, ini, preset, exit_after: self.settings.always_exit_on_deploy() })
    }
}
