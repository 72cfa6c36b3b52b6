use std::fs;
use tracing::info;

use crate::context::ExecutableContext;
use crate::error::DeployerError;
use crate::notify::{Notifier, Tone};
use crate::paths::AppPaths;

pub const RESHADE_PRESET_INI: &str = "ReShadePreset.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetOutcome {
    NoTemplate,
    Copied,
    KeptExisting,
}

/// Copy the template preset into the game folder. An existing preset is only replaced
/// after the user agrees.
pub fn deploy_preset(
    paths: &AppPaths,
    ctx: &ExecutableContext,
    notifier: &dyn Notifier,
) -> Result<PresetOutcome, DeployerError> {
    if !paths.reshade_preset_ini.is_file() {
        return Ok(PresetOutcome::NoTemplate);
    }
    let target = ctx.directory.join(RESHADE_PRESET_INI);
    if target.exists() {
        let choice = notifier.ask(
            &format!(
                "{} already has a ReShadePreset.ini. Overwrite it with the preset from the deployer folder?",
                ctx.file_name
            ),
            "Overwrite preset?",
            "Overwrite",
            "Keep",
            Tone::Danger,
        );
        if !choice.is_primary() {
            return Ok(PresetOutcome::KeptExisting);
        }
    }
    fs::copy(&paths.reshade_preset_ini, &target)
        .map_err(|e| DeployerError::deployment(RESHADE_PRESET_INI, &ctx.directory, e))?;
    info!("Copied preset to {}", target.display());
    Ok(PresetOutcome::Copied)
}
