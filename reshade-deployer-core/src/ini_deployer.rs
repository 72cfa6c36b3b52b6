use std::path::PathBuf;
use tracing::info;

use crate::context::ExecutableContext;
use crate::error::DeployerError;
use crate::fs_linker::remove_file_if_exists;
use crate::ini::IniDocument;
use crate::paths::AppPaths;

pub const RESHADE_INI: &str = "ReShade.ini";

/// Apply the per-game keys on top of `doc`. Everything else in it is left alone.
pub fn apply_contextual_defaults(doc: &mut IniDocument, paths: &AppPaths, ctx: &ExecutableContext) {
    doc.set("GENERAL", "EffectSearchPaths", format!("{}\\**", paths.shaders.display()));
    doc.set("GENERAL", "TextureSearchPaths", format!("{}\\**", paths.textures.display()));
    doc.set("GENERAL", "IntermediateCachePath", paths.cache.display().to_string());
    doc.set("GENERAL", "PresetPath", ".\\ReShadePreset.ini");
    doc.set(
        "GENERAL",
        "PreprocessorDefinitions",
        format!(
            "RESHADE_DEPTH_LINEARIZATION_FAR_PLANE=1000.0,\
             RESHADE_DEPTH_INPUT_IS_UPSIDE_DOWN={},\
             RESHADE_DEPTH_INPUT_IS_REVERSED={},\
             RESHADE_DEPTH_INPUT_IS_LOGARITHMIC={}",
            ctx.depth_upside_down, ctx.depth_reversed, ctx.depth_logarithmic
        ),
    );
    doc.set("OVERLAY", "TutorialProgress", "4");
    doc.set("DEPTH", "DepthCopyBeforeClears", ctx.depth_copy_before_clears.clone());
    doc.set("DEPTH", "UseAspectRatioHeuristics", ctx.use_aspect_ratio_heuristics.clone());
}

/// Write `ReShade.ini` into the game folder, starting from the template next to the
/// deployer when there is one.
pub fn deploy_ini(paths: &AppPaths, ctx: &ExecutableContext) -> Result<PathBuf, DeployerError> {
    let target = ctx.directory.join(RESHADE_INI);
    let fail = |e| DeployerError::deployment(RESHADE_INI, &ctx.directory, e);

    remove_file_if_exists(&target).map_err(fail)?;
    let mut doc = if paths.reshade_ini.is_file() {
        IniDocument::load(&paths.reshade_ini).map_err(fail)?
    } else {
        IniDocument::new()
    };
    apply_contextual_defaults(&mut doc, paths, ctx);
    doc.save(&target, "").map_err(fail)?;
    info!("Wrote {}", target.display());
    Ok(target)
}
