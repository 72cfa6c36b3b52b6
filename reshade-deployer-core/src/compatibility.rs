use anyhow::{Context, Result};
use std::path::Path;

use crate::ini::IniDocument;

/// Per-title overrides from `Compatibility.ini`. Every field is optional; absent fields
/// fall back to heuristics during context resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityEntry {
    pub install_target: Option<String>,
    pub render_api: Option<String>,
    pub depth_reversed: Option<String>,
    pub depth_upside_down: Option<String>,
    pub depth_logarithmic: Option<String>,
    pub depth_copy_before_clears: Option<String>,
    pub use_aspect_ratio_heuristics: Option<String>,
}

/// Section-per-executable database, keyed by exact file name.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityDatabase {
    doc: IniDocument,
}

impl CompatibilityDatabase {
    pub fn parse(text: &str) -> Self {
        Self { doc: IniDocument::parse(text) }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let doc = IniDocument::load(path)
            .with_context(|| format!("failed to read compatibility database {}", path.display()))?;
        Ok(Self { doc })
    }

    /// Entry for `file_name`, `None` when the title has no section.
    pub fn entry(&self, file_name: &str) -> Option<CompatibilityEntry> {
        if !self.doc.has_section(file_name) {
            return None;
        }
        let get = |key: &str| {
            self.doc
                .get(file_name, key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Some(CompatibilityEntry {
            install_target: get("InstallTarget"),
            render_api: get("RenderApi"),
            depth_reversed: get("DepthReversed"),
            depth_upside_down: get("DepthUpsideDown"),
            depth_logarithmic: get("DepthLogarithmic"),
            depth_copy_before_clears: get("DepthCopyBeforeClears"),
            use_aspect_ratio_heuristics: get("UseAspectRatioHeuristics"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_by_exact_file_name() {
        let db = CompatibilityDatabase::parse(
            "[Cyberpunk2077.exe]\nDepthReversed=1\nRenderApi=D3D12\n\n[Hades.exe]\nInstallTarget=x64\nUseAspectRatioHeuristics=0\n",
        );
        let entry = db.entry("Cyberpunk2077.exe").unwrap();
        assert_eq!(entry.render_api.as_deref(), Some("D3D12"));
        assert_eq!(entry.depth_reversed.as_deref(), Some("1"));
        assert_eq!(entry.install_target, None);
        assert!(db.entry("cyberpunk2077.exe").is_none());
        assert_eq!(db.entry("Hades.exe").unwrap().install_target.as_deref(), Some("x64"));
    }
}
