use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(\.\d+)*").expect("valid regex"));

/// First version-looking token (`6.3.3`, `1.4`) in a URL, tag or file name. The result is
/// only ever compared for equality, never ordered.
pub fn extract_version(text: &str) -> Option<String> {
    VERSION_NUMBER.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulls_version_from_download_links_and_tags() {
        assert_eq!(extract_version("/downloads/ReShade_Setup_6.3.3.exe").as_deref(), Some("6.3.3"));
        assert_eq!(extract_version("/downloads/ReShade_Setup_6.3.3_Addon.exe").as_deref(), Some("6.3.3"));
        assert_eq!(extract_version("v1.4.0").as_deref(), Some("1.4.0"));
        assert_eq!(extract_version("12").as_deref(), Some("12"));
        assert_eq!(extract_version("no digits here"), None);
    }
}
