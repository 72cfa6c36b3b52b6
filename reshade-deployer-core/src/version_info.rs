use byteorder::{ByteOrder, LittleEndian};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;

static COPYRIGHT_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"20\d\d").expect("valid regex"));

/// The parts of a `VS_VERSIONINFO` resource the deployer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    fixed_version: Option<[u16; 4]>,
    strings: IndexMap<String, String>,
}

struct Block<'a> {
    key: String,
    value: &'a [u8],
    is_text: bool,
    children: &'a [u8],
    len: usize,
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn utf16_until_nul(bytes: &[u8]) -> (String, usize) {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(LittleEndian::read_u16)
        .take_while(|&u| u != 0)
        .collect();
    let consumed = units.len() * 2;
    (String::from_utf16_lossy(&units), consumed)
}

fn parse_block(data: &[u8]) -> Option<Block<'_>> {
    if data.len() < 6 {
        return None;
    }
    let len = (LittleEndian::read_u16(&data[0..2]) as usize).min(data.len());
    if len < 6 {
        return None;
    }
    let value_len = LittleEndian::read_u16(&data[2..4]) as usize;
    let is_text = LittleEndian::read_u16(&data[4..6]) == 1;
    let data = &data[..len];

    let (key, key_bytes) = utf16_until_nul(&data[6..]);
    let mut pos = align4(6 + key_bytes + 2).min(len);
    let value_size = if is_text { value_len * 2 } else { value_len };
    let value_end = (pos + value_size).min(len);
    let value = &data[pos..value_end];
    pos = align4(value_end).min(len);

    Some(Block { key, value, is_text, children: &data[pos..], len })
}

fn children(data: &[u8]) -> impl Iterator<Item = Block<'_>> {
    let mut offset = 0;
    std::iter::from_fn(move || {
        let block = parse_block(data.get(offset..)?)?;
        offset += align4(block.len);
        Some(block)
    })
}

impl VersionInfo {
    pub fn parse(data: &[u8]) -> Option<Self> {
        let root = parse_block(data)?;
        if root.key != "VS_VERSION_INFO" {
            return None;
        }
        let mut info = Self::default();
        if root.value.len() >= 52 && LittleEndian::read_u32(&root.value[0..4]) == FIXED_FILE_INFO_SIGNATURE {
            let ms = LittleEndian::read_u32(&root.value[8..12]);
            let ls = LittleEndian::read_u32(&root.value[12..16]);
            info.fixed_version = Some([(ms >> 16) as u16, ms as u16, (ls >> 16) as u16, ls as u16]);
        }
        for file_info in children(root.children).filter(|b| b.key == "StringFileInfo") {
            for table in children(file_info.children) {
                for entry in children(table.children) {
                    let value = if entry.is_text {
                        utf16_until_nul(entry.value).0
                    } else {
                        String::from_utf8_lossy(entry.value).trim_end_matches('\0').to_string()
                    };
                    info.strings.entry(entry.key).or_insert_with(|| value.trim().to_string());
                }
            }
        }
        Some(info)
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn file_description(&self) -> Option<&str> {
        self.string("FileDescription")
    }

    pub fn legal_copyright(&self) -> Option<&str> {
        self.string("LegalCopyright")
    }

    /// `FileVersion` string, or the fixed binary version if the string table lacks it.
    pub fn file_version(&self) -> Option<String> {
        if let Some(v) = self.string("FileVersion") {
            return Some(v.to_string());
        }
        self.fixed_version.map(|[a, b, c, d]| format!("{a}.{b}.{c}.{d}"))
    }

    /// File version with its last component (the build number) dropped.
    pub fn file_version_short(&self) -> Option<String> {
        let full = self.file_version()?;
        match full.rfind('.') {
            Some(idx) => Some(full[..idx].to_string()),
            None => Some(full),
        }
    }

    /// Last `20xx` year mentioned in the copyright notice.
    pub fn copyright_year(&self) -> Option<u32> {
        copyright_year(self.legal_copyright()?)
    }
}

pub fn copyright_year(text: &str) -> Option<u32> {
    COPYRIGHT_YEAR.find_iter(text).last()?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::version_resource;

    #[test]
    fn picks_last_year_in_copyright() {
        assert_eq!(copyright_year("Copyright (C) 2009-2015 Some Studio"), Some(2015));
        assert_eq!(copyright_year("© 1999 Old Games"), None);
        assert_eq!(copyright_year("2011"), Some(2011));
    }

    #[test]
    fn string_table_wins_over_fixed_version() {
        let data = version_resource(&[("FileVersion", "5.9.2.1000"), ("CompanyName", "crosire")], [1, 2, 3, 4]);
        let info = VersionInfo::parse(&data).unwrap();
        assert_eq!(info.file_version().as_deref(), Some("5.9.2.1000"));
        assert_eq!(info.file_version_short().as_deref(), Some("5.9.2"));
        assert_eq!(info.string("CompanyName"), Some("crosire"));
        assert_eq!(info.file_description(), None);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(VersionInfo::parse(&[1, 2, 3]), None);
        assert_eq!(VersionInfo::parse(&[0u8; 64]), None);
    }
}
