//! Fixtures shared by the unit tests: synthetic PE images, a scripted notifier and a
//! throwaway application folder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::notify::{Choice, Notifier, Tone};
use crate::paths::AppPaths;

const SECTION_VA: u32 = 0x1000;
const SECTION_RAW: usize = 0x400;
const FILE_ALIGN: usize = 0x200;

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn utf16z(s: &str) -> Vec<u8> {
    s.encode_utf16().chain(std::iter::once(0)).flat_map(|u| u.to_le_bytes()).collect()
}

/// Builds a minimal but well-formed PE image with one section holding the import table and
/// the resource tree.
pub struct PeBuilder {
    x64: bool,
    imports: Vec<String>,
    resources: BTreeMap<u32, BTreeMap<u32, Vec<u8>>>,
}

impl PeBuilder {
    pub fn new(x64: bool) -> Self {
        Self { x64, imports: Vec::new(), resources: BTreeMap::new() }
    }

    pub fn import(mut self, module: &str) -> Self {
        self.imports.push(module.to_string());
        self
    }

    pub fn resource(mut self, type_id: u32, name_id: u32, data: Vec<u8>) -> Self {
        self.resources.entry(type_id).or_default().insert(name_id, data);
        self
    }

    pub fn utf16_resource(self, type_id: u32, name_id: u32, text: &str) -> Self {
        self.resource(type_id, name_id, utf16z(text))
    }

    pub fn version(self, strings: &[(&str, &str)], fixed: [u16; 4]) -> Self {
        self.resource(crate::pe::RT_VERSION, 1, version_resource(strings, fixed))
    }

    fn section_body(&self) -> (Vec<u8>, Option<(u32, u32)>, Option<(u32, u32)>) {
        let mut body = Vec::new();
        let mut import_dir = None;
        if !self.imports.is_empty() {
            let table_len = (self.imports.len() + 1) * 20;
            body.resize(table_len, 0);
            for (i, name) in self.imports.iter().enumerate() {
                let name_rva = SECTION_VA + body.len() as u32;
                body.extend_from_slice(name.as_bytes());
                body.push(0);
                let desc = i * 20;
                put_u32(&mut body, desc, name_rva + 0x100);
                put_u32(&mut body, desc + 12, name_rva);
            }
            pad4(&mut body);
            import_dir = Some((SECTION_VA, table_len as u32));
        }

        let mut resource_dir = None;
        if !self.resources.is_empty() {
            let base = body.len();
            let rsrc = self.resource_tree(SECTION_VA + base as u32);
            resource_dir = Some((SECTION_VA + base as u32, rsrc.len() as u32));
            body.extend_from_slice(&rsrc);
        }
        (body, import_dir, resource_dir)
    }

    fn resource_tree(&self, base_rva: u32) -> Vec<u8> {
        let leaves: Vec<(u32, u32, &Vec<u8>)> = self
            .resources
            .iter()
            .flat_map(|(t, ids)| ids.iter().map(move |(id, data)| (*t, *id, data)))
            .collect();

        let mut off = 16 + 8 * self.resources.len();
        let mut type_dirs = Vec::new();
        for ids in self.resources.values() {
            type_dirs.push(off);
            off += 16 + 8 * ids.len();
        }
        let lang_dirs: Vec<usize> = leaves.iter().map(|_| { let o = off; off += 24; o }).collect();
        let data_entries: Vec<usize> = leaves.iter().map(|_| { let o = off; off += 16; o }).collect();
        let blobs: Vec<usize> = leaves
            .iter()
            .map(|(_, _, d)| { let o = off; off += (d.len() + 3) & !3; o })
            .collect();

        let mut buf = vec![0u8; off];
        put_u16(&mut buf, 14, self.resources.len() as u16);
        let mut leaf = 0;
        for (ti, (type_id, ids)) in self.resources.iter().enumerate() {
            put_u32(&mut buf, 16 + ti * 8, *type_id);
            put_u32(&mut buf, 16 + ti * 8 + 4, 0x8000_0000 | type_dirs[ti] as u32);
            let td = type_dirs[ti];
            put_u16(&mut buf, td + 14, ids.len() as u16);
            for (ii, id) in ids.keys().enumerate() {
                put_u32(&mut buf, td + 16 + ii * 8, *id);
                put_u32(&mut buf, td + 16 + ii * 8 + 4, 0x8000_0000 | lang_dirs[leaf] as u32);
                leaf += 1;
            }
        }
        for (i, (_, _, data)) in leaves.iter().enumerate() {
            let ld = lang_dirs[i];
            put_u16(&mut buf, ld + 14, 1);
            put_u32(&mut buf, ld + 16, 0x409);
            put_u32(&mut buf, ld + 20, data_entries[i] as u32);
            put_u32(&mut buf, data_entries[i], base_rva + blobs[i] as u32);
            put_u32(&mut buf, data_entries[i] + 4, data.len() as u32);
            buf[blobs[i]..blobs[i] + data.len()].copy_from_slice(data);
        }
        buf
    }

    pub fn build(&self) -> Vec<u8> {
        let (mut body, import_dir, resource_dir) = self.section_body();
        let virtual_size = body.len().max(1) as u32;
        let raw_size = ((body.len() + FILE_ALIGN - 1) / FILE_ALIGN).max(1) * FILE_ALIGN;
        body.resize(raw_size, 0);

        let mut image = vec![0u8; SECTION_RAW];
        image[0..2].copy_from_slice(b"MZ");
        put_u32(&mut image, 0x3c, 0x80);
        image[0x80..0x84].copy_from_slice(b"PE\0\0");
        let coff = 0x84;
        let machine = if self.x64 { crate::pe::IMAGE_FILE_MACHINE_AMD64 } else { crate::pe::IMAGE_FILE_MACHINE_I386 };
        put_u16(&mut image, coff, machine);
        put_u16(&mut image, coff + 2, 1);
        let optional_size: usize = if self.x64 { 240 } else { 224 };
        put_u16(&mut image, coff + 16, optional_size as u16);
        put_u16(&mut image, coff + 18, 0x0102);

        let opt = coff + 20;
        put_u16(&mut image, opt, if self.x64 { 0x20b } else { 0x10b });
        let (count_off, dirs_off) = if self.x64 { (opt + 108, opt + 112) } else { (opt + 92, opt + 96) };
        put_u32(&mut image, count_off, 16);
        if let Some((rva, size)) = import_dir {
            put_u32(&mut image, dirs_off + 8, rva);
            put_u32(&mut image, dirs_off + 12, size);
        }
        if let Some((rva, size)) = resource_dir {
            put_u32(&mut image, dirs_off + 16, rva);
            put_u32(&mut image, dirs_off + 20, size);
        }

        let section = opt + optional_size;
        image[section..section + 6].copy_from_slice(b".rdata");
        put_u32(&mut image, section + 8, virtual_size);
        put_u32(&mut image, section + 12, SECTION_VA);
        put_u32(&mut image, section + 16, raw_size as u32);
        put_u32(&mut image, section + 20, SECTION_RAW as u32);

        image.extend_from_slice(&body);
        image
    }

    pub fn write_to(&self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }
}

fn version_block(key: &str, value: &[u8], value_len: u16, text: bool, children: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 6];
    buf.extend_from_slice(&utf16z(key));
    pad4(&mut buf);
    buf.extend_from_slice(value);
    if !children.is_empty() {
        pad4(&mut buf);
        buf.extend_from_slice(children);
    }
    let len = buf.len() as u16;
    put_u16(&mut buf, 0, len);
    put_u16(&mut buf, 2, value_len);
    put_u16(&mut buf, 4, text as u16);
    buf
}

/// Raw `VS_VERSIONINFO` with one string table.
pub fn version_resource(strings: &[(&str, &str)], fixed: [u16; 4]) -> Vec<u8> {
    let mut entries = Vec::new();
    for (key, value) in strings {
        let encoded = utf16z(value);
        entries.extend(version_block(key, &encoded, (encoded.len() / 2) as u16, true, &[]));
        pad4(&mut entries);
    }
    let table = version_block("040904b0", &[], 0, true, &entries);
    let string_file_info = version_block("StringFileInfo", &[], 0, true, &table);

    let mut fixed_info = vec![0u8; 52];
    put_u32(&mut fixed_info, 0, 0xFEEF_04BD);
    put_u32(&mut fixed_info, 4, 0x0001_0000);
    put_u32(&mut fixed_info, 8, ((fixed[0] as u32) << 16) | fixed[1] as u32);
    put_u32(&mut fixed_info, 12, ((fixed[2] as u32) << 16) | fixed[3] as u32);
    version_block("VS_VERSION_INFO", &fixed_info, 52, false, &string_file_info)
}

/// Answers prompts from a fixed script and records everything it was shown.
#[derive(Default)]
pub struct ScriptedNotifier {
    answers: Mutex<Vec<Choice>>,
    pub shown: Mutex<Vec<(String, Tone)>>,
}

impl ScriptedNotifier {
    pub fn answering(answers: &[Choice]) -> Self {
        let mut answers = answers.to_vec();
        answers.reverse();
        Self { answers: Mutex::new(answers), shown: Mutex::default() }
    }

    pub fn messages(&self) -> Vec<String> {
        self.shown.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }
}

impl Notifier for ScriptedNotifier {
    fn inform(&self, message: &str, _title: &str) {
        self.shown.lock().unwrap().push((message.to_string(), Tone::Info));
    }

    fn ask(&self, message: &str, _title: &str, _primary: &str, _secondary: &str, tone: Tone) -> Choice {
        self.shown.lock().unwrap().push((message.to_string(), tone));
        self.answers.lock().unwrap().pop().unwrap_or(Choice::Dismissed)
    }
}

/// Application folder under a temp dir, with both library folders populated by fake dlls.
pub fn app_layout(dir: &Path) -> AppPaths {
    let paths = AppPaths::from_root(dir.join("app"))
        .with_system_dirs(dir.join("ProgramData").join("ReShade"), dir.join("LocalAppData").join("ReShade"));
    for lib in paths.library_dirs() {
        std::fs::create_dir_all(lib).unwrap();
        std::fs::write(lib.join(crate::paths::RESHADE32_DLL), b"reshade32").unwrap();
        std::fs::write(lib.join(crate::paths::RESHADE64_DLL), b"reshade64").unwrap();
        std::fs::write(lib.join("ReShade32.json"), b"{}").unwrap();
        std::fs::write(lib.join("ReShade64.json"), b"{}").unwrap();
    }
    paths
}
