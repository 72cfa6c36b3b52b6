use indexmap::IndexMap;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Comments and blank lines, kept as read.
    Raw(String),
    Entry { key: String, value: String, raw: Option<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Section {
    lines: Vec<Line>,
    keys: IndexMap<String, usize>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        match self.lines.get(*self.keys.get(key)?)? {
            Line::Entry { value, .. } => Some(value),
            Line::Raw(_) => None,
        }
    }

    fn insert(&mut self, key: &str, value: String, raw: Option<String>) {
        let entry = Line::Entry { key: key.to_string(), value, raw };
        match self.keys.get(key) {
            Some(&i) => self.lines[i] = entry,
            None => {
                self.keys.insert(key.to_string(), self.lines.len());
                self.lines.push(entry);
            }
        }
    }

    fn set(&mut self, key: &str, value: String) {
        if self.get(key) != Some(value.as_str()) {
            self.insert(key, value, None);
        }
    }

    fn render(&self, spacer: &str, out: &mut String) {
        for line in &self.lines {
            match line {
                Line::Raw(text) | Line::Entry { raw: Some(text), .. } => out.push_str(text),
                Line::Entry { key, value, raw: None } => out.push_str(&format!("{key}{spacer}={spacer}{value}")),
            }
            out.push('\n');
        }
    }
}

/// Minimal INI document. Keeps key order, tolerates duplicate sections (merged) and
/// duplicate keys (last one wins). Comments and untouched entries are written back as read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    global: Section,
    sections: IndexMap<String, Section>,
}

impl IniDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut doc = Self::default();
        let mut current: Option<String> = None;
        for line in text.trim_start_matches('\u{feff}').lines() {
            let l = line.trim();
            let target = match &current {
                Some(name) => doc.sections.entry(name.clone()).or_default(),
                None => &mut doc.global,
            };
            if l.is_empty() || l.starts_with('#') || l.starts_with(';') {
                target.lines.push(Line::Raw(line.to_string()));
                continue;
            }
            if let Some(name) = l.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                let name = name.trim().to_string();
                doc.sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let Some((key, value)) = l.split_once('=') else {
                target.lines.push(Line::Raw(line.to_string()));
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                target.lines.push(Line::Raw(line.to_string()));
                continue;
            }
            target.insert(key, value.trim().to_string(), Some(line.to_string()));
        }
        doc
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key)
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections.entry(section.to_string()).or_default().set(key, value.into());
    }

    pub fn global(&self, key: &str) -> Option<&str> {
        self.global.get(key)
    }

    pub fn set_global(&mut self, key: &str, value: impl Into<String>) {
        self.global.set(key, value.into());
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Render with `spacer` on both sides of `=` for entries that were added or changed.
    pub fn to_string_with(&self, spacer: &str) -> String {
        let mut out = String::new();
        self.global.render(spacer, &mut out);
        for (name, section) in &self.sections {
            if !out.is_empty() && !out.ends_with("\n\n") {
                out.push('\n');
            }
            out.push_str(&format!("[{name}]\n"));
            section.render(spacer, &mut out);
        }
        out
    }

    pub fn save(&self, path: &Path, spacer: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_string_with(spacer))
    }
}
