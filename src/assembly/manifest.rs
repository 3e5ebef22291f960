// src/assembly/manifest.rs

//! Archive manifest (`META-INF/MANIFEST.MF`)
//!
//! Only the main section is modelled. Lines are CRLF terminated and wrapped
//! at 72 bytes, continuation lines starting with a single space.

use std::path::Path;

/// Location of the manifest inside an archive
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Entry point used when the project does not name one
pub const DEFAULT_MAIN_CLASS: &str = "org.jpos.q2.Q2";

/// Directory, relative to the distribution root, holding dependency jars
pub const LIB_DIR: &str = "lib";

const MAX_LINE: usize = 72;

/// Ordered main-section attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    attributes: Vec<(String, String)>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            attributes: vec![("Manifest-Version".to_string(), "1.0".to_string())],
        }
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manifest identifying an application archive
    pub fn for_application(title: &str, version: &str, main_class: &str) -> Self {
        let mut manifest = Self::new();
        manifest.set("Implementation-Title", title);
        manifest.set("Implementation-Version", version);
        manifest.set("Main-Class", main_class);
        manifest
    }

    /// Add `Class-Path` listing `lib/<file name>` for each dependency
    pub fn with_class_path<P: AsRef<Path>>(mut self, dependencies: &[P]) -> Self {
        let entries: Vec<String> = dependencies
            .iter()
            .filter_map(|p| p.as_ref().file_name())
            .map(|name| format!("{}/{}", LIB_DIR, name.to_string_lossy()))
            .collect();
        if !entries.is_empty() {
            self.set("Class-Path", &entries.join(" "));
        }
        self
    }

    /// Set an attribute, replacing an existing value in place
    pub fn set(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Serialized manifest bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for (name, value) in &self.attributes {
            write_wrapped(&mut out, &format!("{}: {}", name, value));
        }
        out.push_str("\r\n");
        out.into_bytes()
    }

    /// Parse the main section of a manifest
    pub fn parse(text: &str) -> Self {
        let mut attributes: Vec<(String, String)> = Vec::new();
        let mut logical: Vec<String> = Vec::new();

        for line in text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)) {
            if line.is_empty() {
                break;
            }
            match (line.strip_prefix(' '), logical.last_mut()) {
                (Some(cont), Some(last)) => last.push_str(cont),
                _ => logical.push(line.to_string()),
            }
        }

        for line in logical {
            if let Some((name, value)) = line.split_once(": ") {
                attributes.push((name.to_string(), value.to_string()));
            }
        }

        Self { attributes }
    }
}

/// Append one attribute line, wrapped at 72 bytes on char boundaries
fn write_wrapped(out: &mut String, line: &str) {
    let mut rest = line;
    let mut limit = MAX_LINE;

    while rest.len() > limit {
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n ");
        rest = &rest[cut..];
        limit = MAX_LINE - 1;
    }
    out.push_str(rest);
    out.push_str("\r\n");
}
