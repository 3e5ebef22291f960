// src/archive/entry.rs

//! Source specifications and expanded entries

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Role a source plays in an assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOrigin {
    /// Compiled output of the project itself
    PrimaryOutput,
    /// Third-party library on the runtime classpath
    Dependency,
    /// Configuration copied without substitution
    RawConfig,
    /// Template tree copied with token substitution
    DistributionTemplate,
}

impl SourceOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryOutput => "primary-output",
            Self::Dependency => "dependency",
            Self::RawConfig => "raw-config",
            Self::DistributionTemplate => "distribution-template",
        }
    }
}

impl std::fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A path handed to the expander together with its role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub origin: SourceOrigin,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>, origin: SourceOrigin) -> Self {
        Self {
            path: path.into(),
            origin,
        }
    }

    pub fn primary(path: impl Into<PathBuf>) -> Self {
        Self::new(path, SourceOrigin::PrimaryOutput)
    }

    pub fn dependency(path: impl Into<PathBuf>) -> Self {
        Self::new(path, SourceOrigin::Dependency)
    }
}

/// How an entry's bytes are obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContent {
    /// Read from disk on demand
    File(PathBuf),
    /// Already read from an archive
    Bytes(Vec<u8>),
}

/// One file contributed to an assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Logical destination path (`/`-separated, relative)
    pub path: String,
    /// File on disk, or the containing archive for archive entries
    pub source: PathBuf,
    /// Containing archive, if the entry came from one
    pub archive: Option<PathBuf>,
    pub origin: SourceOrigin,
    /// Unix mode recorded by the source, if any
    pub mode: Option<u32>,
    content: EntryContent,
}

impl SourceEntry {
    /// Entry backed by a file on disk
    pub fn from_file(path: impl Into<String>, source: impl Into<PathBuf>, origin: SourceOrigin) -> Self {
        let source = source.into();
        Self {
            path: path.into(),
            content: EntryContent::File(source.clone()),
            source,
            archive: None,
            origin,
            mode: None,
        }
    }

    /// Entry read out of an archive
    pub fn from_archive(
        path: impl Into<String>,
        archive: &Path,
        origin: SourceOrigin,
        mode: Option<u32>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            path: path.into(),
            source: archive.to_path_buf(),
            archive: Some(archive.to_path_buf()),
            origin,
            mode,
            content: EntryContent::Bytes(bytes),
        }
    }

    /// In-memory entry (generated content such as a manifest)
    pub fn from_bytes(path: impl Into<String>, origin: SourceOrigin, bytes: Vec<u8>) -> Self {
        let path = path.into();
        Self {
            source: PathBuf::from(&path),
            path,
            archive: None,
            origin,
            mode: None,
            content: EntryContent::Bytes(bytes),
        }
    }

    pub fn content(&self) -> &EntryContent {
        &self.content
    }

    /// Read the full content
    pub fn read(&self) -> io::Result<Cow<'_, [u8]>> {
        match &self.content {
            EntryContent::File(path) => fs::read(path).map(Cow::Owned),
            EntryContent::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
        }
    }

    /// Where this entry came from, for diagnostics
    pub fn origin_path(&self) -> &Path {
        self.archive.as_deref().unwrap_or(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_entry_reads_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        let entry = SourceEntry::from_file("a.txt", &file, SourceOrigin::PrimaryOutput);

        // Written after the entry exists; content is only read on demand.
        fs::write(&file, b"late").unwrap();
        assert_eq!(entry.read().unwrap().as_ref(), b"late");
        assert_eq!(entry.origin_path(), file.as_path());
    }

    #[test]
    fn test_archive_entry_origin() {
        let entry = SourceEntry::from_archive(
            "META-INF/services/x",
            Path::new("/libs/dep.jar"),
            SourceOrigin::Dependency,
            Some(0o644),
            b"Impl\n".to_vec(),
        );
        assert_eq!(entry.origin_path(), Path::new("/libs/dep.jar"));
        assert_eq!(entry.read().unwrap().as_ref(), b"Impl\n");
    }
}
