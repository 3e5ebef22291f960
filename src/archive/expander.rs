// src/archive/expander.rs

//! Lazy expansion of directories and archives into entries

use super::entry::{SourceEntry, SourceOrigin, SourceSpec};
use crate::error::{Error, Result};
use crate::filter::relative_path;
use flate2::read::GzDecoder;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Upper bound for buffer preallocation from an archive's declared entry size
const SIZE_HINT_CAP: u64 = 1 << 20;

/// Container formats the expander can read in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// zip container (`.jar`, `.war`, `.ear`, `.zip`)
    Zip,
    /// Uncompressed tarball
    Tar,
    /// Gzip-compressed tarball
    TarGz,
}

impl ArchiveFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if [".jar", ".war", ".ear", ".zip"].iter().any(|ext| name.ends_with(ext)) {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Detect format from magic bytes
    ///
    /// Magic bytes:
    /// - zip: `50 4b 03 04` ("PK\x03\x04"), or `50 4b 05 06` for an empty archive
    /// - gzip: `1f 8b` (assumed to wrap a tarball)
    /// - tar: `ustar` at offset 257
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() >= 4
            && data[0] == 0x50
            && data[1] == 0x4b
            && (data[2..4] == [0x03, 0x04] || data[2..4] == [0x05, 0x06])
        {
            Some(Self::Zip)
        } else if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            Some(Self::TarGz)
        } else if data.len() >= 262 && &data[257..262] == b"ustar" {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// What a source path is backed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    /// Walk a directory tree
    Directory,
    /// Read a container in place
    Archive(ArchiveFormat),
    /// A single plain file, flattened to its file name
    File,
}

impl EntrySource {
    /// Classify a source path by extension, falling back to magic bytes
    pub fn detect(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(Self::Directory);
        }
        if !path.exists() {
            return Err(Error::unreadable_archive(path, "source does not exist"));
        }
        if let Some(format) = ArchiveFormat::from_extension(path) {
            return Ok(Self::Archive(format));
        }

        let mut magic = Vec::with_capacity(262);
        File::open(path)
            .and_then(|f| f.take(262).read_to_end(&mut magic))
            .map_err(|e| Error::unreadable_archive(path, e))?;

        Ok(ArchiveFormat::from_magic_bytes(&magic)
            .map(Self::Archive)
            .unwrap_or(Self::File))
    }
}

/// What to do when a container cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptArchivePolicy {
    /// Fail the expansion
    #[default]
    Abort,
    /// Log a warning, skip the rest of that source and continue
    SkipAndWarn,
}

/// Expands source lists into entries
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExpander {
    policy: CorruptArchivePolicy,
}

impl ArchiveExpander {
    pub fn new(policy: CorruptArchivePolicy) -> Self {
        Self { policy }
    }

    /// Start a fresh expansion; no state is shared between calls
    pub fn expand(&self, sources: &[SourceSpec]) -> Expansion {
        Expansion {
            pending: sources.iter().cloned().collect(),
            current: None,
            policy: self.policy,
            skipped: Vec::new(),
            failed: false,
        }
    }
}

/// Open cursor over one source
enum Cursor {
    Directory {
        root: PathBuf,
        origin: SourceOrigin,
        walker: walkdir::IntoIter,
    },
    Zip {
        path: PathBuf,
        origin: SourceOrigin,
        archive: ZipArchive<BufReader<File>>,
        next: usize,
    },
    /// Tar streams are read sequentially on a reader thread, one entry per
    /// rendezvous; dropping the receiver stops the reader
    Tar {
        entries: Receiver<Result<SourceEntry>>,
    },
    Single(Option<SourceEntry>),
}

/// Lazy entry sequence produced by [`ArchiveExpander::expand`]
///
/// Sources are visited in the order given. After an error under the abort
/// policy the sequence ends.
pub struct Expansion {
    pending: VecDeque<SourceSpec>,
    current: Option<Cursor>,
    policy: CorruptArchivePolicy,
    skipped: Vec<PathBuf>,
    failed: bool,
}

impl Expansion {
    /// Sources skipped under [`CorruptArchivePolicy::SkipAndWarn`]
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    fn open(spec: &SourceSpec) -> Result<Cursor> {
        let path = &spec.path;
        match EntrySource::detect(path)? {
            EntrySource::Directory => {
                debug!("Walking {} ({})", path.display(), spec.origin);
                Ok(Cursor::Directory {
                    root: path.clone(),
                    origin: spec.origin,
                    walker: WalkDir::new(path).sort_by_file_name().into_iter(),
                })
            }
            EntrySource::Archive(ArchiveFormat::Zip) => {
                debug!("Opening zip {} ({})", path.display(), spec.origin);
                let file = File::open(path).map_err(|e| Error::unreadable_archive(path, e))?;
                let archive = ZipArchive::new(BufReader::new(file))
                    .map_err(|e| Error::unreadable_archive(path, e))?;
                Ok(Cursor::Zip {
                    path: path.clone(),
                    origin: spec.origin,
                    archive,
                    next: 0,
                })
            }
            EntrySource::Archive(format) => {
                debug!("Reading tarball {} ({})", path.display(), spec.origin);
                let file = File::open(path).map_err(|e| Error::unreadable_archive(path, e))?;
                let reader: Box<dyn Read + Send> = if format == ArchiveFormat::TarGz {
                    Box::new(GzDecoder::new(BufReader::new(file)))
                } else {
                    Box::new(BufReader::new(file))
                };

                let (tx, rx) = mpsc::sync_channel(0);
                let (source, origin) = (path.clone(), spec.origin);
                thread::Builder::new()
                    .name("distkit-tar".to_string())
                    .spawn(move || stream_tar(reader, &source, origin, &tx))
                    .map_err(|e| Error::unreadable_archive(path, e))?;
                Ok(Cursor::Tar { entries: rx })
            }
            EntrySource::File => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .ok_or_else(|| Error::unreadable_archive(path, "source has no file name"))?;
                Ok(Cursor::Single(Some(SourceEntry::from_file(name, path, spec.origin))))
            }
        }
    }

    /// Pull the next entry from the open cursor; `Ok(None)` when exhausted
    fn advance(cursor: &mut Cursor) -> Result<Option<SourceEntry>> {
        match cursor {
            Cursor::Directory { root, origin, walker } => {
                for item in walker.by_ref() {
                    let item = item.map_err(|e| {
                        let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                        Error::unreadable_archive(path, e)
                    })?;
                    let is_file = item.file_type().is_file()
                        || (item.file_type().is_symlink() && item.path().is_file());
                    if !is_file {
                        continue;
                    }
                    let relative = relative_path(root, item.path());
                    return Ok(Some(SourceEntry::from_file(relative, item.path(), *origin)));
                }
                Ok(None)
            }
            Cursor::Zip {
                path,
                origin,
                archive,
                next,
            } => {
                while *next < archive.len() {
                    let index = *next;
                    *next += 1;

                    let mut file = archive
                        .by_index(index)
                        .map_err(|e| Error::unreadable_archive(path.as_path(), e))?;
                    if file.is_dir() {
                        continue;
                    }
                    let name = file.name().trim_start_matches('/').to_string();
                    let mode = file.unix_mode();
                    // The declared size is untrusted; it only seeds the buffer
                    let mut bytes = Vec::with_capacity(file.size().min(SIZE_HINT_CAP) as usize);
                    file.read_to_end(&mut bytes)
                        .map_err(|e| Error::unreadable_archive(path.as_path(), format!("{}: {}", name, e)))?;

                    return Ok(Some(SourceEntry::from_archive(name, path, *origin, mode, bytes)));
                }
                Ok(None)
            }
            // A closed channel means the reader reached the end of the stream
            Cursor::Tar { entries } => entries.recv().ok().transpose(),
            Cursor::Single(entry) => Ok(entry.take()),
        }
    }
}

/// Send each regular file of a tar stream, stopping at the first error or
/// once the receiving cursor is gone
fn stream_tar(
    reader: Box<dyn Read + Send>,
    path: &Path,
    origin: SourceOrigin,
    tx: &SyncSender<Result<SourceEntry>>,
) {
    let mut archive = tar::Archive::new(reader);
    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => {
            let _ = tx.send(Err(Error::unreadable_archive(path, e)));
            return;
        }
    };
    for entry in entries {
        let next = entry
            .map_err(|e| Error::unreadable_archive(path, e))
            .and_then(|entry| read_tar_entry(entry, path, origin));
        match next {
            Ok(None) => {}
            Ok(Some(entry)) => {
                if tx.send(Ok(entry)).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

fn read_tar_entry<R: Read>(
    mut entry: tar::Entry<'_, R>,
    path: &Path,
    origin: SourceOrigin,
) -> Result<Option<SourceEntry>> {
    if !entry.header().entry_type().is_file() {
        return Ok(None);
    }
    let name = entry
        .path()
        .map_err(|e| Error::unreadable_archive(path, e))?
        .to_string_lossy()
        .trim_start_matches("./")
        .to_string();
    let mode = entry.header().mode().ok();
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| Error::unreadable_archive(path, format!("{}: {}", name, e)))?;
    Ok(Some(SourceEntry::from_archive(name, path, origin, mode, bytes)))
}

impl Iterator for Expansion {
    type Item = Result<SourceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if self.current.is_none() {
                let spec = self.pending.pop_front()?;
                match Self::open(&spec) {
                    Ok(cursor) => self.current = Some(cursor),
                    Err(e) => match self.policy {
                        CorruptArchivePolicy::Abort => {
                            self.failed = true;
                            self.pending.clear();
                            return Some(Err(e));
                        }
                        CorruptArchivePolicy::SkipAndWarn => {
                            warn!("Skipping {}: {}", spec.path.display(), e);
                            self.skipped.push(spec.path);
                            continue;
                        }
                    },
                }
            }

            let cursor = self.current.as_mut()?;
            match Self::advance(cursor) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                // Exhausted: dropping the cursor closes the handle.
                Ok(None) => self.current = None,
                Err(e) => {
                    self.current = None;
                    match self.policy {
                        CorruptArchivePolicy::Abort => {
                            self.failed = true;
                            self.pending.clear();
                            return Some(Err(e));
                        }
                        CorruptArchivePolicy::SkipAndWarn => {
                            warn!("Skipping rest of source: {}", e);
                            if let Error::UnreadableArchive { path, .. } = &e {
                                self.skipped.push(path.clone());
                            }
                        }
                    }
                }
            }
        }
    }
}
