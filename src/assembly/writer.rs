// src/assembly/writer.rs

//! Output writers
//!
//! Directory, tar.gz and zip outputs are first materialized into a staging
//! tree next to the output, then moved or packed into place. Combined
//! archives stream entries straight into a temporary zip. Either way the
//! final path only ever sees a complete output.

use super::manifest::{Manifest, MANIFEST_PATH};
use super::plan::{AssemblyPlan, DuplicatePolicy, PlanSegment, SegmentSource};
use crate::archive::{ArchiveExpander, CorruptArchivePolicy, SourceEntry, SourceSpec};
use crate::error::{Error, Result};
use crate::filter::{
    copy_selected, relative_path, render_selected, select_files, SelectedFile, DEFAULT_MODE,
};
use crate::services::is_signature_file;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Fallback tar timestamp when `SOURCE_DATE_EPOCH` is unset (2024-01-01 00:00:00 UTC)
pub const DEFAULT_MTIME: u64 = 1704067200;

/// Shape of the written output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Plain directory tree
    Directory,
    /// Gzip-compressed tarball
    TarGz,
    /// Zip archive
    Zip,
    /// Single archive with a generated manifest, merged services and no
    /// member signatures
    Combined,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
            Self::Combined => "combined",
        }
    }
}

/// Summary of one write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub output: PathBuf,
    pub kind: OutputKind,
    /// Files in the output (directory entries are not counted)
    pub entries: usize,
    /// Tokens replaced across filtered segments
    pub tokens_replaced: usize,
    /// Entries dropped because an earlier entry had the same path
    pub duplicates_skipped: usize,
    /// Signature files dropped from a combined archive
    pub signatures_stripped: usize,
    /// Raw service registrations replaced by merged copies
    pub services_superseded: usize,
    /// Sources skipped under [`CorruptArchivePolicy::SkipAndWarn`]
    pub skipped_sources: Vec<PathBuf>,
    /// SHA-256 of archive outputs, hex encoded
    pub sha256: Option<String>,
}

impl WriteReport {
    fn new(output: &Path, kind: OutputKind) -> Self {
        Self {
            output: output.to_path_buf(),
            kind,
            entries: 0,
            tokens_replaced: 0,
            duplicates_skipped: 0,
            signatures_stripped: 0,
            services_superseded: 0,
            skipped_sources: Vec::new(),
            sha256: None,
        }
    }
}

/// Tar entry timestamp: `SOURCE_DATE_EPOCH` if set, else [`DEFAULT_MTIME`]
pub fn reproducible_mtime() -> u64 {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_MTIME)
}

/// Executes assembly plans
#[derive(Debug, Clone, Default)]
pub struct ArchiveWriter {
    tokens: BTreeMap<String, String>,
    corrupt: CorruptArchivePolicy,
    mtime: Option<u64>,
}

impl ArchiveWriter {
    /// Writer substituting `tokens` into filtered segments
    pub fn new(tokens: BTreeMap<String, String>) -> Self {
        Self {
            tokens,
            ..Self::default()
        }
    }

    pub fn with_corrupt_policy(mut self, policy: CorruptArchivePolicy) -> Self {
        self.corrupt = policy;
        self
    }

    /// Fix the tar timestamp instead of reading `SOURCE_DATE_EPOCH`
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Write `plan` as `kind` at `output`
    pub fn write(&self, plan: &AssemblyPlan, kind: OutputKind, output: &Path) -> Result<WriteReport> {
        info!("Writing {} ({})", output.display(), kind.as_str());
        let report = match kind {
            OutputKind::Combined => self.write_combined(plan, output)?,
            _ => {
                let parent = prepare_parent(output)?;
                let staging = tempfile::Builder::new()
                    .prefix(".distkit-")
                    .tempdir_in(&parent)
                    .map_err(|e| Error::write_io(&parent, e))?;
                let tree = staging.path().join("tree");
                fs::create_dir_all(&tree).map_err(|e| Error::write_io(&tree, e))?;

                let mut report = WriteReport::new(output, kind);
                self.materialize(plan, &tree, &mut report)?;

                match kind {
                    OutputKind::Directory => install_tree(&tree, output)?,
                    OutputKind::TarGz => {
                        let mtime = self.mtime.unwrap_or_else(reproducible_mtime);
                        pack_tar_gz(&tree, output, mtime)?;
                    }
                    _ => pack_zip(&tree, output)?,
                }
                drop(staging);
                report
            }
        };

        let report = match kind {
            OutputKind::Directory => report,
            _ => WriteReport {
                sha256: Some(sha256_file(output).map_err(|e| Error::write_io(output, e))?),
                ..report
            },
        };
        info!(
            "Wrote {} ({} entries, {} duplicates skipped)",
            output.display(),
            report.entries,
            report.duplicates_skipped
        );
        Ok(report)
    }

    /// Execute every segment into `tree`, enforcing the duplicate policy
    fn materialize(&self, plan: &AssemblyPlan, tree: &Path, report: &mut WriteReport) -> Result<()> {
        let root = if plan.prefix.is_empty() {
            tree.to_path_buf()
        } else {
            tree.join(&plan.prefix)
        };
        let mut claims = Claims::new(plan.duplicates);

        for segment in &plan.segments {
            debug!("Segment '{}' -> '{}'", segment.name, segment.into);
            match &segment.source {
                SegmentSource::FilteredTree {
                    root: src,
                    rules,
                    permissions,
                } => {
                    for file in select_files(src, rules)? {
                        let dest = segment.destination(&file.relative);
                        claims.claim(&dest, segment)?;
                        let placed = SelectedFile {
                            relative: dest,
                            ..file
                        };
                        report.tokens_replaced += copy_selected(&placed, &root, &self.tokens, permissions)?;
                    }
                }
                SegmentSource::Files { files, mode } => {
                    for file in files {
                        let dest = segment.destination(&file_name(file)?);
                        claims.claim(&dest, segment)?;
                        let target = root.join(&dest);
                        create_parent(&target)?;
                        fs::copy(file, &target).map_err(|e| Error::copy_io(file, e))?;
                        set_mode(&target, *mode)?;
                    }
                }
                SegmentSource::Expanded { sources } => {
                    let mut expansion = ArchiveExpander::new(self.corrupt).expand(sources);
                    for entry in expansion.by_ref() {
                        let entry = entry?;
                        let dest = segment.destination(&entry.path);
                        let target = safe_join(&root, &dest).ok_or_else(|| escaping_entry(&entry))?;
                        claims.claim(&dest, segment)?;
                        let bytes = read_entry(&entry)?;
                        write_staged(&target, &bytes, entry_mode(&entry))?;
                    }
                    report.skipped_sources.extend_from_slice(expansion.skipped());
                }
                SegmentSource::Staged { root: src } => {
                    for (relative, source) in staged_files(src)? {
                        let dest = segment.destination(&relative);
                        claims.supersede(&dest, segment);
                        let target = root.join(&dest);
                        create_parent(&target)?;
                        fs::copy(&source, &target).map_err(|e| Error::copy_io(&source, e))?;
                        set_mode(&target, DEFAULT_MODE)?;
                    }
                }
            }
        }

        report.entries = claims.len();
        Ok(())
    }

    fn write_combined(&self, plan: &AssemblyPlan, output: &Path) -> Result<WriteReport> {
        let parent = prepare_parent(output)?;
        let mut report = WriteReport::new(output, OutputKind::Combined);

        // Merged service files, written after everything else
        let mut staged: BTreeMap<String, PathBuf> = BTreeMap::new();
        for segment in &plan.segments {
            if let SegmentSource::Staged { root } = &segment.source {
                for (relative, source) in staged_files(root)? {
                    staged.insert(segment.destination(&relative), source);
                }
            }
        }

        let mut temp = NamedTempFile::new_in(&parent).map_err(|e| Error::write_io(&parent, e))?;
        let mut sink = ZipSink::new(BufWriter::new(temp.as_file_mut()), &plan.prefix, output);

        if let Some(manifest) = &plan.manifest {
            sink.add(MANIFEST_PATH, &manifest.to_bytes(), DEFAULT_MODE)?;
        }

        for segment in &plan.segments {
            match &segment.source {
                SegmentSource::Staged { .. } => {}
                SegmentSource::Expanded { sources } => {
                    let mut expansion = ArchiveExpander::new(self.corrupt).expand(sources);
                    for entry in expansion.by_ref() {
                        let entry = entry?;
                        let dest = segment.destination(&entry.path);
                        if safe_join(Path::new(""), &dest).is_none() {
                            return Err(escaping_entry(&entry));
                        }
                        if !admit(&dest, &staged, &sink, &mut report, &entry.origin_path().display()) {
                            continue;
                        }
                        let bytes = read_entry(&entry)?;
                        sink.add(&dest, &bytes, entry_mode(&entry))?;
                    }
                    report.skipped_sources.extend_from_slice(expansion.skipped());
                }
                SegmentSource::Files { files, mode } => {
                    for file in files {
                        let dest = segment.destination(&file_name(file)?);
                        if !admit(&dest, &staged, &sink, &mut report, &file.display()) {
                            continue;
                        }
                        let bytes = fs::read(file).map_err(|e| Error::copy_io(file, e))?;
                        sink.add(&dest, &bytes, *mode)?;
                    }
                }
                SegmentSource::FilteredTree {
                    root,
                    rules,
                    permissions,
                } => {
                    for file in select_files(root, rules)? {
                        let dest = segment.destination(&file.relative);
                        if !admit(&dest, &staged, &sink, &mut report, &file.source.display()) {
                            continue;
                        }
                        let (bytes, replaced) = render_selected(&file, &self.tokens)?;
                        report.tokens_replaced += replaced;
                        sink.add(&dest, &bytes, permissions.mode_for(&dest, file.treatment))?;
                    }
                }
            }
        }

        for (dest, source) in &staged {
            let bytes = fs::read(source).map_err(|e| Error::copy_io(source, e))?;
            sink.add(dest, &bytes, DEFAULT_MODE)?;
        }

        report.entries = sink.len();
        sink.finish()?;
        temp.persist(output).map_err(|e| Error::write_io(output, e.error))?;
        Ok(report)
    }
}

/// Write `plan` as `kind` at `output`, substituting `tokens`
pub fn write_distribution(
    plan: &AssemblyPlan,
    kind: OutputKind,
    output: &Path,
    tokens: &BTreeMap<String, String>,
) -> Result<WriteReport> {
    ArchiveWriter::new(tokens.clone()).write(plan, kind, output)
}

/// Pack the primary compiled output into a jar stamped with `manifest`
pub fn write_primary_jar(primary: &[SourceSpec], manifest: Manifest, dest: &Path) -> Result<WriteReport> {
    let plan = AssemblyPlan::primary_jar(primary.to_vec(), manifest);
    ArchiveWriter::default().write(&plan, OutputKind::Combined, dest)
}

/// Decide whether a combined-archive entry is written, updating counters
fn admit<W: Write + Seek>(
    dest: &str,
    staged: &BTreeMap<String, PathBuf>,
    sink: &ZipSink<'_, W>,
    report: &mut WriteReport,
    origin: &dyn std::fmt::Display,
) -> bool {
    if is_signature_file(dest) {
        warn!("Dropping signature {} from {}", dest, origin);
        report.signatures_stripped += 1;
        return false;
    }
    if staged.contains_key(dest) {
        debug!("{} from {} superseded by merged copy", dest, origin);
        report.services_superseded += 1;
        return false;
    }
    if sink.contains(dest) {
        if dest != MANIFEST_PATH {
            debug!("Skipping duplicate {} from {}", dest, origin);
            report.duplicates_skipped += 1;
        }
        return false;
    }
    true
}

/// Destination paths claimed so far and the segment that claimed each
struct Claims {
    policy: DuplicatePolicy,
    owners: HashMap<String, String>,
}

impl Claims {
    fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            owners: HashMap::new(),
        }
    }

    fn claim(&mut self, dest: &str, segment: &PlanSegment) -> Result<()> {
        if let Some(first) = self.owners.get(dest) {
            match self.policy {
                DuplicatePolicy::Fail => {
                    return Err(Error::DuplicateEntry {
                        path: dest.to_string(),
                        first: first.clone(),
                        second: segment.name.clone(),
                    });
                }
                DuplicatePolicy::LastWins => {
                    debug!("{} from '{}' overwrites '{}'", dest, segment.name, first);
                }
            }
        }
        self.owners.insert(dest.to_string(), segment.name.clone());
        Ok(())
    }

    /// Staged files replace earlier claims regardless of policy
    fn supersede(&mut self, dest: &str, segment: &PlanSegment) {
        self.owners.insert(dest.to_string(), segment.name.clone());
    }

    fn len(&self) -> usize {
        self.owners.len()
    }
}

/// Zip writer with reproducible entry metadata
struct ZipSink<'a, W: Write + Seek> {
    zip: ZipWriter<W>,
    written: HashSet<String>,
    prefix: &'a str,
    output: &'a Path,
}

impl<'a, W: Write + Seek> ZipSink<'a, W> {
    fn new(inner: W, prefix: &'a str, output: &'a Path) -> Self {
        Self {
            zip: ZipWriter::new(inner),
            written: HashSet::new(),
            prefix,
            output,
        }
    }

    fn contains(&self, dest: &str) -> bool {
        self.written.contains(dest)
    }

    fn len(&self) -> usize {
        self.written.len()
    }

    fn add(&mut self, dest: &str, bytes: &[u8], mode: u32) -> Result<()> {
        let name = if self.prefix.is_empty() {
            dest.to_string()
        } else {
            format!("{}/{}", self.prefix, dest)
        };
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(mode);

        self.zip
            .start_file(name, options)
            .map_err(|e| Error::write_io(self.output, io::Error::other(e)))?;
        self.zip
            .write_all(bytes)
            .map_err(|e| Error::write_io(self.output, e))?;
        self.written.insert(dest.to_string());
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        let mut inner = self
            .zip
            .finish()
            .map_err(|e| Error::write_io(self.output, io::Error::other(e)))?;
        inner.flush().map_err(|e| Error::write_io(self.output, e))
    }
}

/// Replace `output` with the staged `tree`, keeping the old tree until the
/// new one is in place
fn install_tree(tree: &Path, output: &Path) -> Result<()> {
    if !output.exists() {
        return fs::rename(tree, output).map_err(|e| Error::write_io(output, e));
    }

    let parent = prepare_parent(output)?;
    let backup: TempDir = tempfile::Builder::new()
        .prefix(".distkit-old-")
        .tempdir_in(&parent)
        .map_err(|e| Error::write_io(&parent, e))?;
    let old = backup.path().join("old");

    fs::rename(output, &old).map_err(|e| Error::write_io(output, e))?;
    if let Err(e) = fs::rename(tree, output) {
        if let Err(restore) = fs::rename(&old, output) {
            warn!("Could not restore {}: {}", output.display(), restore);
        }
        return Err(Error::write_io(output, e));
    }
    debug!("Replaced previous tree at {}", output.display());
    Ok(())
}

fn pack_tar_gz(tree: &Path, output: &Path, mtime: u64) -> Result<()> {
    let parent = prepare_parent(output)?;
    let temp = NamedTempFile::new_in(&parent).map_err(|e| Error::write_io(&parent, e))?;

    let encoder = GzEncoder::new(BufWriter::new(temp.as_file()), Compression::default());
    let mut archive = tar::Builder::new(encoder);
    append_dir_with_mtime(&mut archive, tree, "", mtime).map_err(|e| Error::write_io(output, e))?;

    let finished = archive
        .into_inner()
        .and_then(|gz| gz.finish())
        .and_then(|mut buf| buf.flush());
    finished.map_err(|e| Error::write_io(output, e))?;

    temp.persist(output).map_err(|e| Error::write_io(output, e.error))?;
    Ok(())
}

/// Append a directory tree with sorted entries and a fixed timestamp
fn append_dir_with_mtime<W: Write>(
    archive: &mut tar::Builder<W>,
    base_path: &Path,
    archive_path: &str,
    mtime: u64,
) -> io::Result<()> {
    let mut entries = fs::read_dir(base_path)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_type = entry.file_type()?;
        let file_name = entry.file_name();
        let file_name_str = file_name.to_string_lossy();

        let entry_archive_path = if archive_path.is_empty() {
            file_name_str.to_string()
        } else {
            format!("{}/{}", archive_path, file_name_str)
        };

        if file_type.is_dir() {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            header.set_mtime(mtime);
            header.set_cksum();

            archive.append_data(&mut header, &entry_archive_path, io::empty())?;
            append_dir_with_mtime(archive, &entry.path(), &entry_archive_path, mtime)?;
        } else if file_type.is_file() {
            let content = fs::read(entry.path())?;
            let metadata = entry.metadata()?;

            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(metadata.permissions().mode() & 0o7777);
            header.set_size(content.len() as u64);
            header.set_mtime(mtime);
            header.set_uid(0);
            header.set_gid(0);
            header.set_cksum();

            archive.append_data(&mut header, &entry_archive_path, content.as_slice())?;
        }
    }

    Ok(())
}

fn pack_zip(tree: &Path, output: &Path) -> Result<()> {
    let parent = prepare_parent(output)?;
    let mut temp = NamedTempFile::new_in(&parent).map_err(|e| Error::write_io(&parent, e))?;
    let mut sink = ZipSink::new(BufWriter::new(temp.as_file_mut()), "", output);

    for (relative, source) in staged_files(tree)? {
        let bytes = fs::read(&source).map_err(|e| Error::write_io(&source, e))?;
        let mode = fs::metadata(&source)
            .map(|m| m.permissions().mode() & 0o7777)
            .map_err(|e| Error::write_io(&source, e))?;
        sink.add(&relative, &bytes, mode)?;
    }

    sink.finish()?;
    temp.persist(output).map_err(|e| Error::write_io(output, e.error))?;
    Ok(())
}

/// Files under `root` as (relative path, absolute path), sorted; a missing
/// root yields nothing
fn staged_files(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::copy_io(path, e.into())
        })?;
        if entry.file_type().is_file() {
            files.push((relative_path(root, entry.path()), entry.path().to_path_buf()));
        }
    }
    Ok(files)
}

/// Join `dest` under `root` if it stays inside it
fn safe_join(root: &Path, dest: &str) -> Option<PathBuf> {
    let relative = Path::new(dest);
    let inside = relative.components().next().is_some()
        && relative.components().all(|c| matches!(c, Component::Normal(_)));
    inside.then(|| root.join(relative))
}

fn escaping_entry(entry: &SourceEntry) -> Error {
    Error::unreadable_archive(
        entry.origin_path(),
        format!("entry '{}' escapes the output root", entry.path),
    )
}

fn read_entry(entry: &SourceEntry) -> Result<Vec<u8>> {
    entry
        .read()
        .map(|bytes| bytes.into_owned())
        .map_err(|e| Error::unreadable_archive(entry.origin_path(), format!("{}: {}", entry.path, e)))
}

/// Entry permissions, falling back to the default when the source has none
fn entry_mode(entry: &SourceEntry) -> u32 {
    entry
        .mode
        .map(|m| m & 0o7777)
        .filter(|m| m & 0o777 != 0)
        .unwrap_or(DEFAULT_MODE)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::copy_io(path, io::Error::new(io::ErrorKind::InvalidInput, "no file name")))
}

fn prepare_parent(output: &Path) -> Result<PathBuf> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| Error::write_io(&parent, e))?;
    Ok(parent)
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| Error::write_io(parent, e)),
        None => Ok(()),
    }
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| Error::write_io(path, e))
}

fn write_staged(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    create_parent(path)?;
    fs::write(path, bytes).map_err(|e| Error::write_io(path, e))?;
    set_mode(path, mode)
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
