// src/archive/mod.rs
//! Uniform entry view over directories and archives
//!
//! [`ArchiveExpander::expand`] turns a list of source paths into a lazy
//! sequence of [`SourceEntry`] values. Directories are walked, archives are
//! read in place without extracting anything to disk. Each archive handle is
//! opened once and dropped as soon as its entries are exhausted or the
//! sequence itself is dropped.

mod entry;
mod expander;

pub use entry::{EntryContent, SourceEntry, SourceOrigin, SourceSpec};
pub use expander::{ArchiveExpander, ArchiveFormat, CorruptArchivePolicy, EntrySource, Expansion};

/// Expand sources with the default (abort on corrupt archive) policy
pub fn expand(sources: &[SourceSpec]) -> Expansion {
    ArchiveExpander::default().expand(sources)
}
