// src/assembly/mod.rs
//! Assembly plans and output writers
//!
//! A target is described as an [`AssemblyPlan`]: ordered segments of
//! filtered templates, loose files and expanded archives. [`ArchiveWriter`]
//! turns a plan into a directory, a tarball, a zip or a combined archive.

pub mod manifest;
pub mod metadata;
pub mod plan;
mod writer;

pub use manifest::{Manifest, DEFAULT_MAIN_CLASS, LIB_DIR, MANIFEST_PATH};
pub use metadata::{BuildMetadata, BUILDINFO_FILE, REVISION_FILE, UNKNOWN_REVISION};
pub use plan::{
    AssemblyPlan, DistributionInputs, DuplicatePolicy, PlanSegment, SegmentSource, BIN_DIR,
    WEBAPPS_DIR,
};
pub use writer::{
    reproducible_mtime, write_distribution, write_primary_jar, ArchiveWriter, OutputKind,
    WriteReport, DEFAULT_MTIME,
};
