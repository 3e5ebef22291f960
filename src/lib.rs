// src/lib.rs

//! distkit: application distribution assembly
//!
//! Builds install trees, distribution archives and combined single archives
//! for JVM applications from a project descriptor and per-target property
//! files.
//!
//! # Architecture
//!
//! - Configuration: conventions < `<target>.properties` < overrides
//! - Filtered copy: `${key}` substitution with include/exclude globs and
//!   per-file permissions
//! - Expansion: directories and archives read as one lazy entry sequence
//! - Service merge: `META-INF/services` files unioned in classpath order
//! - Assembly: ordered plan segments written atomically as a directory,
//!   tar.gz, zip or combined archive

pub mod archive;
pub mod assembly;
pub mod config;
mod error;
pub mod filter;
pub mod pipeline;
pub mod project;
pub mod services;

pub use archive::{CorruptArchivePolicy, SourceEntry, SourceOrigin, SourceSpec};
pub use assembly::{
    write_distribution, write_primary_jar, ArchiveWriter, AssemblyPlan, DuplicatePolicy, Manifest,
    OutputKind, WriteReport,
};
pub use config::{BuildFlags, ConfigurationMap, Overrides, ProjectIdentity, PropertyResolver};
pub use error::{Error, Result};
pub use filter::{copy_filtered_tree, CopyReport, FilterRules, PermissionPolicy};
pub use pipeline::{Assembler, RunReport, RunStage, TargetKind};
pub use project::{Project, PROJECT_FILE};
pub use services::{merge, MergeOutcome, ServiceRegistrationTable, StrippedSignature};
