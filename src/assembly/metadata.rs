// src/assembly/metadata.rs

//! Build metadata resources
//!
//! `buildinfo.properties` and `revision.properties` are generated into a
//! per-run resources directory that is packed alongside the primary output.
//! The project's own output directories are never written to.

use crate::config::properties;
use crate::config::BuildFlags;
use crate::error::{Error, Result};
use crate::filter::{write_atomic, DEFAULT_MODE};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BUILDINFO_FILE: &str = "buildinfo.properties";
pub const REVISION_FILE: &str = "revision.properties";

/// Value used when the revision map has no `revision` key
pub const UNKNOWN_REVISION: &str = "unknown";

/// Caller-supplied metadata maps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildMetadata {
    pub buildinfo: BTreeMap<String, String>,
    pub revision: BTreeMap<String, String>,
}

impl BuildMetadata {
    /// Revision map with the `revision` fallback applied
    pub fn revision_properties(&self) -> BTreeMap<String, String> {
        let mut props = self.revision.clone();
        props
            .entry("revision".to_string())
            .or_insert_with(|| UNKNOWN_REVISION.to_string());
        props
    }

    /// Write the enabled resources into `resources_dir`, returning their paths
    pub fn write(&self, flags: &BuildFlags, resources_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        if flags.add_build_time {
            let text = properties::store(&self.buildinfo, Some("Build information"));
            written.push(write_resource(resources_dir, BUILDINFO_FILE, &text)?);
        }
        if flags.add_git_revision {
            let text = properties::store(&self.revision_properties(), Some("Source revision"));
            written.push(write_resource(resources_dir, REVISION_FILE, &text)?);
        }

        Ok(written)
    }
}

fn write_resource(dir: &Path, name: &str, text: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    write_atomic(&path, text.as_bytes(), DEFAULT_MODE).map_err(|e| Error::write_io(&path, e))?;
    debug!("Generated {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn metadata() -> BuildMetadata {
        BuildMetadata {
            buildinfo: [("buildTimestamp".to_string(), "2024-01-01T00:00:00Z".to_string())]
                .into_iter()
                .collect(),
            revision: [("branch".to_string(), "main".to_string())].into_iter().collect(),
        }
    }

    #[test]
    fn test_missing_revision_defaults_to_unknown() {
        let props = metadata().revision_properties();
        assert_eq!(props.get("revision").map(String::as_str), Some("unknown"));
        assert_eq!(props.get("branch").map(String::as_str), Some("main"));
    }

    #[test]
    fn test_writes_both_resources_by_default() {
        let dir = TempDir::new().unwrap();
        let written = metadata().write(&BuildFlags::default(), dir.path()).unwrap();
        assert_eq!(written.len(), 2);

        let buildinfo = fs::read_to_string(dir.path().join(BUILDINFO_FILE)).unwrap();
        assert!(buildinfo.starts_with("#Build information\n"));
        let parsed = properties::parse(&buildinfo).unwrap();
        assert_eq!(parsed.get("buildTimestamp").map(String::as_str), Some("2024-01-01T00:00:00Z"));

        let revision = properties::parse(&fs::read_to_string(dir.path().join(REVISION_FILE)).unwrap()).unwrap();
        assert_eq!(revision.get("revision").map(String::as_str), Some("unknown"));
    }

    #[test]
    fn test_flags_disable_resources() {
        let dir = TempDir::new().unwrap();
        let flags = BuildFlags {
            add_build_time: false,
            add_git_revision: true,
        };
        metadata().write(&flags, dir.path()).unwrap();
        assert!(!dir.path().join(BUILDINFO_FILE).exists());
        assert!(dir.path().join(REVISION_FILE).exists());
    }
}
