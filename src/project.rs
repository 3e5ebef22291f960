// src/project.rs

//! Project descriptor (`distkit.toml`)
//!
//! The descriptor names the project, where its compiled output and
//! dependencies live, and the metadata maps used for the generated build
//! resources. Relative paths are resolved against the descriptor's directory.

use crate::archive::SourceSpec;
use crate::assembly::{BuildMetadata, DEFAULT_MAIN_CLASS};
use crate::config::{ProjectIdentity, PropertyResolver};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default descriptor file name
pub const PROJECT_FILE: &str = "distkit.toml";

/// Raw descriptor as written on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    pub project: ProjectSection,

    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub metadata: MetadataSection,
}

/// `[project]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    pub name: String,
    pub version: String,

    /// Base name for archives, defaults to `name`
    #[serde(default)]
    pub archives_name: Option<String>,

    /// Entry point written to `Main-Class`
    #[serde(default)]
    pub main_class: Option<String>,
}

/// `[paths]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsSection {
    /// Directory holding `<target>.properties`
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Compiled classes (directory or archive)
    #[serde(default = "default_primary_output")]
    pub primary_output: PathBuf,

    /// Processed resources packed with the primary output
    #[serde(default)]
    pub resources_dir: Option<PathBuf>,

    /// Runtime dependencies in classpath order
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,

    /// Web archives; when absent, `*.war` directly in the build dir
    #[serde(default)]
    pub webapps: Option<Vec<PathBuf>>,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            build_dir: default_build_dir(),
            primary_output: default_primary_output(),
            resources_dir: None,
            dependencies: Vec::new(),
            webapps: None,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_primary_output() -> PathBuf {
    PathBuf::from("build/classes")
}

/// `[metadata.*]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSection {
    #[serde(default)]
    pub revision: BTreeMap<String, String>,

    #[serde(default)]
    pub buildinfo: BTreeMap<String, String>,
}

/// Loaded project with absolute paths
#[derive(Debug, Clone)]
pub struct Project {
    pub identity: ProjectIdentity,
    pub main_class: String,
    pub root: PathBuf,
    pub build_dir: PathBuf,
    pub primary_output: PathBuf,
    pub resources_dir: Option<PathBuf>,
    pub dependencies: Vec<PathBuf>,
    webapps: Option<Vec<PathBuf>>,
    pub metadata: BuildMetadata,
}

impl Project {
    /// Load a descriptor from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::Project {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let base = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::parse(&text, &base, path)
    }

    /// Parse descriptor text, resolving relative paths against `base`
    pub fn parse(text: &str, base: &Path, origin: &Path) -> Result<Self> {
        let file: ProjectFile = toml::from_str(text).map_err(|e| Error::Project {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_file(file, base, origin)
    }

    fn from_file(file: ProjectFile, base: &Path, origin: &Path) -> Result<Self> {
        let invalid = |reason: &str| Error::Project {
            path: origin.to_path_buf(),
            reason: reason.to_string(),
        };
        if file.project.name.trim().is_empty() {
            return Err(invalid("project.name must not be empty"));
        }
        if file.project.version.trim().is_empty() {
            return Err(invalid("project.version must not be empty"));
        }

        let paths = file.paths;
        let build_dir = base.join(&paths.build_dir);

        let mut identity = ProjectIdentity::new(&file.project.name, &file.project.version, &build_dir);
        if let Some(archives_name) = file.project.archives_name {
            identity = identity.with_archives_name(archives_name);
        }

        let project = Self {
            identity,
            main_class: file
                .project
                .main_class
                .unwrap_or_else(|| DEFAULT_MAIN_CLASS.to_string()),
            root: base.join(&paths.root),
            build_dir,
            primary_output: base.join(&paths.primary_output),
            resources_dir: paths.resources_dir.map(|p| base.join(p)),
            dependencies: paths.dependencies.iter().map(|p| base.join(p)).collect(),
            webapps: paths
                .webapps
                .map(|list| list.iter().map(|p| base.join(p)).collect()),
            metadata: BuildMetadata {
                buildinfo: file.metadata.buildinfo,
                revision: file.metadata.revision,
            },
        };
        debug!("Loaded project {} {}", project.identity.name, project.identity.version);
        Ok(project)
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> &str {
        &self.identity.version
    }

    /// Resolver reading `<target>.properties` from the project root
    pub fn resolver(&self) -> PropertyResolver {
        PropertyResolver::new(&self.root)
    }

    /// Primary output sources: compiled classes, then resources if present
    pub fn primary_sources(&self) -> Vec<SourceSpec> {
        let mut sources = vec![SourceSpec::primary(&self.primary_output)];
        if let Some(resources) = &self.resources_dir {
            if resources.exists() {
                sources.push(SourceSpec::primary(resources));
            }
        }
        sources
    }

    /// Dependencies in classpath order
    pub fn dependency_sources(&self) -> Vec<SourceSpec> {
        self.dependencies.iter().map(SourceSpec::dependency).collect()
    }

    /// Web archives: the listed ones, or `*.war` found in the build dir
    pub fn webapps(&self) -> Result<Vec<PathBuf>> {
        if let Some(listed) = &self.webapps {
            return Ok(listed.clone());
        }

        let pattern = format!(
            "{}/*.war",
            glob::Pattern::escape(&self.build_dir.to_string_lossy())
        );
        let entries = glob::glob(&pattern).map_err(|e| Error::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;

        let mut wars = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Error::copy_io(e.path().to_path_buf(), e.into_error()))?;
            if path.is_file() {
                wars.push(path);
            }
        }
        wars.sort();
        Ok(wars)
    }

    /// `<build>/distributions`
    pub fn distributions_dir(&self) -> PathBuf {
        self.build_dir.join("distributions")
    }

    /// `<build>/libs`
    pub fn libs_dir(&self) -> PathBuf {
        self.build_dir.join("libs")
    }
}
