// src/config/resolver.rs

use super::properties;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Target used when the caller does not name one
pub const DEFAULT_TARGET: &str = "devel";

/// Distribution template directory, relative to the project root
pub const DEFAULT_DIST_DIR: &str = "src/dist";

const KEY_JAR_NAME: &str = "archiveJarName";
const KEY_JAR_NAME_LEGACY: &str = "jarname";
const KEY_WAR_NAME: &str = "archiveWarName";
const KEY_INSTALL_DIR: &str = "installDir";
const KEY_DIST_DIR: &str = "distDir";
const KEY_ADD_BUILD_TIME: &str = "addBuildTime";
const KEY_ADD_GIT_REVISION: &str = "addGitRevision";

/// Caller-supplied overrides, highest precedence
pub type Overrides = BTreeMap<String, String>;

/// Identity of the project being assembled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    /// Project name (used for the install directory and archive titles)
    pub name: String,
    /// Base name for produced archives
    pub archives_name: String,
    /// Project version
    pub version: String,
    /// Build output directory
    pub build_dir: PathBuf,
}

impl ProjectIdentity {
    /// Create an identity whose archive base name equals the project name
    pub fn new(name: impl Into<String>, version: impl Into<String>, build_dir: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            archives_name: name.clone(),
            name,
            version: version.into(),
            build_dir: build_dir.into(),
        }
    }

    /// Override the archive base name
    pub fn with_archives_name(mut self, archives_name: impl Into<String>) -> Self {
        self.archives_name = archives_name.into();
        self
    }
}

/// Boolean switches recognized in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildFlags {
    /// Write `buildinfo.properties` into the primary output
    pub add_build_time: bool,
    /// Write `revision.properties` into the primary output
    pub add_git_revision: bool,
}

impl Default for BuildFlags {
    fn default() -> Self {
        Self {
            add_build_time: true,
            add_git_revision: true,
        }
    }
}

/// Fully resolved configuration for one target
///
/// Reserved keys live in typed fields; everything else is kept verbatim in
/// a pass-through map and used as substitution tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationMap {
    pub target: String,
    pub archive_jar_name: String,
    pub archive_war_name: String,
    pub install_dir: String,
    pub dist_dir: String,
    pub flags: BuildFlags,
    extra: BTreeMap<String, String>,
}

impl ConfigurationMap {
    /// Convention layer derived from project identity alone
    pub fn conventions(identity: &ProjectIdentity, target: &str) -> Self {
        Self {
            target: target.to_string(),
            archive_jar_name: format!("{}-{}.jar", identity.archives_name, identity.version),
            archive_war_name: format!("{}-{}.war", identity.archives_name, identity.version),
            install_dir: format!("{}/install/{}", identity.build_dir.display(), identity.name),
            dist_dir: DEFAULT_DIST_DIR.to_string(),
            flags: BuildFlags::default(),
            extra: BTreeMap::new(),
        }
    }

    /// Overlay a layer of raw key/value pairs
    ///
    /// `origin` names the layer in error messages.
    pub fn apply_layer(&mut self, layer: &BTreeMap<String, String>, origin: &Path) -> Result<()> {
        for (key, value) in layer {
            match key.as_str() {
                KEY_JAR_NAME | KEY_JAR_NAME_LEGACY => self.archive_jar_name = value.clone(),
                KEY_WAR_NAME => self.archive_war_name = value.clone(),
                KEY_INSTALL_DIR => self.install_dir = value.clone(),
                KEY_DIST_DIR => self.dist_dir = value.clone(),
                KEY_ADD_BUILD_TIME => {
                    self.flags.add_build_time = parse_flag(key, value, origin)?;
                    self.extra.insert(key.clone(), value.clone());
                }
                KEY_ADD_GIT_REVISION => {
                    self.flags.add_git_revision = parse_flag(key, value, origin)?;
                    self.extra.insert(key.clone(), value.clone());
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    /// Look up a token value, including reserved keys
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            KEY_JAR_NAME | KEY_JAR_NAME_LEGACY => Some(&self.archive_jar_name),
            KEY_WAR_NAME => Some(&self.archive_war_name),
            KEY_INSTALL_DIR => Some(&self.install_dir),
            KEY_DIST_DIR => Some(&self.dist_dir),
            _ => self.extra.get(key).map(String::as_str),
        }
    }

    /// Keys that are not reserved, in key order
    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    /// Flattened token map used for `${key}` substitution
    pub fn tokens(&self) -> BTreeMap<String, String> {
        let mut tokens = self.extra.clone();
        tokens.insert(KEY_JAR_NAME.to_string(), self.archive_jar_name.clone());
        tokens.insert(KEY_JAR_NAME_LEGACY.to_string(), self.archive_jar_name.clone());
        tokens.insert(KEY_WAR_NAME.to_string(), self.archive_war_name.clone());
        tokens.insert(KEY_INSTALL_DIR.to_string(), self.install_dir.clone());
        tokens.insert(KEY_DIST_DIR.to_string(), self.dist_dir.clone());
        tokens
    }

    /// Every resolved setting, one entry per key
    ///
    /// Token values plus the build flags in their normalized form, so a flag
    /// set in the property file appears once.
    pub fn summary(&self) -> BTreeMap<String, String> {
        let mut summary = self.tokens();
        summary.insert(KEY_ADD_BUILD_TIME.to_string(), self.flags.add_build_time.to_string());
        summary.insert(KEY_ADD_GIT_REVISION.to_string(), self.flags.add_git_revision.to_string());
        summary
    }

    /// Install directory as a path, relative paths resolved against `root`
    pub fn install_dir_path(&self, root: &Path) -> PathBuf {
        root.join(&self.install_dir)
    }

    /// Distribution template directory, relative paths resolved against `root`
    pub fn dist_dir_path(&self, root: &Path) -> PathBuf {
        root.join(&self.dist_dir)
    }
}

fn parse_flag(key: &str, value: &str, origin: &Path) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::ConfigNotReadable {
            path: origin.to_path_buf(),
            reason: format!("{} must be true or false, got '{}'", key, value),
        }),
    }
}

/// Loads `<target>.properties` and layers it over conventions
#[derive(Debug, Clone)]
pub struct PropertyResolver {
    root_dir: PathBuf,
}

impl PropertyResolver {
    /// Create a resolver that looks for target files in `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Path of the property file for a target
    pub fn target_file(&self, target: &str) -> PathBuf {
        self.root_dir.join(format!("{}.properties", target))
    }

    /// Resolve the configuration for `target`
    ///
    /// A missing target file is not an error; the result is then the
    /// conventions plus overrides.
    pub fn resolve(
        &self,
        identity: &ProjectIdentity,
        target: &str,
        overrides: Option<&Overrides>,
    ) -> Result<ConfigurationMap> {
        let mut config = ConfigurationMap::conventions(identity, target);

        let path = self.target_file(target);
        match fs::read(&path) {
            Ok(bytes) => {
                let layer = properties::parse_bytes(&bytes).map_err(|e| Error::ConfigNotReadable {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                info!("Loaded {} properties from {}", layer.len(), path.display());
                config.apply_layer(&layer, &path)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No target file at {}, using conventions", path.display());
            }
            Err(e) => {
                return Err(Error::ConfigNotReadable {
                    path,
                    reason: e.to_string(),
                });
            }
        }

        if let Some(overrides) = overrides {
            config.apply_layer(overrides, Path::new("<overrides>"))?;
        }

        debug!("Resolved configuration for target '{}': {:?}", target, config);
        Ok(config)
    }
}
