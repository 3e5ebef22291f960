// src/filter/rules.rs

//! Include/exclude rules and permission policy for filtered copies

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};

/// Files never passed through token substitution in a distribution tree
pub const STANDARD_EXCLUDES: &[&str] = &[
    "cfg/*.lmk",
    "cfg/*.jks",
    "cfg/*.ks",
    "cfg/*.ser",
    "cfg/*.p12",
    "**/*.jpg",
    "**/*.gif",
    "**/*.png",
    "**/*.pdf",
    "**/*.ico",
    "**/*.war",
    "**/*.dat",
];

/// Key material copied byte-for-byte with owner-only permissions
pub const SENSITIVE_INCLUDES: &[&str] = &[
    "cfg/*.lmk",
    "cfg/*.ks",
    "cfg/*.jks",
    "cfg/*.ser",
    "cfg/authorized_keys",
];

/// Owner read/write only
pub const SENSITIVE_MODE: u32 = 0o600;
/// Owner rwx, group r-x, other r--
pub const SCRIPT_MODE: u32 = 0o754;
/// Plain file mode
pub const DEFAULT_MODE: u32 = 0o644;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled set of glob patterns matched against `/`-separated relative paths
///
/// `*` stays within one path segment; a leading `**/` also matches files at
/// the tree root.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Compile a set of patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut set = Self::default();
        set.extend(patterns)?;
        Ok(set)
    }

    /// Add more patterns to the set
    pub fn extend<S: AsRef<str>>(&mut self, patterns: &[S]) -> Result<()> {
        for raw in patterns {
            let raw = raw.as_ref();
            let compiled = Pattern::new(raw).map_err(|e| Error::InvalidPattern {
                pattern: raw.to_string(),
                reason: e.msg.to_string(),
            })?;
            self.patterns.push(compiled);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Check whether any pattern matches the relative path
    pub fn matches(&self, relative: &str) -> bool {
        self.patterns.iter().any(|p| {
            p.matches_with(relative, MATCH_OPTIONS)
                || p
                    .as_str()
                    .strip_prefix("**/")
                    .is_some_and(|rest| {
                        Pattern::new(rest).is_ok_and(|r| r.matches_with(relative, MATCH_OPTIONS))
                    })
        })
    }
}

/// How a selected file is copied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    /// `${key}` substitution, then written with the policy's mode
    Substitute,
    /// Byte-for-byte copy with the sensitive mode
    Raw,
}

/// Selection rules for one filtered copy
///
/// Evaluation order per file: extra excludes drop it; a raw match copies it
/// untouched; an exclude match drops it; otherwise it is substituted when it
/// matches the includes (an empty include set matches everything).
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    pub includes: PatternSet,
    pub excludes: PatternSet,
    pub extra_excludes: PatternSet,
    /// Directory prepended to a file's relative path before extra excludes
    /// are matched, for copies rooted below the distribution template
    pub extra_base: Option<String>,
    pub raw: PatternSet,
    /// Copy only raw matches; nothing is substituted
    pub raw_only: bool,
}

impl FilterRules {
    /// Substitute everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Rules for a distribution template tree: the standard exclude set plus
    /// per-target extra excludes
    ///
    /// Key material is excluded too; it belongs to [`FilterRules::sensitive`].
    pub fn distribution<S: AsRef<str>>(extra_excludes: &[S]) -> Result<Self> {
        let mut excludes = PatternSet::new(STANDARD_EXCLUDES)?;
        excludes.extend(SENSITIVE_INCLUDES)?;
        Ok(Self {
            excludes,
            extra_excludes: PatternSet::new(extra_excludes)?,
            ..Self::default()
        })
    }

    /// Match extra excludes as if files lived under `base`
    pub fn with_extra_base(mut self, base: impl Into<String>) -> Self {
        self.extra_base = Some(base.into());
        self
    }

    /// Rules that select only key material, copied raw
    pub fn sensitive() -> Result<Self> {
        Ok(Self {
            raw: PatternSet::new(SENSITIVE_INCLUDES)?,
            raw_only: true,
            ..Self::default()
        })
    }

    /// Add caller include patterns
    pub fn with_includes<S: AsRef<str>>(mut self, includes: &[S]) -> Result<Self> {
        self.includes.extend(includes)?;
        Ok(self)
    }

    /// Add caller exclude patterns
    pub fn with_excludes<S: AsRef<str>>(mut self, excludes: &[S]) -> Result<Self> {
        self.excludes.extend(excludes)?;
        Ok(self)
    }

    /// Also copy key material raw as part of this copy
    pub fn with_sensitive_raw(mut self) -> Result<Self> {
        self.raw.extend(SENSITIVE_INCLUDES)?;
        Ok(self)
    }

    /// Decide what happens to a relative path; `None` means skipped
    pub fn classify(&self, relative: &str) -> Option<Treatment> {
        let excluded = match &self.extra_base {
            Some(base) => self.extra_excludes.matches(&format!("{}/{}", base, relative)),
            None => self.extra_excludes.matches(relative),
        };
        if excluded {
            return None;
        }
        if self.raw.matches(relative) {
            return Some(Treatment::Raw);
        }
        if self.raw_only || self.excludes.matches(relative) {
            return None;
        }
        if self.includes.is_empty() || self.includes.matches(relative) {
            return Some(Treatment::Substitute);
        }
        None
    }
}

/// Which substituted files become executable scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptScope {
    /// No file is a script
    None,
    /// Files under this relative directory
    Subtree(String),
    /// Every substituted file
    All,
}

/// File modes applied by a filtered copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPolicy {
    pub default_mode: u32,
    pub script_mode: u32,
    pub sensitive_mode: u32,
    pub scripts: ScriptScope,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self {
            default_mode: DEFAULT_MODE,
            script_mode: SCRIPT_MODE,
            sensitive_mode: SENSITIVE_MODE,
            scripts: ScriptScope::Subtree("bin".to_string()),
        }
    }
}

impl PermissionPolicy {
    /// Policy for a tree that consists only of scripts
    pub fn scripts_only() -> Self {
        Self {
            scripts: ScriptScope::All,
            ..Self::default()
        }
    }

    /// Mode for a file at `relative` copied with `treatment`
    pub fn mode_for(&self, relative: &str, treatment: Treatment) -> u32 {
        if treatment == Treatment::Raw {
            return self.sensitive_mode;
        }
        let is_script = match &self.scripts {
            ScriptScope::None => false,
            ScriptScope::All => true,
            ScriptScope::Subtree(dir) => relative
                .strip_prefix(dir.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
        };
        if is_script {
            self.script_mode
        } else {
            self.default_mode
        }
    }
}
