// src/pipeline/stage.rs

use crate::assembly::OutputKind;
use std::fmt;

/// Progress of one assembly run
///
/// Runs move strictly forward; there are no retries. An error raised while
/// moving into a stage is tagged with that stage's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunStage {
    Idle,
    ConfigResolved,
    SourcesExpanded,
    ServicesMerged,
    Written,
    Done,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ConfigResolved => "resolve-config",
            Self::SourcesExpanded => "expand-sources",
            Self::ServicesMerged => "merge-services",
            Self::Written => "write",
            Self::Done => "done",
        }
    }

    /// The stage after this one, `None` once done
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::ConfigResolved),
            Self::ConfigResolved => Some(Self::SourcesExpanded),
            Self::SourcesExpanded => Some(Self::ServicesMerged),
            Self::ServicesMerged => Some(Self::Written),
            Self::Written => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assembly targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKind {
    /// Directory tree at `installDir`
    Install,
    /// Full distribution tarball
    Dist,
    /// Full distribution zip
    Zip,
    /// Tarball without configuration
    DistNc,
    /// Zip without configuration
    ZipNc,
    /// Single combined archive
    Combined,
}

impl TargetKind {
    pub const ALL: [TargetKind; 6] = [
        Self::Install,
        Self::Dist,
        Self::Zip,
        Self::DistNc,
        Self::ZipNc,
        Self::Combined,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Dist => "dist",
            Self::Zip => "zip",
            Self::DistNc => "distnc",
            Self::ZipNc => "zipnc",
            Self::Combined => "combined",
        }
    }

    pub fn output_kind(&self) -> OutputKind {
        match self {
            Self::Install => OutputKind::Directory,
            Self::Dist | Self::DistNc => OutputKind::TarGz,
            Self::Zip | Self::ZipNc => OutputKind::Zip,
            Self::Combined => OutputKind::Combined,
        }
    }

    /// Look up a target by name; `installApp` is accepted for `install`
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "installApp" {
            return Some(Self::Install);
        }
        Self::ALL.iter().copied().find(|k| k.name().eq_ignore_ascii_case(name))
    }

    /// Whether the target ships the templated configuration tree
    pub fn includes_config(&self) -> bool {
        matches!(self, Self::Install | Self::Dist | Self::Zip)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
