// src/error.rs

//! Error types for distribution assembly
//!
//! Every failure carries the path that caused it. The pipeline wraps
//! component errors in [`Error::Stage`] so operators can see which step of
//! an assembly run failed.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Assembly errors
#[derive(Error, Debug)]
pub enum Error {
    /// Target property file exists but cannot be parsed
    #[error("Cannot read configuration {path}: {reason}")]
    ConfigNotReadable { path: PathBuf, reason: String },

    /// Unreadable source or unwritable destination during filtered copy
    #[error("Copy failed for {path}: {source}")]
    CopyIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Corrupt or unsupported dependency container
    #[error("Unreadable archive {path}: {reason}")]
    UnreadableArchive { path: PathBuf, reason: String },

    /// Service registration file that is not valid UTF-8 text
    #[error("Service registration file {path} in {origin} is not valid UTF-8")]
    ServiceFileUnreadable { path: String, origin: PathBuf },

    /// Failure writing the final output
    #[error("Write failed for {path}: {source}")]
    WriteIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Two plan segments claim the same destination path
    #[error("Duplicate destination {path} (segments '{first}' and '{second}')")]
    DuplicateEntry {
        path: String,
        first: String,
        second: String,
    },

    /// Include/exclude rule that is not a valid glob
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Project descriptor missing or invalid
    #[error("Invalid project descriptor {path}: {reason}")]
    Project { path: PathBuf, reason: String },

    /// A component error annotated with the pipeline stage and target
    #[error("{target}: stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        target: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the stage it occurred in
    pub fn in_stage(self, stage: &'static str, target: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            target: target.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping stage annotations
    pub fn root(&self) -> &Error {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn copy_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::CopyIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unreadable_archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UnreadableArchive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display_names_stage_and_path() {
        let err = Error::write_io(
            "/tmp/out.jar",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        )
        .in_stage("write", "combined");

        let msg = err.to_string();
        assert!(msg.contains("combined"));
        assert!(msg.contains("write"));
        assert!(matches!(err.root(), Error::WriteIo { .. }));
    }

    #[test]
    fn test_root_of_unwrapped_error_is_itself() {
        let err = Error::unreadable_archive("/x.jar", "bad header");
        assert!(matches!(err.root(), Error::UnreadableArchive { .. }));
        assert!(err.to_string().contains("/x.jar"));
    }
}
