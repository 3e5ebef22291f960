// src/services/mod.rs
//! Service registration merge
//!
//! Several archives may register providers for the same service interface
//! under `META-INF/services/<interface>`. A combined archive can only carry
//! one such file per interface, so the merger unions every contribution with
//! first-seen ordering and writes the result to a staging directory that the
//! archive writer overlays on top of the raw entries.
//!
//! The merger also reports signature metadata (`META-INF/*.SF` and friends)
//! that will be dropped, since member signatures cannot survive re-packaging.

mod table;

pub use table::{ProviderSet, ServiceRegistrationTable};

use crate::archive::SourceEntry;
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Fixed registration directory
pub const SERVICES_DIR: &str = "META-INF/services/";

/// Signature file suffixes under `META-INF/`
pub const SIGNATURE_SUFFIXES: &[&str] = &[".SF", ".DSA", ".RSA", ".EC"];

/// Signature file name prefix under `META-INF/`
pub const SIGNATURE_PREFIX: &str = "SIG-";

/// Whether `path` is a registration file (directly under the services dir)
pub fn is_service_file(path: &str) -> bool {
    path.strip_prefix(SERVICES_DIR)
        .is_some_and(|name| !name.is_empty() && !name.contains('/'))
}

/// Whether `path` is signature metadata that must not be re-packaged
pub fn is_signature_file(path: &str) -> bool {
    let Some(name) = path.strip_prefix("META-INF/") else {
        return false;
    };
    if name.contains('/') {
        return false;
    }
    let upper = name.to_ascii_uppercase();
    upper.starts_with(SIGNATURE_PREFIX) || SIGNATURE_SUFFIXES.iter().any(|s| upper.ends_with(s))
}

/// Signature metadata found while merging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedSignature {
    /// Archive (or directory file) the signature came from
    pub origin: PathBuf,
    /// Entry path inside it
    pub path: String,
}

/// Result of a merge pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub table: ServiceRegistrationTable,
    pub stripped_signatures: Vec<StrippedSignature>,
}

/// Accumulates registration files from a stream of entries
#[derive(Debug, Default)]
pub struct ServiceDescriptorMerger {
    outcome: MergeOutcome,
}

impl ServiceDescriptorMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one entry; entries must arrive in classpath order
    pub fn accept(&mut self, entry: &SourceEntry) -> Result<()> {
        if is_signature_file(&entry.path) {
            warn!(
                "Stripping signature {} from {}; the combined archive cannot carry member signatures",
                entry.path,
                entry.origin_path().display()
            );
            self.outcome.stripped_signatures.push(StrippedSignature {
                origin: entry.origin_path().to_path_buf(),
                path: entry.path.clone(),
            });
            return Ok(());
        }

        if !is_service_file(&entry.path) {
            return Ok(());
        }

        let bytes = entry.read().map_err(|e| Error::UnreadableArchive {
            path: entry.origin_path().to_path_buf(),
            reason: format!("{}: {}", entry.path, e),
        })?;
        let text = std::str::from_utf8(&bytes).map_err(|_| Error::ServiceFileUnreadable {
            path: entry.path.clone(),
            origin: entry.origin_path().to_path_buf(),
        })?;

        let added = self.outcome.table.add_lines(&entry.path, text);
        debug!(
            "{} from {}: {} new provider(s)",
            entry.path,
            entry.origin_path().display(),
            added
        );
        Ok(())
    }

    /// Finish the pass
    pub fn finish(self) -> MergeOutcome {
        info!(
            "Merged {} service registration file(s), {} signature file(s) stripped",
            self.outcome.table.len(),
            self.outcome.stripped_signatures.len()
        );
        self.outcome
    }
}

/// Merge all registration files in `sources`
///
/// Any source error, or a registration file that is not UTF-8, aborts the
/// merge: a partial table would silently drop providers.
pub fn merge<I>(sources: I) -> Result<MergeOutcome>
where
    I: IntoIterator<Item = Result<SourceEntry>>,
{
    let mut merger = ServiceDescriptorMerger::new();
    for entry in sources {
        merger.accept(&entry?)?;
    }
    Ok(merger.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::SourceOrigin;
    use std::path::Path;

    fn dep(path: &str, archive: &str, content: &[u8]) -> Result<SourceEntry> {
        Ok(SourceEntry::from_archive(
            path,
            Path::new(archive),
            SourceOrigin::Dependency,
            None,
            content.to_vec(),
        ))
    }

    #[test]
    fn test_is_service_file() {
        assert!(is_service_file("META-INF/services/com.acme.Spi"));
        assert!(!is_service_file("META-INF/services/"));
        assert!(!is_service_file("META-INF/services/nested/com.acme.Spi"));
        assert!(!is_service_file("META-INF/MANIFEST.MF"));
    }

    #[test]
    fn test_is_signature_file() {
        assert!(is_signature_file("META-INF/foo.SF"));
        assert!(is_signature_file("META-INF/FOO.DSA"));
        assert!(is_signature_file("META-INF/foo.rsa"));
        assert!(is_signature_file("META-INF/KEY.EC"));
        assert!(is_signature_file("META-INF/SIG-BOUNCY"));
        assert!(!is_signature_file("META-INF/MANIFEST.MF"));
        assert!(!is_signature_file("META-INF/services/foo.SF"));
        assert!(!is_signature_file("com/acme/foo.SF"));
    }

    #[test]
    fn test_primary_first_then_dependency_order() {
        let primary = Ok(SourceEntry::from_bytes(
            "META-INF/services/com.X",
            SourceOrigin::PrimaryOutput,
            b"ImplA\n".to_vec(),
        ));
        let dependency = dep("META-INF/services/com.X", "/libs/dep.jar", b"ImplA\nImplB\n");

        let outcome = merge(vec![primary, dependency]).unwrap();
        let providers: Vec<_> = outcome.table.providers("META-INF/services/com.X").unwrap().iter().collect();
        assert_eq!(providers, vec!["ImplA", "ImplB"]);
    }

    #[test]
    fn test_blank_and_comment_lines_dropped() {
        let outcome = merge(vec![dep(
            "META-INF/services/com.X",
            "/libs/a.jar",
            b"# header\n\n   \n  ImplA  \n\t# indented comment\nImplB # trailing\n",
        )])
        .unwrap();
        let providers: Vec<_> = outcome.table.providers("META-INF/services/com.X").unwrap().iter().collect();
        assert_eq!(providers, vec!["ImplA", "ImplB"]);
    }

    #[test]
    fn test_signature_reported() {
        let outcome = merge(vec![
            dep("META-INF/foo.SF", "/libs/signed.jar", b"Signature-Version: 1.0\n"),
            dep("com/acme/A.class", "/libs/signed.jar", b"cafe"),
        ])
        .unwrap();
        assert_eq!(
            outcome.stripped_signatures,
            vec![StrippedSignature {
                origin: PathBuf::from("/libs/signed.jar"),
                path: "META-INF/foo.SF".to_string(),
            }]
        );
        assert!(outcome.table.is_empty());
    }

    #[test]
    fn test_non_utf8_service_file_aborts() {
        let err = merge(vec![
            dep("META-INF/services/com.X", "/libs/a.jar", b"ImplA\n"),
            dep("META-INF/services/com.Y", "/libs/b.jar", b"\xff\xfeImpl"),
        ])
        .unwrap_err();
        match err {
            Error::ServiceFileUnreadable { path, origin } => {
                assert_eq!(path, "META-INF/services/com.Y");
                assert_eq!(origin, PathBuf::from("/libs/b.jar"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_source_error_aborts() {
        let err = merge(vec![
            dep("META-INF/services/com.X", "/libs/a.jar", b"ImplA\n"),
            Err(Error::unreadable_archive("/libs/bad.jar", "corrupt")),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::UnreadableArchive { .. }));
    }
}
