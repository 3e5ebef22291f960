// src/filter/mod.rs
//! Token-filtered tree copy
//!
//! Copies a configuration/template tree to a destination, replacing `${key}`
//! tokens with values from the resolved configuration. Key material is copied
//! byte-for-byte with owner-only permissions, scripts become executable.
//!
//! Every file is fully buffered and written through a temporary file that is
//! renamed into place, so a failed copy never leaves a half-substituted file.

mod rules;

pub use rules::{
    FilterRules, PatternSet, PermissionPolicy, ScriptScope, Treatment, DEFAULT_MODE,
    SCRIPT_MODE, SENSITIVE_INCLUDES, SENSITIVE_MODE, STANDARD_EXCLUDES,
};

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// A file chosen for copying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Absolute source path
    pub source: PathBuf,
    /// `/`-separated path relative to the source root
    pub relative: String,
    pub treatment: Treatment,
}

/// Summary of a filtered copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Files written with token substitution
    pub filtered: usize,
    /// Files copied byte-for-byte
    pub raw: usize,
    /// Total tokens replaced
    pub tokens_replaced: usize,
    /// Relative paths written, in copy order
    pub files: Vec<String>,
}

/// Replace `${key}` tokens in `text`
///
/// Unknown keys and unterminated tokens are left verbatim. Returns the new
/// text and the number of replacements.
pub fn substitute_tokens(text: &str, tokens: &BTreeMap<String, String>) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut replaced = 0;
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after
            .find('}')
            .and_then(|end| tokens.get(&after[..end]).map(|v| (end, v)));

        match value {
            Some((end, v)) => {
                out.push_str(v);
                replaced += 1;
                rest = &after[end + 1..];
            }
            None => {
                out.push('$');
                rest = &rest[start + 1..];
            }
        }
    }
    out.push_str(rest);

    (out, replaced)
}

/// List the files under `src_root` selected by `rules`, sorted by path
///
/// A missing source root selects nothing.
pub fn select_files(src_root: &Path, rules: &FilterRules) -> Result<Vec<SelectedFile>> {
    if !src_root.exists() {
        debug!("Source tree {} does not exist, nothing to copy", src_root.display());
        return Ok(Vec::new());
    }

    let mut selected = Vec::new();
    for entry in WalkDir::new(src_root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src_root).to_path_buf();
            Error::copy_io(path, e.into())
        })?;

        let is_file = entry.file_type().is_file()
            || (entry.file_type().is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }

        let relative = relative_path(src_root, entry.path());
        if let Some(treatment) = rules.classify(&relative) {
            selected.push(SelectedFile {
                source: entry.path().to_path_buf(),
                relative,
                treatment,
            });
        }
    }

    Ok(selected)
}

/// Content of a selected file after substitution, with tokens replaced
pub fn render_selected(file: &SelectedFile, tokens: &BTreeMap<String, String>) -> Result<(Vec<u8>, usize)> {
    let content = fs::read(&file.source).map_err(|e| Error::copy_io(&file.source, e))?;

    Ok(match file.treatment {
        Treatment::Raw => (content, 0),
        Treatment::Substitute => match String::from_utf8(content) {
            Ok(text) => {
                let (out, replaced) = substitute_tokens(&text, tokens);
                (out.into_bytes(), replaced)
            }
            Err(e) => {
                debug!("{} is not UTF-8 text, copying unfiltered", file.relative);
                (e.into_bytes(), 0)
            }
        },
    })
}

/// Copy one selected file into `dest_root`, returning tokens replaced
pub fn copy_selected(
    file: &SelectedFile,
    dest_root: &Path,
    tokens: &BTreeMap<String, String>,
    policy: &PermissionPolicy,
) -> Result<usize> {
    let (bytes, replaced) = render_selected(file, tokens)?;

    let mode = policy.mode_for(&file.relative, file.treatment);
    let dest = dest_root.join(&file.relative);
    write_atomic(&dest, &bytes, mode).map_err(|e| Error::copy_io(&dest, e))?;

    Ok(replaced)
}

/// Copy `src_root` to `dest_root`, substituting tokens per `rules`
pub fn copy_filtered_tree(
    src_root: &Path,
    dest_root: &Path,
    tokens: &BTreeMap<String, String>,
    rules: &FilterRules,
    policy: &PermissionPolicy,
) -> Result<CopyReport> {
    let mut report = CopyReport::default();

    for file in select_files(src_root, rules)? {
        report.tokens_replaced += copy_selected(&file, dest_root, tokens, policy)?;
        match file.treatment {
            Treatment::Substitute => report.filtered += 1,
            Treatment::Raw => report.raw += 1,
        }
        report.files.push(file.relative);
    }

    info!(
        "Copied {} -> {} ({} filtered, {} raw, {} tokens)",
        src_root.display(),
        dest_root.display(),
        report.filtered,
        report.raw,
        report.tokens_replaced
    );
    Ok(report)
}

/// Write `bytes` to `dest` via a sibling temp file and rename
pub(crate) fn write_atomic(dest: &Path, bytes: &[u8], mode: u32) -> std::io::Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().set_permissions(fs::Permissions::from_mode(mode))?;
    temp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// `/`-separated relative path of `path` under `root`
pub(crate) fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tokens(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_substitute_known_tokens() {
        let (out, n) = substitute_tokens(
            "dir=${installDir} jar=${archiveJarName}",
            &tokens(&[("installDir", "/opt/app"), ("archiveJarName", "app.jar")]),
        );
        assert_eq!(out, "dir=/opt/app jar=app.jar");
        assert_eq!(n, 2);
    }

    #[test]
    fn test_unknown_and_unterminated_tokens_left_verbatim() {
        let t = tokens(&[("a", "1")]);
        assert_eq!(substitute_tokens("${missing} ${a}", &t), ("${missing} 1".to_string(), 1));
        assert_eq!(substitute_tokens("tail ${a", &t), ("tail ${a".to_string(), 0));
        assert_eq!(substitute_tokens("$${a}", &t), ("$1".to_string(), 1));
        assert_eq!(substitute_tokens("${x${a}}", &t), ("${x1}".to_string(), 1));
    }

    #[test]
    fn test_substituted_value_is_not_rescanned() {
        let t = tokens(&[("a", "${b}"), ("b", "no")]);
        assert_eq!(substitute_tokens("${a}", &t), ("${b}".to_string(), 1));
    }

    #[test]
    fn test_copy_filtered_tree_substitutes_install_dir() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("cfg")).unwrap();
        fs::write(src.path().join("cfg/app.yml"), "home: ${installDir}\n").unwrap();

        let report = copy_filtered_tree(
            src.path(),
            dest.path(),
            &tokens(&[("installDir", "/opt/app")]),
            &FilterRules::distribution::<&str>(&[]).unwrap(),
            &PermissionPolicy::default(),
        )
        .unwrap();

        let out = fs::read_to_string(dest.path().join("cfg/app.yml")).unwrap();
        assert_eq!(out, "home: /opt/app\n");
        assert_eq!(report.filtered, 1);
        assert_eq!(report.tokens_replaced, 1);
        assert_eq!(mode_of(&dest.path().join("cfg/app.yml")), 0o644);
    }

    #[test]
    fn test_sensitive_file_copied_raw_with_owner_only_mode() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("cfg")).unwrap();
        let keystore = b"\x00\x01${installDir}\xfe".to_vec();
        fs::write(src.path().join("cfg/secret.ks"), &keystore).unwrap();
        fs::write(src.path().join("cfg/app.yml"), "x").unwrap();

        let report = copy_filtered_tree(
            src.path(),
            dest.path(),
            &tokens(&[("installDir", "/opt/app")]),
            &FilterRules::sensitive().unwrap(),
            &PermissionPolicy::default(),
        )
        .unwrap();

        let copied = dest.path().join("cfg/secret.ks");
        assert_eq!(fs::read(&copied).unwrap(), keystore);
        assert_eq!(mode_of(&copied), 0o600);
        assert_eq!(report.raw, 1);
        assert_eq!(report.filtered, 0);
        assert!(!dest.path().join("cfg/app.yml").exists());
    }

    #[test]
    fn test_distribution_rules_skip_binary_and_key_material() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("cfg")).unwrap();
        fs::create_dir_all(src.path().join("web")).unwrap();
        fs::write(src.path().join("cfg/secret.ks"), "${installDir}").unwrap();
        fs::write(src.path().join("web/logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
        fs::write(src.path().join("README"), "${installDir}").unwrap();

        let report = copy_filtered_tree(
            src.path(),
            dest.path(),
            &tokens(&[("installDir", "/opt/app")]),
            &FilterRules::distribution::<&str>(&[]).unwrap(),
            &PermissionPolicy::default(),
        )
        .unwrap();

        assert_eq!(report.files, vec!["README".to_string()]);
        assert!(!dest.path().join("cfg/secret.ks").exists());
        assert!(!dest.path().join("web/logo.png").exists());
    }

    #[test]
    fn test_scripts_become_executable() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("bin")).unwrap();
        fs::write(src.path().join("bin/q2"), "#!/bin/sh\ncd ${installDir}\n").unwrap();

        copy_filtered_tree(
            src.path(),
            dest.path(),
            &tokens(&[("installDir", "/opt/app")]),
            &FilterRules::all(),
            &PermissionPolicy::default(),
        )
        .unwrap();

        let script = dest.path().join("bin/q2");
        assert_eq!(fs::read_to_string(&script).unwrap(), "#!/bin/sh\ncd /opt/app\n");
        assert_eq!(mode_of(&script), 0o754);
    }

    #[test]
    fn test_non_utf8_file_copied_unfiltered() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let blob = vec![0xff, b'$', b'{', b'a', b'}', 0xfe];
        fs::write(src.path().join("blob.bin"), &blob).unwrap();

        let report = copy_filtered_tree(
            src.path(),
            dest.path(),
            &tokens(&[("a", "1")]),
            &FilterRules::all(),
            &PermissionPolicy::default(),
        )
        .unwrap();

        assert_eq!(fs::read(dest.path().join("blob.bin")).unwrap(), blob);
        assert_eq!(report.tokens_replaced, 0);
    }

    #[test]
    fn test_missing_source_tree_copies_nothing() {
        let dest = TempDir::new().unwrap();
        let report = copy_filtered_tree(
            &dest.path().join("absent"),
            dest.path(),
            &BTreeMap::new(),
            &FilterRules::all(),
            &PermissionPolicy::default(),
        )
        .unwrap();
        assert_eq!(report, CopyReport::default());
    }

    #[test]
    fn test_unwritable_destination_is_copy_error() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), "a").unwrap();
        // A regular file where the destination directory should be.
        let blocked = dest.path().join("blocked");
        fs::write(&blocked, "").unwrap();

        let err = copy_filtered_tree(
            src.path(),
            &blocked,
            &BTreeMap::new(),
            &FilterRules::all(),
            &PermissionPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CopyIo { .. }));
    }

    #[test]
    fn test_selection_is_sorted() {
        let src = TempDir::new().unwrap();
        for name in ["c.txt", "a.txt", "b/z.txt", "b/a.txt"] {
            let path = src.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        let selected = select_files(src.path(), &FilterRules::all()).unwrap();
        let names: Vec<_> = selected.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b/a.txt", "b/z.txt", "c.txt"]);
    }
}
