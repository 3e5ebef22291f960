// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use distkit::Project;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

/// A throwaway project directory.
///
/// Keep the fixture alive for the duration of the test; dropping it removes
/// the directory.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Write a zip-format archive with the given entries
    pub fn jar(&self, rel: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    /// Write `distkit.toml` listing `dependencies` and load it
    pub fn project(&self, dependencies: &[&str]) -> Project {
        let deps = dependencies
            .iter()
            .map(|d| format!("\"{}\"", d))
            .collect::<Vec<_>>()
            .join(", ");
        let descriptor = format!(
            r#"[project]
name = "myapp"
version = "1.0"

[paths]
dependencies = [{deps}]

[metadata.revision]
branch = "main"
revision = "abc1234"

[metadata.buildinfo]
buildTimestamp = "2024-01-01T00:00:00Z"
"#
        );
        let path = self.write("distkit.toml", descriptor);
        Project::load(&path).unwrap()
    }

    /// Typical application layout: classes with a service registration, a
    /// distribution template and one signed dependency
    pub fn application(&self) -> Project {
        self.write("build/classes/com/acme/App.class", b"\xca\xfe\xba\xbe");
        self.write("build/classes/META-INF/services/com.acme.Spi", "com.acme.ImplA\n");

        self.write("src/dist/bin/q2", "#!/bin/sh\nexec java -jar ${archiveJarName}\n");
        self.write("src/dist/cfg/app.yml", "home: ${installDir}\n");
        self.write("src/dist/cfg/secret.ks", b"\x00\x01${installDir}\xff");
        self.write("src/dist/web/logo.png", b"\x89PNG");

        self.jar(
            "libs/dep.jar",
            &[
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n\r\n"),
                ("META-INF/DEP.SF", b"Signature-Version: 1.0\n"),
                ("META-INF/services/com.acme.Spi", b"com.acme.ImplA\ncom.acme.ImplB\n"),
                ("org/dep/Dep.class", b"\xca\xfe\xba\xbe"),
            ],
        );
        self.project(&["libs/dep.jar"])
    }
}

/// Entry names of a zip-format archive, in archive order
pub fn zip_names(path: &Path) -> Vec<String> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Content of one entry of a zip-format archive
pub fn zip_entry(path: &Path, name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut out = Vec::new();
    archive.by_name(name).unwrap().read_to_end(&mut out).unwrap();
    out
}
