// tests/assembly.rs

//! End-to-end assembly runs against fixture projects.

mod common;

use common::{zip_entry, zip_names, Fixture};
use distkit::archive::expand;
use distkit::assembly::{Manifest, MANIFEST_PATH};
use distkit::{Assembler, Error, Overrides, RunStage, SourceSpec, TargetKind};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

fn mode_of(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

#[test]
fn test_combined_merges_services_and_strips_signatures() {
    let fx = Fixture::new();
    let report = Assembler::new(fx.application()).run(TargetKind::Combined).unwrap();

    assert_eq!(report.output, fx.path("build/libs/myapp-1.0-all.jar"));
    assert_eq!(report.stage, RunStage::Done);

    let names = zip_names(&report.output);
    assert_eq!(names[0], MANIFEST_PATH);
    assert!(!names.contains(&"META-INF/DEP.SF".to_string()));
    assert!(names.contains(&"org/dep/Dep.class".to_string()));
    assert!(names.contains(&"revision.properties".to_string()));
    assert_eq!(
        zip_entry(&report.output, "META-INF/services/com.acme.Spi"),
        b"com.acme.ImplA\ncom.acme.ImplB\n"
    );

    assert_eq!(report.stripped_signatures.len(), 1);
    assert_eq!(report.stripped_signatures[0].path, "META-INF/DEP.SF");
    assert_eq!(report.write.signatures_stripped, 1);

    let manifest = Manifest::parse(&String::from_utf8(zip_entry(&report.output, MANIFEST_PATH)).unwrap());
    assert_eq!(manifest.get("Implementation-Title"), Some("myapp"));
    assert_eq!(manifest.get("Main-Class"), Some("org.jpos.q2.Q2"));
    assert_eq!(manifest.get("Class-Path"), None);
}

#[test]
fn test_combined_archive_round_trips_service_table() {
    let fx = Fixture::new();
    let assembler = Assembler::new(fx.application());
    let report = assembler.run(TargetKind::Combined).unwrap();

    let from_inputs = assembler.merged_services().unwrap();
    let from_output = distkit::merge(expand(&[SourceSpec::dependency(&report.output)])).unwrap();

    assert_eq!(from_output.table, from_inputs.table);
    assert!(from_output.stripped_signatures.is_empty());
}

#[test]
fn test_combined_archive_is_byte_identical_across_runs() {
    let fx = Fixture::new();
    let assembler = Assembler::new(fx.application());

    let first = assembler.run(TargetKind::Combined).unwrap();
    let bytes = fs::read(&first.output).unwrap();
    let second = assembler.run(TargetKind::Combined).unwrap();

    assert_eq!(fs::read(&second.output).unwrap(), bytes);
    assert_eq!(first.write.sha256, second.write.sha256);
}

#[test]
fn test_install_substitutes_tokens_and_protects_key_material() {
    let fx = Fixture::new();
    let install_dir = fx.path("opt/app");
    let overrides: Overrides = [("installDir".to_string(), install_dir.display().to_string())]
        .into_iter()
        .collect();

    let report = Assembler::new(fx.application())
        .with_overrides(overrides)
        .run(TargetKind::Install)
        .unwrap();
    assert_eq!(report.output, install_dir);

    assert_eq!(
        fs::read_to_string(install_dir.join("cfg/app.yml")).unwrap(),
        format!("home: {}\n", install_dir.display())
    );
    assert_eq!(
        fs::read(install_dir.join("cfg/secret.ks")).unwrap(),
        b"\x00\x01${installDir}\xff"
    );
    assert_eq!(mode_of(&install_dir.join("cfg/secret.ks")), 0o600);
    assert_eq!(
        fs::read_to_string(install_dir.join("bin/q2")).unwrap(),
        "#!/bin/sh\nexec java -jar myapp-1.0.jar\n"
    );
    assert_eq!(mode_of(&install_dir.join("bin/q2")), 0o754);
    assert!(!install_dir.join("web/logo.png").exists());
    assert!(install_dir.join("lib/dep.jar").exists());

    let manifest = Manifest::parse(
        &String::from_utf8(zip_entry(&install_dir.join("myapp-1.0.jar"), MANIFEST_PATH)).unwrap(),
    );
    assert_eq!(manifest.get("Class-Path"), Some("lib/dep.jar"));
}

#[test]
fn test_install_copies_authorized_keys_raw() {
    let fx = Fixture::new();
    let project = fx.application();
    fx.write("src/dist/cfg/authorized_keys", "ssh-ed25519 AAAA ${installDir}\n");

    let report = Assembler::new(project).run(TargetKind::Install).unwrap();
    let keys = report.output.join("cfg/authorized_keys");
    assert_eq!(fs::read_to_string(&keys).unwrap(), "ssh-ed25519 AAAA ${installDir}\n");
    assert_eq!(mode_of(&keys), 0o600);
}

#[test]
fn test_extra_excludes_apply_to_every_zip_target() {
    let fx = Fixture::new();
    let project = fx.application();
    fx.write("src/dist/bin/debug.sh", "#!/bin/sh\n");
    let assembler = Assembler::new(project).with_extra_excludes(vec!["bin/debug.sh".to_string()]);

    let zip = zip_names(&assembler.run(TargetKind::Zip).unwrap().output);
    let zip_nc = zip_names(&assembler.run(TargetKind::ZipNc).unwrap().output);
    assert!(zip.contains(&"myapp-1.0/bin/q2".to_string()));
    assert!(!zip.contains(&"myapp-1.0/bin/debug.sh".to_string()));
    assert!(zip_nc.contains(&"bin/q2".to_string()));
    assert!(!zip_nc.contains(&"bin/debug.sh".to_string()));
}

#[test]
fn test_target_properties_rename_main_jar() {
    let fx = Fixture::new();
    let project = fx.application();
    fx.write("prod.properties", "# production\njarname=gateway.jar\n");

    let report = Assembler::new(project).with_profile("prod").run(TargetKind::Install).unwrap();
    assert_eq!(report.config.archive_jar_name, "gateway.jar");
    assert_eq!(report.config.target, "prod");
    assert!(report.output.join("gateway.jar").exists());
    assert_eq!(
        fs::read_to_string(report.output.join("bin/q2")).unwrap(),
        "#!/bin/sh\nexec java -jar gateway.jar\n"
    );
}

#[test]
fn test_dist_tarball_is_prefixed() {
    let fx = Fixture::new();
    let report = Assembler::new(fx.application()).with_mtime(0).run(TargetKind::Dist).unwrap();
    assert_eq!(report.output, fx.path("build/distributions/myapp-1.0.tar.gz"));

    let names: Vec<String> = expand(&[SourceSpec::dependency(&report.output)])
        .map(|e| e.unwrap().path)
        .collect();
    for expected in [
        "myapp-1.0/bin/q2",
        "myapp-1.0/cfg/app.yml",
        "myapp-1.0/cfg/secret.ks",
        "myapp-1.0/lib/dep.jar",
        "myapp-1.0/myapp-1.0.jar",
    ] {
        assert!(names.contains(&expected.to_string()), "missing {expected}");
    }
    assert!(report.write.sha256.is_some());
}

#[test]
fn test_zip_without_config_ships_only_bin() {
    let fx = Fixture::new();
    let report = Assembler::new(fx.application()).run(TargetKind::ZipNc).unwrap();
    assert_eq!(report.output, fx.path("build/distributions/myapp-1.0-nc.zip"));

    let names = zip_names(&report.output);
    assert!(names.contains(&"bin/q2".to_string()));
    assert!(names.contains(&"lib/dep.jar".to_string()));
    assert!(!names.iter().any(|n| n.starts_with("cfg/")));
}

#[test]
fn test_corrupt_dependency_fails_without_output() {
    let fx = Fixture::new();
    fx.write("build/classes/App.class", "app");
    fx.write("libs/broken.jar", "definitely not a zip");
    let assembler = Assembler::new(fx.project(&["libs/broken.jar"]));

    let err = assembler.run(TargetKind::Combined).unwrap_err();
    match &err {
        Error::Stage { stage, target, .. } => {
            assert_eq!(*stage, "merge-services");
            assert_eq!(target, "combined");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("broken.jar"));
    assert!(!fx.path("build/libs/myapp-1.0-all.jar").exists());
}

#[test]
fn test_skip_corrupt_dependency() {
    let fx = Fixture::new();
    fx.write("build/classes/App.class", "app");
    let broken = fx.write("libs/broken.jar", "definitely not a zip");

    let report = Assembler::new(fx.project(&["libs/broken.jar"]))
        .with_corrupt_policy(distkit::CorruptArchivePolicy::SkipAndWarn)
        .run(TargetKind::Combined)
        .unwrap();
    assert_eq!(report.write.skipped_sources, vec![broken]);
    assert!(zip_names(&report.output).contains(&"App.class".to_string()));
}
