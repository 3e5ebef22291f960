// src/commands.rs
//! Command handlers for the distkit CLI

use anyhow::{Context, Result};
use distkit::{
    Assembler, CorruptArchivePolicy, DuplicatePolicy, Overrides, Project, RunReport, TargetKind,
};
use std::path::Path;
use tracing::{info, warn};

/// Options shared by every command
pub struct RunOptions<'a> {
    pub project: &'a Path,
    pub profile: &'a str,
    pub defines: &'a [(String, String)],
    pub excludes: &'a [String],
    pub skip_corrupt: bool,
    pub allow_overwrite: bool,
}

/// Load the project and build an assembler from CLI options
pub fn assembler(options: &RunOptions<'_>) -> Result<Assembler> {
    let project = Project::load(options.project)
        .with_context(|| format!("Failed to load project {}", options.project.display()))?;
    let overrides: Overrides = options.defines.iter().cloned().collect();

    let corrupt = if options.skip_corrupt {
        CorruptArchivePolicy::SkipAndWarn
    } else {
        CorruptArchivePolicy::Abort
    };
    let duplicates = if options.allow_overwrite {
        DuplicatePolicy::LastWins
    } else {
        DuplicatePolicy::Fail
    };

    Ok(Assembler::new(project)
        .with_profile(options.profile)
        .with_overrides(overrides)
        .with_extra_excludes(options.excludes.to_vec())
        .with_corrupt_policy(corrupt)
        .with_duplicates(duplicates))
}

/// Run a single target
pub fn cmd_target(assembler: &Assembler, kind: TargetKind) -> Result<()> {
    let report = assembler.run(kind)?;
    print_report(&report);
    Ok(())
}

/// Run every target in parallel, failing if any target failed
pub fn cmd_all(assembler: &Assembler) -> Result<()> {
    let mut failed = 0;
    for (kind, result) in TargetKind::ALL.iter().zip(assembler.run_all(&TargetKind::ALL)) {
        match result {
            Ok(report) => print_report(&report),
            Err(e) => {
                eprintln!("{}: {}", kind, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} targets failed", failed, TargetKind::ALL.len());
    }
    Ok(())
}

/// Print the resolved settings
pub fn cmd_config(assembler: &Assembler) -> Result<()> {
    let config = assembler.resolve()?;
    info!("Resolved profile '{}'", config.target);
    for (key, value) in config.summary() {
        println!("{}={}", key, value);
    }
    Ok(())
}

/// Print merged service registrations
pub fn cmd_services(assembler: &Assembler) -> Result<()> {
    let outcome = assembler.merged_services()?;
    for (path, providers) in outcome.table.iter() {
        println!("{}", path);
        for provider in providers.iter() {
            println!("  {}", provider);
        }
    }
    for signature in &outcome.stripped_signatures {
        warn!(
            "{} in {} would be dropped from a combined archive",
            signature.path,
            signature.origin.display()
        );
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("{}: {}", report.target, report.output.display());
    println!("  entries: {}", report.write.entries);
    if report.write.tokens_replaced > 0 {
        println!("  tokens replaced: {}", report.write.tokens_replaced);
    }
    if report.services > 0 {
        println!("  merged service files: {}", report.services);
    }
    if report.write.signatures_stripped > 0 {
        println!("  signatures stripped: {}", report.write.signatures_stripped);
    }
    if report.write.duplicates_skipped > 0 {
        println!("  duplicates skipped: {}", report.write.duplicates_skipped);
    }
    for skipped in &report.write.skipped_sources {
        println!("  skipped corrupt source: {}", skipped.display());
    }
    if let Some(sha256) = &report.write.sha256 {
        println!("  sha256: {}", sha256);
    }
}
