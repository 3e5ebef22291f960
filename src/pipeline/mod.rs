// src/pipeline/mod.rs
//! Assembly runs
//!
//! An [`Assembler`] drives one target through resolve → expand → merge →
//! write. Each run owns a staging directory inside the build dir for its
//! primary jar, generated resources and merged service files; the staging
//! directory is removed when the run ends, successful or not. Targets only
//! share read access to project inputs, so several can run in parallel.

mod stage;

pub use stage::{RunStage, TargetKind};

use crate::archive::{ArchiveExpander, CorruptArchivePolicy, EntrySource, SourceSpec};
use crate::assembly::{
    write_primary_jar, ArchiveWriter, AssemblyPlan, DistributionInputs, DuplicatePolicy, Manifest,
    WriteReport,
};
use crate::config::{ConfigurationMap, Overrides, DEFAULT_TARGET};
use crate::error::{Error, Result};
use crate::project::Project;
use crate::services::{self, MergeOutcome, StrippedSignature};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Outcome of one successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: TargetKind,
    pub output: PathBuf,
    pub config: ConfigurationMap,
    pub write: WriteReport,
    /// Number of merged service registration files (combined only)
    pub services: usize,
    pub stripped_signatures: Vec<StrippedSignature>,
    pub stage: RunStage,
}

/// Runs assembly targets for one project
#[derive(Debug, Clone)]
pub struct Assembler {
    project: Project,
    profile: String,
    overrides: Overrides,
    corrupt: CorruptArchivePolicy,
    duplicates: DuplicatePolicy,
    extra_excludes: Vec<String>,
    mtime: Option<u64>,
}

impl Assembler {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            profile: DEFAULT_TARGET.to_string(),
            overrides: Overrides::new(),
            corrupt: CorruptArchivePolicy::default(),
            duplicates: DuplicatePolicy::default(),
            extra_excludes: Vec::new(),
            mtime: None,
        }
    }

    /// Target profile whose `<profile>.properties` is loaded
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_corrupt_policy(mut self, policy: CorruptArchivePolicy) -> Self {
        self.corrupt = policy;
        self
    }

    pub fn with_duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    /// Extra exclude globs applied to the templated copy
    pub fn with_extra_excludes(mut self, excludes: Vec<String>) -> Self {
        self.extra_excludes = excludes;
        self
    }

    /// Fixed tar timestamp instead of `SOURCE_DATE_EPOCH`
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Resolve the configuration for the selected profile
    pub fn resolve(&self) -> Result<ConfigurationMap> {
        self.project
            .resolver()
            .resolve(&self.project.identity, &self.profile, Some(&self.overrides))
    }

    /// Merge service registrations across primary output and dependencies
    pub fn merged_services(&self) -> Result<MergeOutcome> {
        let sources = self.all_sources(self.project.primary_sources());
        services::merge(ArchiveExpander::new(self.corrupt).expand(&sources))
    }

    /// Where a target's output lands
    pub fn output_path(&self, kind: TargetKind, config: &ConfigurationMap) -> PathBuf {
        let identity = &self.project.identity;
        let base = format!("{}-{}", identity.archives_name, identity.version);
        match kind {
            TargetKind::Install => config.install_dir_path(&self.project.root),
            TargetKind::Dist => self.project.distributions_dir().join(format!("{}.tar.gz", base)),
            TargetKind::Zip => self.project.distributions_dir().join(format!("{}.zip", base)),
            TargetKind::DistNc => self.project.distributions_dir().join(format!("{}-nc.tar.gz", base)),
            TargetKind::ZipNc => self.project.distributions_dir().join(format!("{}-nc.zip", base)),
            TargetKind::Combined => self.project.libs_dir().join(combined_name(&config.archive_jar_name)),
        }
    }

    /// Run one target to completion
    pub fn run(&self, kind: TargetKind) -> Result<RunReport> {
        info!("Assembling {} (profile '{}')", kind, self.profile);
        let mut run = Run::new(kind);

        let config = run.enter(RunStage::ConfigResolved, || self.resolve())?;
        let staged = run.enter(RunStage::SourcesExpanded, || self.stage_sources(kind, &config))?;
        let merged = run.enter(RunStage::ServicesMerged, || self.merge_services(kind, &staged))?;
        let output = self.output_path(kind, &config);
        let write = run.enter(RunStage::Written, || self.write(kind, &config, &staged, &output))?;
        run.enter(RunStage::Done, || Ok(()))?;

        // Staging is only removed once the output is in place
        drop(staged);

        let (services, stripped_signatures) = match merged {
            Some(outcome) => (outcome.table.len(), outcome.stripped_signatures),
            None => (0, Vec::new()),
        };
        info!("{}: wrote {}", kind, output.display());
        Ok(RunReport {
            target: kind,
            output,
            config,
            write,
            services,
            stripped_signatures,
            stage: run.stage,
        })
    }

    /// Run several targets in parallel, one result per target in input order
    pub fn run_all(&self, kinds: &[TargetKind]) -> Vec<Result<RunReport>> {
        kinds.par_iter().map(|kind| self.run(*kind)).collect()
    }

    /// Generate metadata resources and, for distribution targets, pack the
    /// primary jar
    fn stage_sources(&self, kind: TargetKind, config: &ConfigurationMap) -> Result<Staged> {
        let build_dir = &self.project.build_dir;
        fs::create_dir_all(build_dir).map_err(|e| Error::write_io(build_dir, e))?;
        let dir = tempfile::Builder::new()
            .prefix(".distkit-run-")
            .tempdir_in(build_dir)
            .map_err(|e| Error::write_io(build_dir, e))?;

        let mut primary = self.project.primary_sources();
        for spec in &primary {
            EntrySource::detect(&spec.path)?;
        }

        let generated = dir.path().join("generated");
        if !self.project.metadata.write(&config.flags, &generated)?.is_empty() {
            primary.push(SourceSpec::primary(&generated));
        }

        let main_jar = if kind == TargetKind::Combined {
            None
        } else {
            let manifest = self.manifest().with_class_path(&self.project.dependencies);
            let jar = dir.path().join(&config.archive_jar_name);
            write_primary_jar(&primary, manifest, &jar)?;
            Some(jar)
        };

        Ok(Staged { dir, primary, main_jar })
    }

    fn merge_services(&self, kind: TargetKind, staged: &Staged) -> Result<Option<MergeOutcome>> {
        if kind != TargetKind::Combined {
            debug!("{}: no service merge needed", kind);
            return Ok(None);
        }
        let sources = self.all_sources(staged.primary.clone());
        let outcome = services::merge(ArchiveExpander::new(self.corrupt).expand(&sources))?;
        outcome.table.materialize(&staged.services_dir())?;
        Ok(Some(outcome))
    }

    fn write(
        &self,
        kind: TargetKind,
        config: &ConfigurationMap,
        staged: &Staged,
        output: &Path,
    ) -> Result<WriteReport> {
        let identity = &self.project.identity;
        let plan = match (kind, &staged.main_jar) {
            (TargetKind::Combined, _) | (_, None) => AssemblyPlan::combined(
                staged.primary.clone(),
                self.project.dependency_sources(),
                staged.services_dir(),
                self.manifest(),
            ),
            (_, Some(main_jar)) => {
                let inputs = DistributionInputs {
                    dist_dir: config.dist_dir_path(&self.project.root),
                    main_jar: main_jar.clone(),
                    dependencies: self.project.dependencies.clone(),
                    webapps: self.project.webapps()?,
                    extra_excludes: self.extra_excludes.clone(),
                };
                let plan = if kind.includes_config() {
                    AssemblyPlan::distribution(&inputs)?
                } else {
                    AssemblyPlan::distribution_no_config(&inputs)?
                };
                match kind {
                    TargetKind::Dist | TargetKind::Zip => {
                        plan.with_prefix(format!("{}-{}", identity.name, identity.version))
                    }
                    _ => plan,
                }
            }
        };
        let plan = plan.with_duplicates(self.duplicates);

        let mut writer = ArchiveWriter::new(config.tokens()).with_corrupt_policy(self.corrupt);
        if let Some(mtime) = self.mtime {
            writer = writer.with_mtime(mtime);
        }
        writer.write(&plan, kind.output_kind(), output)
    }

    fn manifest(&self) -> Manifest {
        let identity = &self.project.identity;
        Manifest::for_application(&identity.name, &identity.version, &self.project.main_class)
    }

    fn all_sources(&self, mut primary: Vec<SourceSpec>) -> Vec<SourceSpec> {
        primary.extend(self.project.dependency_sources());
        primary
    }
}

/// Combined archive name: `-all` before the `.jar` extension
fn combined_name(jar_name: &str) -> String {
    match jar_name.strip_suffix(".jar") {
        Some(stem) => format!("{}-all.jar", stem),
        None => format!("{}-all.jar", jar_name),
    }
}

/// Per-run scratch state
struct Staged {
    dir: TempDir,
    primary: Vec<SourceSpec>,
    main_jar: Option<PathBuf>,
}

impl Staged {
    fn services_dir(&self) -> PathBuf {
        self.dir.path().join("services")
    }
}

/// Stage tracker for one run
struct Run {
    kind: TargetKind,
    stage: RunStage,
}

impl Run {
    fn new(kind: TargetKind) -> Self {
        Self {
            kind,
            stage: RunStage::Idle,
        }
    }

    /// Move to `to`, tagging any error from `step` with that stage
    fn enter<T>(&mut self, to: RunStage, step: impl FnOnce() -> Result<T>) -> Result<T> {
        debug_assert_eq!(self.stage.next(), Some(to));
        let value = step().map_err(|e| e.in_stage(to.as_str(), self.kind.name()))?;
        debug!("{}: {} -> {}", self.kind, self.stage, to);
        self.stage = to;
        Ok(value)
    }
}
