// src/assembly/plan.rs

//! Assembly plans
//!
//! A plan is the ordered list of segments that make up one output. Each
//! segment names where its files come from, where they land and how they are
//! filtered. The writer executes segments in order.

use super::manifest::{Manifest, LIB_DIR};
use crate::archive::SourceSpec;
use crate::error::Result;
use crate::filter::{FilterRules, PermissionPolicy, DEFAULT_MODE};
use std::path::PathBuf;

/// Destination subtree for web archives
pub const WEBAPPS_DIR: &str = "webapps";

/// Destination subtree for scripts
pub const BIN_DIR: &str = "bin";

/// What happens when two segments claim the same destination path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Fail the write with [`crate::Error::DuplicateEntry`]
    #[default]
    Fail,
    /// The later segment overwrites the earlier one
    LastWins,
}

/// Where a segment's files come from
#[derive(Debug, Clone)]
pub enum SegmentSource {
    /// Token-filtered copy of a directory tree
    FilteredTree {
        root: PathBuf,
        rules: FilterRules,
        permissions: PermissionPolicy,
    },
    /// Individual files, flattened to their file names
    Files { files: Vec<PathBuf>, mode: u32 },
    /// Directories and archives expanded entry by entry
    Expanded { sources: Vec<SourceSpec> },
    /// A staging directory whose files replace same-path entries from
    /// expanded segments (merged service registrations)
    Staged { root: PathBuf },
}

/// One step of a plan
#[derive(Debug, Clone)]
pub struct PlanSegment {
    /// Name used in logs and duplicate diagnostics
    pub name: String,
    pub source: SegmentSource,
    /// Destination subtree, empty for the output root
    pub into: String,
}

impl PlanSegment {
    pub fn new(name: impl Into<String>, source: SegmentSource) -> Self {
        Self {
            name: name.into(),
            source,
            into: String::new(),
        }
    }

    pub fn into_dir(mut self, dir: impl Into<String>) -> Self {
        self.into = dir.into();
        self
    }

    /// Destination path for a relative path inside this segment
    pub fn destination(&self, relative: &str) -> String {
        if self.into.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.into.trim_end_matches('/'), relative)
        }
    }
}

/// Ordered segments plus output-level settings
#[derive(Debug, Clone, Default)]
pub struct AssemblyPlan {
    pub segments: Vec<PlanSegment>,
    pub duplicates: DuplicatePolicy,
    /// Directory every entry is placed under (e.g. `myapp-1.0`), empty for none
    pub prefix: String,
    /// Manifest stamped into single-archive outputs
    pub manifest: Option<Manifest>,
}

/// Inputs shared by the distribution plans
#[derive(Debug, Clone)]
pub struct DistributionInputs {
    /// Distribution template directory (`distDir`)
    pub dist_dir: PathBuf,
    /// Primary application jar
    pub main_jar: PathBuf,
    /// Dependency jars in classpath order
    pub dependencies: Vec<PathBuf>,
    /// Web archives
    pub webapps: Vec<PathBuf>,
    /// Per-target extra excludes for the templated copy
    pub extra_excludes: Vec<String>,
}

impl AssemblyPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: PlanSegment) -> &mut Self {
        self.segments.push(segment);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Full distribution: templated config, key material, jars and web apps
    pub fn distribution(inputs: &DistributionInputs) -> Result<Self> {
        let mut plan = Self::new();
        plan.push(PlanSegment::new(
            "dist-filtered",
            SegmentSource::FilteredTree {
                root: inputs.dist_dir.clone(),
                rules: FilterRules::distribution(&inputs.extra_excludes)?,
                permissions: PermissionPolicy::default(),
            },
        ));

        let mut raw_rules = FilterRules::sensitive()?;
        raw_rules.extra_excludes.extend(&inputs.extra_excludes)?;
        plan.push(PlanSegment::new(
            "dist-raw",
            SegmentSource::FilteredTree {
                root: inputs.dist_dir.clone(),
                rules: raw_rules,
                permissions: PermissionPolicy::default(),
            },
        ));

        plan.push_binaries(inputs);
        Ok(plan)
    }

    /// Distribution without configuration: only `bin/` is templated
    pub fn distribution_no_config(inputs: &DistributionInputs) -> Result<Self> {
        let mut rules = FilterRules::all().with_extra_base(BIN_DIR);
        rules.extra_excludes.extend(&inputs.extra_excludes)?;

        let mut plan = Self::new();
        plan.push(
            PlanSegment::new(
                "bin-filtered",
                SegmentSource::FilteredTree {
                    root: inputs.dist_dir.join(BIN_DIR),
                    rules,
                    permissions: PermissionPolicy::scripts_only(),
                },
            )
            .into_dir(BIN_DIR),
        );

        plan.push_binaries(inputs);
        Ok(plan)
    }

    /// Combined single archive: primary output, dependencies, merged services
    pub fn combined(
        primary: Vec<SourceSpec>,
        dependencies: Vec<SourceSpec>,
        merged_services: PathBuf,
        manifest: Manifest,
    ) -> Self {
        let mut plan = Self::new().with_manifest(manifest);
        plan.push(PlanSegment::new(
            "primary",
            SegmentSource::Expanded { sources: primary },
        ));
        plan.push(PlanSegment::new(
            "dependencies",
            SegmentSource::Expanded {
                sources: dependencies,
            },
        ));
        plan.push(PlanSegment::new(
            "merged-services",
            SegmentSource::Staged {
                root: merged_services,
            },
        ));
        plan
    }

    /// Primary jar: compiled output stamped with a manifest
    pub fn primary_jar(primary: Vec<SourceSpec>, manifest: Manifest) -> Self {
        let mut plan = Self::new().with_manifest(manifest);
        plan.push(PlanSegment::new(
            "primary",
            SegmentSource::Expanded { sources: primary },
        ));
        plan
    }

    fn push_binaries(&mut self, inputs: &DistributionInputs) {
        self.push(PlanSegment::new(
            "main-jar",
            SegmentSource::Files {
                files: vec![inputs.main_jar.clone()],
                mode: DEFAULT_MODE,
            },
        ));
        self.push(
            PlanSegment::new(
                "dep-jars",
                SegmentSource::Files {
                    files: inputs.dependencies.clone(),
                    mode: DEFAULT_MODE,
                },
            )
            .into_dir(LIB_DIR),
        );
        self.push(
            PlanSegment::new(
                "webapps",
                SegmentSource::Files {
                    files: inputs.webapps.clone(),
                    mode: DEFAULT_MODE,
                },
            )
            .into_dir(WEBAPPS_DIR),
        );
    }
}
