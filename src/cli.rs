// src/cli.rs
//! CLI definitions for distkit
//!
//! Each assembly target is a subcommand. Global options select the project
//! descriptor, the target profile and per-run overrides.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "distkit")]
#[command(version)]
#[command(about = "Assembles application distributions and combined archives", long_about = None)]
pub struct Cli {
    /// Project descriptor
    #[arg(short, long, global = true, default_value = "distkit.toml")]
    pub project: PathBuf,

    /// Target profile; loads `<profile>.properties` from the project root
    #[arg(short, long, global = true, default_value = "devel")]
    pub target: String,

    /// Override a configuration key (repeatable)
    #[arg(short = 'D', long = "define", global = true, value_name = "KEY=VALUE", value_parser = parse_define)]
    pub defines: Vec<(String, String)>,

    /// Extra exclude glob for the templated configuration copy (repeatable)
    #[arg(long = "exclude", global = true, value_name = "GLOB")]
    pub excludes: Vec<String>,

    /// Skip corrupt dependency archives with a warning instead of failing
    #[arg(long, global = true)]
    pub skip_corrupt: bool,

    /// Let later plan segments overwrite earlier ones at the same path
    #[arg(long, global = true)]
    pub allow_overwrite: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install the application tree into installDir
    #[command(alias = "installApp")]
    Install,

    /// Build the distribution tarball
    Dist,

    /// Build the distribution zip
    Zip,

    /// Build the tarball without configuration
    Distnc,

    /// Build the zip without configuration
    Zipnc,

    /// Build the combined single archive
    Combined,

    /// Build every target in parallel
    All,

    /// Print the resolved configuration tokens
    Config,

    /// Print the merged service registrations
    Services,
}

/// Parse `KEY=VALUE`
fn parse_define(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}
