// src/main.rs

use anyhow::Result;
use clap::Parser;
use distkit::TargetKind;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::RunOptions;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = RunOptions {
        project: &cli.project,
        profile: &cli.target,
        defines: &cli.defines,
        excludes: &cli.excludes,
        skip_corrupt: cli.skip_corrupt,
        allow_overwrite: cli.allow_overwrite,
    };
    let assembler = commands::assembler(&options)?;

    match cli.command {
        Commands::Install => commands::cmd_target(&assembler, TargetKind::Install),
        Commands::Dist => commands::cmd_target(&assembler, TargetKind::Dist),
        Commands::Zip => commands::cmd_target(&assembler, TargetKind::Zip),
        Commands::Distnc => commands::cmd_target(&assembler, TargetKind::DistNc),
        Commands::Zipnc => commands::cmd_target(&assembler, TargetKind::ZipNc),
        Commands::Combined => commands::cmd_target(&assembler, TargetKind::Combined),
        Commands::All => commands::cmd_all(&assembler),
        Commands::Config => commands::cmd_config(&assembler),
        Commands::Services => commands::cmd_services(&assembler),
    }
}
