//! # certdx release orchestrator
//!
//! Cross-compiles every certdx entry point for every target platform and
//! packages one archive per platform, plus an xcaddy-built Caddy-plugin
//! variant when xcaddy is installed.
//!
//! ## Usage
//!
//! ```bash
//! certdx-release                 # Build and package the full matrix
//! certdx-release matrix          # Show targets, entry points, plugin status
//! certdx-release clean           # Remove stale bundles and archives
//! certdx-release --on-error continue --jobs 4
//! ```

use anyhow::Result;
use clap::Parser;

mod release;

use release::cli::{Cli, Cmd};
use release::config::ReleaseConfig;
use release::matrix::{self, RunOptions};
use release::Paths;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ReleaseConfig::load(path)?,
        None => ReleaseConfig::default(),
    };
    let paths = Paths::new(&cli.source_root, &cli.output)?;

    match cli.cmd.unwrap_or(Cmd::Build) {
        Cmd::Build => matrix::run(
            &config,
            &paths,
            &RunOptions {
                policy: cli.on_error,
                jobs: cli.jobs,
                skip_plugin: cli.skip_plugin,
            },
        ),
        Cmd::Matrix => matrix::print(&config),
        Cmd::Clean => release::stage::sweep(&config, &paths),
    }
}
