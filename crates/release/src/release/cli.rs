use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// What to do when a single compile fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OnError {
    /// Stop the whole run on the first failure (default).
    #[value(name = "abort")]
    Abort,

    /// Skip the failed binary, keep packaging whatever was built.
    #[value(name = "continue")]
    Continue,
}

#[derive(Parser)]
#[command(name = "certdx-release")]
#[command(about = "Cross-compile and package certdx release archives")]
pub struct Cli {
    /// Release matrix as JSON (defaults to the built-in certdx matrix).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Checkout to build from.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub source_root: PathBuf,

    /// Where bundles and archives are written.
    #[arg(long, value_name = "DIR", default_value = "release")]
    pub output: PathBuf,

    /// Targets built concurrently (1 = fully sequential).
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,

    #[arg(long, value_enum, default_value_t = OnError::Abort)]
    pub on_error: OnError,

    /// Build only the standard archives, even if the plugin builder is installed.
    #[arg(long)]
    pub skip_plugin: bool,

    #[command(subcommand)]
    pub cmd: Option<Cmd>,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Build and package every target (the default when no command is given).
    Build,

    /// Print the configured targets, entry points and plugin-builder status.
    Matrix,

    /// Remove stale bundle directories and archives from the output root.
    Clean,
}
