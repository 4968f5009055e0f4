//! Failure classes of the release pipeline.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReleaseError {
    /// No version-control metadata reachable; the run cannot embed provenance.
    #[error("build metadata unavailable: {reason}")]
    MetadataUnavailable { reason: String },

    /// One compile invocation failed. Carries the tool's output verbatim.
    #[error("compile of {entry} for {os}/{arch} failed:\n{diagnostics}")]
    CompileFailed {
        entry: String,
        os: String,
        arch: String,
        diagnostics: String,
    },

    /// An auxiliary file could not be staged into the bundle.
    #[error("staging into {bundle} failed: {reason}")]
    StagingFailed { bundle: PathBuf, reason: String },

    /// The archiver failed; the bundle directory is left in place.
    #[error("archiving {bundle} failed: {reason}")]
    ArchiveFailed { bundle: PathBuf, reason: String },

    /// The plugin builder was not found. Disables the plugin path only.
    #[error("plugin builder '{name}' not found in PATH or {fallback}")]
    PluginBuilderUnavailable { name: String, fallback: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
