//! Release pipeline for certdx.
//!
//! Structure:
//! - `config` - the build matrix as data (targets, entry points, copy-sets)
//! - `metadata` - build provenance embedded into every binary
//! - `toolchain` - one cross-compile invocation
//! - `plugin` - xcaddy discovery and the Caddy-plugin variant
//! - `stage` - staging directories and auxiliary files
//! - `archive` - per-OS archive formats
//! - `matrix` - the target loop

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod matrix;
pub mod metadata;
pub mod plugin;
pub mod stage;
pub mod toolchain;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Base paths every component works against. Nothing below resolves
/// paths from the ambient working directory.
pub struct Paths {
    /// Checkout the toolchain compiles from.
    pub source_root: PathBuf,
    /// Directory receiving bundles and archives.
    pub output_root: PathBuf,
}

impl Paths {
    pub fn new(source_root: &Path, output_root: &Path) -> Result<Self> {
        let source_root = source_root
            .canonicalize()
            .with_context(|| format!("source root not found: {}", source_root.display()))?;
        std::fs::create_dir_all(output_root)
            .with_context(|| format!("cannot create output root: {}", output_root.display()))?;
        let output_root = output_root
            .canonicalize()
            .with_context(|| format!("output root not found: {}", output_root.display()))?;
        Ok(Self {
            source_root,
            output_root,
        })
    }
}
