//! Staging directories: created per target, filled with binaries and
//! auxiliary files, consumed by archival, then removed. A bundle that
//! failed stays on disk for inspection.

use crate::release::config::ReleaseConfig;
use crate::release::error::ReleaseError;
use crate::release::Paths;
use anyhow::Result;
use std::path::Path;

/// Create an empty bundle directory, removing any stale one first.
pub fn create_bundle(bundle: &Path) -> Result<(), ReleaseError> {
    if bundle.exists() {
        std::fs::remove_dir_all(bundle).map_err(|e| staging_failed(bundle, &e))?;
    }
    std::fs::create_dir_all(bundle).map_err(|e| staging_failed(bundle, &e))
}

/// Copy the auxiliary copy-set into the bundle, flat, keeping file names.
/// Paths are relative to the source root.
pub fn stage(bundle: &Path, source_root: &Path, files: &[String]) -> Result<(), ReleaseError> {
    std::fs::create_dir_all(bundle).map_err(|e| staging_failed(bundle, &e))?;
    for rel in files {
        let src = source_root.join(rel);
        if !src.is_file() {
            return Err(ReleaseError::StagingFailed {
                bundle: bundle.to_path_buf(),
                reason: format!("missing auxiliary file: {}", src.display()),
            });
        }
        let name = src.file_name().unwrap_or(src.as_os_str()).to_os_string();
        std::fs::copy(&src, bundle.join(&name)).map_err(|e| staging_failed(bundle, &e))?;
    }
    Ok(())
}

/// Remove a staging directory once its archive is committed.
pub fn cleanup(bundle: &Path) -> Result<(), ReleaseError> {
    if bundle.exists() {
        std::fs::remove_dir_all(bundle)?;
    }
    Ok(())
}

/// Remove previous bundles and archives for every configured stem, so a
/// run never mixes old and new artifacts.
pub fn sweep(config: &ReleaseConfig, paths: &Paths) -> Result<()> {
    for stem in output_stems(config) {
        let dir = paths.output_root.join(&stem);
        if dir.is_dir() {
            std::fs::remove_dir_all(&dir)?;
            println!("  Removed stale bundle: {stem}");
        }
        for ext in ["tar.gz", "zip"] {
            let archive = paths.output_root.join(format!("{stem}.{ext}"));
            if archive.is_file() {
                std::fs::remove_file(&archive)?;
                println!("  Removed stale archive: {stem}.{ext}");
            }
        }
    }
    Ok(())
}

/// Every bundle stem a run with this config can produce.
fn output_stems(config: &ReleaseConfig) -> Vec<String> {
    let mut stems = Vec::new();
    for target in &config.targets {
        stems.push(target.bundle_name(&config.product));
        if let Some(spec) = &config.plugin {
            stems.push(spec.bundle_name(&config.product, target));
        }
    }
    stems
}

fn staging_failed(bundle: &Path, err: &std::io::Error) -> ReleaseError {
    ReleaseError::StagingFailed {
        bundle: bundle.to_path_buf(),
        reason: err.to_string(),
    }
}
