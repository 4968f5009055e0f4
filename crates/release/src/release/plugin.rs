//! Plugin-variant builds through an external extensible builder (xcaddy).
//!
//! The builder is optional: when it cannot be found the plugin path is
//! disabled for the whole run with a warning, and the standard archives
//! are still produced.

use crate::release::config::{PluginSpec, Target};
use crate::release::error::ReleaseError;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Resolve the plugin builder once per run. Unavailability is reported on
/// stderr and degrades the run instead of failing it.
pub fn locate(builder: &str) -> Option<PathBuf> {
    match locate_in(builder, &default_fallback_dir()) {
        Ok(path) => Some(path),
        Err(err) => {
            eprintln!("[warn] {err}; plugin builds disabled for this run");
            None
        }
    }
}

/// PATH first, then one well-known install location.
fn locate_in(builder: &str, fallback_dir: &Path) -> Result<PathBuf, ReleaseError> {
    if let Ok(path) = which::which(builder) {
        return Ok(path);
    }
    let fallback = fallback_dir.join(builder);
    if fallback.is_file() {
        return Ok(fallback);
    }
    Err(ReleaseError::PluginBuilderUnavailable {
        name: builder.to_string(),
        fallback: fallback_dir.to_path_buf(),
    })
}

/// Where `go install` drops binaries when GOBIN is unset.
fn default_fallback_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("go").join("bin"))
        .unwrap_or_else(|| PathBuf::from("go").join("bin"))
}

/// Build the host program with the plugin compiled in, against the local
/// source tree rather than any published module version.
pub fn build(
    builder: &Path,
    spec: &PluginSpec,
    source_root: &Path,
    target: &Target,
    output: &Path,
) -> Result<(), ReleaseError> {
    let with = format!(
        "{}={}",
        spec.module,
        source_root.join(&spec.source).display()
    );
    let replace = format!("{}={}", spec.replace, source_root.display());

    let build_failed = |diagnostics: String| ReleaseError::CompileFailed {
        entry: spec.host.clone(),
        os: target.os.clone(),
        arch: target.arch.clone(),
        diagnostics,
    };

    let result = Command::new(builder)
        .current_dir(source_root)
        .env("GOOS", &target.os)
        .env("GOARCH", &target.arch)
        .env("CGO_ENABLED", "0")
        .args([
            "build",
            "--with",
            with.as_str(),
            "--replace",
            replace.as_str(),
            "--output",
        ])
        .arg(output)
        .output()
        .map_err(|e| build_failed(format!("failed to run {}: {e}", builder.display())))?;

    if !result.status.success() {
        let mut diagnostics = String::from_utf8_lossy(&result.stderr).into_owned();
        if diagnostics.trim().is_empty() {
            diagnostics = String::from_utf8_lossy(&result.stdout).into_owned();
        }
        return Err(build_failed(diagnostics));
    }

    Ok(())
}

/// Binary name inside the plugin bundle, e.g. `caddy` or `caddy.exe`.
pub fn output_name(spec: &PluginSpec, target: &Target) -> String {
    format!("{}{}", spec.host, target.exe_suffix())
}
