//! One cross-compile invocation.

use crate::release::config::{EntryPoint, Target};
use crate::release::error::ReleaseError;
use crate::release::metadata::BuildMetadata;
use std::path::Path;
use std::process::Command;

/// Compile one entry point for one target into `output`.
///
/// The toolchain runs in the source root with the target platform set via
/// environment and native interop disabled, so cross-compiles never need a
/// platform C toolchain. Link flags strip symbol tables and inject the
/// build metadata as compile-time constants. No retries: a failure carries
/// the tool's diagnostics back to the caller.
pub fn compile(
    compiler: &str,
    source_root: &Path,
    target: &Target,
    entry: &EntryPoint,
    metadata: &BuildMetadata,
    output: &Path,
) -> Result<(), ReleaseError> {
    let ldflags = format!(
        "-s -w -X main.buildCommit={} -X 'main.buildDate={}'",
        metadata.commit, metadata.date
    );

    let compile_failed = |diagnostics: String| ReleaseError::CompileFailed {
        entry: entry.name.clone(),
        os: target.os.clone(),
        arch: target.arch.clone(),
        diagnostics,
    };

    let result = Command::new(compiler)
        .current_dir(source_root)
        .env("GOOS", &target.os)
        .env("GOARCH", &target.arch)
        .env("CGO_ENABLED", "0")
        .args(["build", "-ldflags", ldflags.as_str(), "-o"])
        .arg(output)
        .arg(format!("./{}", entry.source))
        .output()
        .map_err(|e| compile_failed(format!("failed to run {compiler}: {e}")))?;

    if !result.status.success() {
        let mut diagnostics = String::from_utf8_lossy(&result.stderr).into_owned();
        if diagnostics.trim().is_empty() {
            diagnostics = String::from_utf8_lossy(&result.stdout).into_owned();
        }
        return Err(compile_failed(diagnostics));
    }

    Ok(())
}
