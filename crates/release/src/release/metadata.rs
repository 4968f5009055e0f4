//! Build provenance: the short commit id and UTC build time injected into
//! every binary of a run.

use crate::release::error::ReleaseError;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::process::Command;

/// Resolved once per run and shared read-only by every compile, so all
/// binaries of one release carry identical provenance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildMetadata {
    pub commit: String,
    pub date: String,
}

/// Ask git for the current checkout head. The clock is passed in so the
/// caller (and tests) control the embedded time.
pub fn resolve(source_root: &Path, now: DateTime<Utc>) -> Result<BuildMetadata, ReleaseError> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .current_dir(source_root)
        .output()
        .map_err(|e| ReleaseError::MetadataUnavailable {
            reason: format!("failed to run git: {e}"),
        })?;

    if !output.status.success() {
        return Err(ReleaseError::MetadataUnavailable {
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if commit.is_empty() {
        return Err(ReleaseError::MetadataUnavailable {
            reason: "git returned an empty revision".to_string(),
        });
    }

    Ok(BuildMetadata {
        commit,
        date: format_build_date(now),
    })
}

/// Minute-precision UTC, the format the shipped binaries print at startup.
fn format_build_date(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M").to_string()
}
