//! The release matrix as data.
//!
//! Targets, entry points and copy-sets are configuration, not code, so the
//! orchestrator can be exercised against small synthetic matrices. The
//! built-in defaults are the shipped certdx matrix; `--config` replaces
//! them from a JSON file.

use crate::release::archive::ArchiveFormat;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// One (operating system, architecture) pair to build for.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Target {
    pub os: String,
    pub arch: String,
}

impl Target {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// Staging directory and archive stem, e.g. `certdx_linux_amd64`.
    pub fn bundle_name(&self, product: &str) -> String {
        format!("{}_{}_{}", product, self.os, self.arch)
    }

    /// Executable suffix the target OS requires.
    pub fn exe_suffix(&self) -> &'static str {
        if self.os == "windows" {
            ".exe"
        } else {
            ""
        }
    }

    /// Archive format is a pure function of the target OS: zip for
    /// windows, gzip-compressed tar everywhere else.
    pub fn archive_format(&self) -> ArchiveFormat {
        if self.os == "windows" {
            ArchiveFormat::Zip
        } else {
            ArchiveFormat::TarGz
        }
    }
}

/// One program the release ships, with its package path relative to the
/// source root.
#[derive(Clone, Debug, Deserialize)]
pub struct EntryPoint {
    pub name: String,
    pub source: String,
}

impl EntryPoint {
    pub fn new(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
        }
    }
}

/// The optional plugin-variant build through an external extensible builder.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PluginSpec {
    /// Builder executable looked up on PATH, then under `$HOME/go/bin`.
    pub builder: String,
    /// Host program name; prefixes the bundle and names the binary.
    pub host: String,
    /// Module that implements the plugin.
    pub module: String,
    /// Where the plugin's source lives, relative to the source root.
    pub source: String,
    /// Published module replaced by the local source tree.
    pub replace: String,
    /// Reduced auxiliary set shipped with the plugin variant.
    pub aux_files: Vec<String>,
}

impl PluginSpec {
    /// Plugin-variant bundle stem, e.g. `caddy_certdx_linux_amd64`.
    pub fn bundle_name(&self, product: &str, target: &Target) -> String {
        format!("{}_{}", self.host, target.bundle_name(product))
    }
}

impl Default for PluginSpec {
    fn default() -> Self {
        Self {
            builder: "xcaddy".to_string(),
            host: "caddy".to_string(),
            module: "pkg.para.party/certdx/exec/caddytls".to_string(),
            source: "exec/caddytls".to_string(),
            replace: "pkg.para.party/certdx".to_string(),
            aux_files: vec!["README.md".to_string(), "LICENSE".to_string()],
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub product: String,
    /// Toolchain command; overridable so tests can substitute a recorder.
    pub compiler: String,
    pub targets: Vec<Target>,
    pub entry_points: Vec<EntryPoint>,
    /// Auxiliary files copied into every standard bundle, relative to the
    /// source root.
    pub aux_files: Vec<String>,
    pub plugin: Option<PluginSpec>,
}

impl ReleaseConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid release config: {}", path.display()))
    }

    /// Name of one shipped binary, e.g. `certdx_server`.
    pub fn binary_name(&self, entry: &EntryPoint) -> String {
        format!("{}_{}", self.product, entry.name)
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            product: "certdx".to_string(),
            compiler: "go".to_string(),
            targets: vec![
                Target::new("linux", "amd64"),
                Target::new("linux", "arm"),
                Target::new("linux", "arm64"),
                Target::new("linux", "mips"),
                Target::new("linux", "mipsle"),
                Target::new("windows", "amd64"),
            ],
            entry_points: vec![
                EntryPoint::new("server", "exec/server"),
                EntryPoint::new("client", "exec/client"),
                EntryPoint::new("tools", "exec/tools"),
            ],
            aux_files: vec![
                "README.md".to_string(),
                "LICENSE".to_string(),
                "config/server.example.toml".to_string(),
                "config/client.example.toml".to_string(),
                "systemd/certdx-server.service".to_string(),
                "systemd/certdx-client.service".to_string(),
            ],
            plugin: Some(PluginSpec::default()),
        }
    }
}
