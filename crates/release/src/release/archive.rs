//! Archive creation. Windows targets get a zip (no tar preinstalled
//! there); every other OS gets a gzip-compressed tar. The archive always
//! contains the bundle directory itself as the top-level entry.

use crate::release::error::ReleaseError;
use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        }
    }
}

/// Pack a bundle directory into `<bundle>.<ext>` next to it and return the
/// archive path. The bundle itself is left in place for the caller to
/// remove once the archive is committed.
pub fn pack(bundle: &Path, format: ArchiveFormat) -> Result<PathBuf, ReleaseError> {
    let archive_failed = |reason: String| ReleaseError::ArchiveFailed {
        bundle: bundle.to_path_buf(),
        reason,
    };

    let name = bundle
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| archive_failed("bundle directory has no name".to_string()))?;
    let parent = bundle.parent().unwrap_or_else(|| Path::new("."));
    let archive_path = parent.join(format!("{name}.{}", format.extension()));

    let result = match format {
        ArchiveFormat::TarGz => pack_tar_gz(bundle, name, &archive_path),
        ArchiveFormat::Zip => pack_zip(bundle, name, &archive_path),
    };
    if let Err(err) = result {
        // Leave no half-written archive behind.
        let _ = std::fs::remove_file(&archive_path);
        return Err(archive_failed(err.to_string()));
    }

    Ok(archive_path)
}

fn pack_tar_gz(bundle: &Path, name: &str, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(name, bundle)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

fn pack_zip(bundle: &Path, name: &str, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    for entry in WalkDir::new(bundle).sort_by_file_name() {
        let entry = entry?;
        let rel = entry.path().strip_prefix(bundle)?;
        let entry_name = if rel.as_os_str().is_empty() {
            name.to_string()
        } else {
            let tail: Vec<String> = rel
                .iter()
                .map(|c| c.to_string_lossy().into_owned())
                .collect();
            format!("{name}/{}", tail.join("/"))
        };

        if entry.file_type().is_dir() {
            zip.add_directory(entry_name, options)?;
        } else {
            zip.start_file(entry_name, options)?;
            let mut source = File::open(entry.path())?;
            std::io::copy(&mut source, &mut zip)?;
        }
    }

    zip.finish()?;
    Ok(())
}
