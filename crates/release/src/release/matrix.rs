//! The build matrix: each target is fully processed (compiles, staging,
//! archival, cleanup, plugin variant) before its worker takes the next.

use crate::release::cli::OnError;
use crate::release::config::{PluginSpec, ReleaseConfig, Target};
use crate::release::error::ReleaseError;
use crate::release::metadata::{self, BuildMetadata};
use crate::release::{archive, plugin, stage, toolchain, Paths};
use anyhow::{bail, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct RunOptions {
    pub policy: OnError,
    pub jobs: usize,
    pub skip_plugin: bool,
}

/// Run the whole matrix. Metadata is resolved once and shared read-only
/// with every compile; the plugin builder is located once and gates the
/// plugin path for the entire run.
pub fn run(config: &ReleaseConfig, paths: &Paths, opts: &RunOptions) -> Result<()> {
    println!("=== {} release build ===", config.product);

    let metadata = metadata::resolve(&paths.source_root, Utc::now())?;
    println!("  Commit: {}", metadata.commit);
    println!("  Date:   {}", metadata.date);

    stage::sweep(config, paths)?;

    let located = if opts.skip_plugin {
        None
    } else {
        config
            .plugin
            .as_ref()
            .and_then(|spec| plugin::locate(&spec.builder).map(|path| (spec, path)))
    };
    if let Some((spec, path)) = &located {
        println!("  Plugin builder: {} ({})", spec.builder, path.display());
    }

    let next = AtomicUsize::new(0);
    let cancel = AtomicBool::new(false);
    let archives: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
    let failures: Mutex<Vec<String>> = Mutex::new(Vec::new());

    let jobs = opts.jobs.clamp(1, config.targets.len().max(1));

    std::thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(target) = config.targets.get(index) else {
                    break;
                };
                if cancel.load(Ordering::SeqCst) {
                    break;
                }

                println!("\n=== {} ===", target.bundle_name(&config.product));
                let outcome = build_target(
                    config,
                    paths,
                    &metadata,
                    located.as_ref(),
                    target,
                    opts.policy,
                    &cancel,
                );
                match outcome {
                    Ok(mut made) => lock(&archives).append(&mut made),
                    Err(err) => {
                        eprintln!("[fail] {err}");
                        lock(&failures).push(err.to_string());
                        if opts.policy == OnError::Abort {
                            cancel.store(true, Ordering::SeqCst);
                        }
                    }
                }
            });
        }
    });

    let archives = archives.into_inner().unwrap_or_else(PoisonError::into_inner);
    let failures = failures.into_inner().unwrap_or_else(PoisonError::into_inner);

    if !failures.is_empty() {
        match opts.policy {
            OnError::Abort => bail!("release aborted after {} failure(s)", failures.len()),
            OnError::Continue => eprintln!(
                "[warn] {} step(s) failed, release is incomplete",
                failures.len()
            ),
        }
    }

    println!(
        "\n=== Release complete: {} archive(s) in {} ===",
        archives.len(),
        paths.output_root.display()
    );
    Ok(())
}

/// Print the configured matrix and whether the plugin builder resolves.
pub fn print(config: &ReleaseConfig) -> Result<()> {
    println!("Release matrix for {}:\n", config.product);
    println!("  Targets:");
    for target in &config.targets {
        println!(
            "    {:8} {:8} -> {}.{}",
            target.os,
            target.arch,
            target.bundle_name(&config.product),
            target.archive_format().extension()
        );
    }
    println!("\n  Entry points:");
    for entry in &config.entry_points {
        println!("    {:8} {}", entry.name, entry.source);
    }
    match &config.plugin {
        Some(spec) => match plugin::locate(&spec.builder) {
            Some(path) => println!("\n  Plugin builder: {} ({})", spec.builder, path.display()),
            None => println!("\n  Plugin builder: {} (unavailable)", spec.builder),
        },
        None => println!("\n  Plugin variant: not configured"),
    }
    Ok(())
}

/// Build, stage, archive and clean up one target. A failed target keeps
/// its bundle directory on disk for inspection; a target cancelled by an
/// abort elsewhere removes its partial bundle.
fn build_target(
    config: &ReleaseConfig,
    paths: &Paths,
    metadata: &BuildMetadata,
    located: Option<&(&PluginSpec, PathBuf)>,
    target: &Target,
    policy: OnError,
    cancel: &AtomicBool,
) -> Result<Vec<PathBuf>, ReleaseError> {
    let mut made = Vec::new();

    let bundle = paths.output_root.join(target.bundle_name(&config.product));
    stage::create_bundle(&bundle)?;

    for entry in &config.entry_points {
        if cancel.load(Ordering::SeqCst) {
            stage::cleanup(&bundle)?;
            return Ok(made);
        }
        let output = bundle.join(format!(
            "{}{}",
            config.binary_name(entry),
            target.exe_suffix()
        ));
        match toolchain::compile(
            &config.compiler,
            &paths.source_root,
            target,
            entry,
            metadata,
            &output,
        ) {
            Ok(()) => println!("  Built: {}", output.display()),
            Err(err) if policy == OnError::Continue => {
                eprintln!("[warn] {err}");
                eprintln!(
                    "[warn] packaging {} without {}",
                    target.bundle_name(&config.product),
                    config.binary_name(entry)
                );
            }
            Err(err) => return Err(err),
        }
    }

    stage::stage(&bundle, &paths.source_root, &config.aux_files)?;
    let archive_path = archive::pack(&bundle, target.archive_format())?;
    stage::cleanup(&bundle)?;
    println!("  Packaged: {}", archive_path.display());
    made.push(archive_path);

    if let Some((spec, builder)) = located {
        if cancel.load(Ordering::SeqCst) {
            return Ok(made);
        }
        match build_plugin_variant(config, paths, spec, builder, target) {
            Ok(path) => {
                println!("  Packaged: {}", path.display());
                made.push(path);
            }
            Err(err) if policy == OnError::Continue => eprintln!("[warn] {err}"),
            Err(err) => return Err(err),
        }
    }

    Ok(made)
}

fn build_plugin_variant(
    config: &ReleaseConfig,
    paths: &Paths,
    spec: &PluginSpec,
    builder: &Path,
    target: &Target,
) -> Result<PathBuf, ReleaseError> {
    let bundle = paths
        .output_root
        .join(spec.bundle_name(&config.product, target));
    stage::create_bundle(&bundle)?;

    let output = bundle.join(plugin::output_name(spec, target));
    plugin::build(builder, spec, &paths.source_root, target, &output)?;
    println!("  Built: {}", output.display());

    stage::stage(&bundle, &paths.source_root, &spec.aux_files)?;
    let archive_path = archive::pack(&bundle, target.archive_format())?;
    stage::cleanup(&bundle)?;
    Ok(archive_path)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::release::config::EntryPoint;
    use std::process::Command;

    /// Fake toolchain: records env and argv, creates the `-o` target.
    const RECORDER: &str = r#"#!/bin/sh
log="$(dirname "$0")/compile.log"
printf 'GOOS=%s GOARCH=%s' "$GOOS" "$GOARCH" >> "$log"
printf ' %s' "$@" >> "$log"
printf '\n' >> "$log"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
[ -n "$out" ] && : > "$out"
"#;

    /// Like RECORDER, but refuses to build the client entry point.
    const CLIENT_BROKEN: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    */client) echo 'client does not compile' >&2; exit 1 ;;
  esac
done
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
[ -n "$out" ] && : > "$out"
"#;

    fn write_script(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, body).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    /// A tempdir holding a committed source tree, a fake compiler, and an
    /// output root, plus a small matrix config wired to them.
    fn setup(compiler_script: &str) -> (tempfile::TempDir, ReleaseConfig, Paths) {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("README.md"), "readme").unwrap();
        std::fs::write(source.join("LICENSE"), "license").unwrap();
        git(&source, &["init", "-q"]);
        git(
            &source,
            &[
                "-c",
                "user.name=release",
                "-c",
                "user.email=release@test",
                "commit",
                "-q",
                "--allow-empty",
                "-m",
                "init",
            ],
        );

        let compiler = tmp.path().join("go");
        write_script(&compiler, compiler_script);

        let paths = Paths::new(&source, &tmp.path().join("release")).unwrap();

        let mut config = ReleaseConfig::default();
        config.compiler = compiler.to_string_lossy().into_owned();
        config.targets = vec![Target::new("linux", "amd64")];
        config.entry_points = vec![EntryPoint::new("server", "exec/server")];
        config.aux_files = vec!["README.md".to_string(), "LICENSE".to_string()];
        config.plugin = None;
        (tmp, config, paths)
    }

    fn opts(policy: OnError) -> RunOptions {
        RunOptions {
            policy,
            jobs: 1,
            skip_plugin: false,
        }
    }

    fn tar_entries(archive: &Path) -> Vec<String> {
        let file = std::fs::File::open(archive).unwrap();
        let mut reader = tar::Archive::new(flate2::read::GzDecoder::new(file));
        reader
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn one_archive_per_target_and_no_staging_left() {
        let (_tmp, mut config, paths) = setup(RECORDER);
        config.targets = vec![Target::new("linux", "amd64"), Target::new("windows", "amd64")];

        run(&config, &paths, &opts(OnError::Abort)).unwrap();

        let tgz = paths.output_root.join("certdx_linux_amd64.tar.gz");
        let zip_path = paths.output_root.join("certdx_windows_amd64.zip");
        assert!(tgz.is_file());
        assert!(zip_path.is_file());
        assert!(!paths.output_root.join("certdx_linux_amd64").exists());
        assert!(!paths.output_root.join("certdx_windows_amd64").exists());

        let entries = tar_entries(&tgz);
        assert!(entries.iter().any(|e| e == "certdx_linux_amd64/certdx_server"));
        assert!(entries.iter().any(|e| e == "certdx_linux_amd64/LICENSE"));

        let mut zip = zip::ZipArchive::new(std::fs::File::open(&zip_path).unwrap()).unwrap();
        assert!(zip.by_name("certdx_windows_amd64/certdx_server.exe").is_ok());
    }

    #[test]
    fn metadata_is_identical_across_all_compiles() {
        let (tmp, mut config, paths) = setup(RECORDER);
        config.targets = vec![Target::new("linux", "amd64"), Target::new("linux", "arm64")];
        config.entry_points = vec![
            EntryPoint::new("server", "exec/server"),
            EntryPoint::new("client", "exec/client"),
        ];

        run(&config, &paths, &opts(OnError::Abort)).unwrap();

        let log = std::fs::read_to_string(tmp.path().join("compile.log")).unwrap();
        let commits: std::collections::HashSet<&str> = log
            .lines()
            .map(|line| {
                let start = line.find("main.buildCommit=").unwrap();
                line[start..].split_whitespace().next().unwrap()
            })
            .collect();
        assert_eq!(log.lines().count(), 4);
        assert_eq!(commits.len(), 1);
    }

    #[test]
    fn abort_policy_preserves_failed_bundle_and_stops() {
        let (_tmp, mut config, paths) = setup(CLIENT_BROKEN);
        config.targets = vec![Target::new("linux", "amd64"), Target::new("linux", "arm64")];
        config.entry_points = vec![
            EntryPoint::new("server", "exec/server"),
            EntryPoint::new("client", "exec/client"),
        ];

        let err = run(&config, &paths, &opts(OnError::Abort)).unwrap_err();
        assert!(err.to_string().contains("aborted"));

        // Failed target: no archive, staging kept for inspection.
        let failed = paths.output_root.join("certdx_linux_amd64");
        assert!(failed.is_dir());
        assert!(failed.join("certdx_server").is_file());
        assert!(!paths.output_root.join("certdx_linux_amd64.tar.gz").exists());

        // The second target was never started.
        assert!(!paths.output_root.join("certdx_linux_arm64").exists());
        assert!(!paths.output_root.join("certdx_linux_arm64.tar.gz").exists());
    }

    #[test]
    fn continue_policy_packages_whatever_built() {
        let (_tmp, mut config, paths) = setup(CLIENT_BROKEN);
        config.targets = vec![Target::new("linux", "amd64"), Target::new("linux", "arm64")];
        config.entry_points = vec![
            EntryPoint::new("server", "exec/server"),
            EntryPoint::new("client", "exec/client"),
        ];

        run(&config, &paths, &opts(OnError::Continue)).unwrap();

        for stem in ["certdx_linux_amd64", "certdx_linux_arm64"] {
            let archive = paths.output_root.join(format!("{stem}.tar.gz"));
            assert!(archive.is_file(), "missing {stem} archive");
            assert!(!paths.output_root.join(stem).exists());

            let entries = tar_entries(&archive);
            assert!(entries.iter().any(|e| e == &format!("{stem}/certdx_server")));
            assert!(!entries.iter().any(|e| e == &format!("{stem}/certdx_client")));
        }
    }

    #[test]
    fn unavailable_plugin_builder_degrades_gracefully() {
        let (_tmp, mut config, paths) = setup(RECORDER);
        config.plugin = Some(PluginSpec {
            builder: "certdx-no-such-builder".to_string(),
            ..PluginSpec::default()
        });

        run(&config, &paths, &opts(OnError::Abort)).unwrap();

        assert!(paths.output_root.join("certdx_linux_amd64.tar.gz").is_file());
        assert!(!paths
            .output_root
            .join("caddy_certdx_linux_amd64.tar.gz")
            .exists());
    }

    #[test]
    fn plugin_variant_is_archived_when_builder_present() {
        let (tmp, mut config, paths) = setup(RECORDER);
        let builder = tmp.path().join("xcaddy");
        write_script(
            &builder,
            r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then out="$2"; fi
  shift
done
[ -n "$out" ] && : > "$out"
"#,
        );
        config.plugin = Some(PluginSpec {
            builder: builder.to_string_lossy().into_owned(),
            ..PluginSpec::default()
        });

        run(&config, &paths, &opts(OnError::Abort)).unwrap();

        let archive = paths.output_root.join("caddy_certdx_linux_amd64.tar.gz");
        assert!(archive.is_file());
        assert!(!paths.output_root.join("caddy_certdx_linux_amd64").exists());

        let entries = tar_entries(&archive);
        assert!(entries.iter().any(|e| e == "caddy_certdx_linux_amd64/caddy"));
        assert!(entries.iter().any(|e| e == "caddy_certdx_linux_amd64/README.md"));
        assert!(entries.iter().any(|e| e == "caddy_certdx_linux_amd64/LICENSE"));
        assert!(!entries.iter().any(|e| e.ends_with("/certdx_server")));
    }

    #[test]
    fn missing_aux_file_preserves_bundle() {
        let (_tmp, mut config, paths) = setup(RECORDER);
        config.aux_files.push("systemd/certdx-server.service".to_string());

        let err = run(&config, &paths, &opts(OnError::Abort)).unwrap_err();
        assert!(err.to_string().contains("aborted"));

        let bundle = paths.output_root.join("certdx_linux_amd64");
        assert!(bundle.is_dir());
        assert!(bundle.join("certdx_server").is_file());
        assert!(!paths.output_root.join("certdx_linux_amd64.tar.gz").exists());
    }

    #[test]
    fn worker_pool_produces_the_same_archive_set() {
        let (_tmp, mut config, paths) = setup(RECORDER);
        config.targets = vec![
            Target::new("linux", "amd64"),
            Target::new("linux", "arm64"),
            Target::new("linux", "mips"),
            Target::new("windows", "amd64"),
        ];

        run(
            &config,
            &paths,
            &RunOptions {
                policy: OnError::Abort,
                jobs: 4,
                skip_plugin: false,
            },
        )
        .unwrap();

        for stem in [
            "certdx_linux_amd64",
            "certdx_linux_arm64",
            "certdx_linux_mips",
        ] {
            assert!(paths.output_root.join(format!("{stem}.tar.gz")).is_file());
            assert!(!paths.output_root.join(stem).exists());
        }
        assert!(paths.output_root.join("certdx_windows_amd64.zip").is_file());
    }

    #[test]
    fn stale_outputs_are_swept_before_the_matrix() {
        let (_tmp, mut config, paths) = setup(RECORDER);
        config.plugin = Some(PluginSpec {
            builder: "certdx-no-such-builder".to_string(),
            ..PluginSpec::default()
        });
        let stale = paths.output_root.join("caddy_certdx_linux_amd64.tar.gz");
        std::fs::write(&stale, "old").unwrap();

        // The builder is unavailable, so nothing recreates the archive.
        run(&config, &paths, &opts(OnError::Abort)).unwrap();
        assert!(!stale.exists());
    }
}
