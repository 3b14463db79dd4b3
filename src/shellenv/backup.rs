use crate::error::EnvError;
use crate::logging;
use crate::shellenv::context::RunContext;
use crate::shellenv::layout::{HEAVY_DIRS, MANAGED_FILES, MANIFEST_FILE};
use crate::shellenv::util::file_sha256;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, DirBuilder, FileTimes};
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Command;

const PRIVATE_DIR_MODE: u32 = 0o700;
const PRIVATE_FILE_MODE: u32 = 0o600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotFile {
    pub name: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub dir: String,
    pub archive: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub timestamp: String,
    pub mode: String,
    pub home: String,
    pub files: Vec<SnapshotFile>,
    pub archives: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone)]
pub struct BackupSnapshot {
    pub dir: PathBuf,
    pub manifest: SnapshotManifest,
}

fn copy_verbatim(src: &Path, dst: &Path) -> Result<SnapshotFile> {
    let bytes = fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
    let meta = fs::metadata(src).with_context(|| format!("failed to stat {}", src.display()))?;
    let mut times = FileTimes::new();
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    fs::File::options()
        .write(true)
        .open(dst)
        .and_then(|file| file.set_times(times))
        .with_context(|| format!("failed to carry timestamps onto {}", dst.display()))?;
    let want = file_sha256(src)?;
    let got = file_sha256(dst)?;
    if want != got {
        anyhow::bail!(
            "snapshot copy of {} does not match its source",
            src.display()
        );
    }
    Ok(SnapshotFile {
        name: src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        bytes,
        sha256: got,
    })
}

fn archive_directory(tar_bin: Option<&Path>, home: &Path, dir_name: &str, dest: &Path) -> Result<()> {
    let tar = match tar_bin {
        Some(path) => path.to_path_buf(),
        None => which::which("tar").context("tar not found in HPCENV_TAR_BIN or PATH")?,
    };
    let output = Command::new(&tar)
        .arg("-czf")
        .arg(dest)
        .arg("-C")
        .arg(home)
        .arg(dir_name)
        .output()
        .with_context(|| format!("failed to run {}", tar.display()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} exited with {}: {}", tar.display(), output.status, stderr.trim());
    }
    Ok(())
}

fn write_manifest(dir: &Path, manifest: &SnapshotManifest) -> Result<()> {
    let path = dir.join(MANIFEST_FILE);
    let data = serde_json::to_string_pretty(manifest)?;
    fs::write(&path, format!("{data}\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Copy every present managed file into a fresh snapshot directory, then
/// archive heavy directories best-effort.
pub fn create_snapshot(ctx: &RunContext) -> Result<BackupSnapshot> {
    DirBuilder::new()
        .recursive(true)
        .mode(PRIVATE_DIR_MODE)
        .create(&ctx.backup_root)
        .with_context(|| format!("failed to create {}", ctx.backup_root.display()))?;
    fs::set_permissions(&ctx.backup_root, fs::Permissions::from_mode(PRIVATE_DIR_MODE))
        .with_context(|| format!("failed to restrict {}", ctx.backup_root.display()))?;
    let dir = ctx.snapshot_dir();
    match DirBuilder::new().mode(PRIVATE_DIR_MODE).create(&dir) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Err(EnvError::SnapshotExists(dir).into());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to create {}", dir.display()));
        }
    }

    let mut files = Vec::new();
    for name in MANAGED_FILES {
        let src = ctx.home_file(name);
        if !src.is_file() {
            continue;
        }
        let copied = copy_verbatim(&src, &dir.join(name))?;
        logging::info(&ctx.timestamp, "backup", "copy", name, &format!("{} bytes", copied.bytes));
        files.push(copied);
    }

    let mut archives = Vec::new();
    for (dir_name, archive_name) in HEAVY_DIRS {
        if !ctx.home_file(dir_name).is_dir() {
            continue;
        }
        let dest = dir.join(archive_name);
        let entry = match archive_directory(ctx.tar_bin.as_deref(), &ctx.home, dir_name, &dest) {
            Ok(()) => {
                fs::set_permissions(&dest, fs::Permissions::from_mode(PRIVATE_FILE_MODE))
                    .with_context(|| format!("failed to restrict {}", dest.display()))?;
                logging::info(&ctx.timestamp, "backup", "archive", dir_name, archive_name);
                ArchiveEntry {
                    dir: dir_name.to_string(),
                    archive: archive_name.to_string(),
                    ok: true,
                    error: None,
                }
            }
            Err(err) => {
                let _ = fs::remove_file(&dest);
                logging::warn(&ctx.timestamp, "backup", "archive", dir_name, &format!("{err:#}"));
                ArchiveEntry {
                    dir: dir_name.to_string(),
                    archive: archive_name.to_string(),
                    ok: false,
                    error: Some(format!("{err:#}")),
                }
            }
        };
        archives.push(entry);
    }

    let manifest = SnapshotManifest {
        timestamp: ctx.timestamp.clone(),
        mode: ctx.mode.label().to_string(),
        home: ctx.home.display().to_string(),
        files,
        archives,
    };
    write_manifest(&dir, &manifest)?;

    Ok(BackupSnapshot { dir, manifest })
}

pub fn load_manifest(dir: &Path) -> Result<SnapshotManifest> {
    let path = dir.join(MANIFEST_FILE);
    let raw =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Problems found when re-hashing a snapshot against its manifest.
pub fn verify_snapshot(dir: &Path) -> Result<Vec<String>> {
    let manifest = load_manifest(dir)?;
    let mut problems = Vec::new();
    for file in &manifest.files {
        let path = dir.join(&file.name);
        if !path.is_file() {
            problems.push(format!("{} missing from {}", file.name, dir.display()));
            continue;
        }
        if file_sha256(&path)? != file.sha256 {
            problems.push(format!("{} in {} no longer matches its hash", file.name, dir.display()));
        }
    }
    Ok(problems)
}

/// Snapshot directories under `backup_root`, oldest first.
pub fn list_snapshots(backup_root: &Path) -> Result<Vec<PathBuf>> {
    if !backup_root.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(backup_root)
        .with_context(|| format!("failed to read {}", backup_root.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && path.join(MANIFEST_FILE).is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
