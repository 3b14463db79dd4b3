use crate::error::EnvError;
use crate::logging;
use crate::shellenv::context::RunContext;
use crate::shellenv::layout::{legacy_file_name, legacy_glob_prefix};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct FrozenFile {
    pub name: String,
    pub original: PathBuf,
    pub legacy: PathBuf,
}

fn present(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to stat {}", path.display())),
    }
}

/// Rename each present target to `<name>.legacy.<timestamp>`. Symlinks are
/// renamed as links, never followed.
pub fn freeze_targets(ctx: &RunContext, targets: &[&str]) -> Result<Vec<FrozenFile>> {
    let mut frozen = Vec::new();
    for name in targets {
        let original = ctx.home_file(name);
        if !present(&original)? {
            continue;
        }
        let legacy = ctx.home_file(&legacy_file_name(name, &ctx.timestamp));
        if present(&legacy)? {
            return Err(EnvError::LegacyCollision(legacy).into());
        }
        fs::rename(&original, &legacy).with_context(|| {
            format!("failed to rename {} to {}", original.display(), legacy.display())
        })?;
        logging::info(
            &ctx.timestamp,
            "freeze",
            "rename",
            name,
            &legacy.display().to_string(),
        );
        frozen.push(FrozenFile {
            name: name.to_string(),
            original,
            legacy,
        });
    }
    Ok(frozen)
}

/// Every `<name>.legacy.*` entry in `home`, sorted by file name.
pub fn list_legacy_files(home: &Path, name: &str) -> Result<Vec<PathBuf>> {
    let prefix = legacy_glob_prefix(name);
    let mut out = Vec::new();
    for entry in fs::read_dir(home).with_context(|| format!("failed to read {}", home.display()))? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}
