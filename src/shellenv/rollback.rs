use crate::logging;
use crate::shellenv::backup::BackupSnapshot;
use crate::shellenv::context::RunContext;
use crate::shellenv::layout::ROLLBACK_PREFIX;
use crate::shellenv::templates;
use crate::shellenv::util::write_owner_only;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn emit_rollback(ctx: &RunContext, snapshot: &BackupSnapshot) -> Result<PathBuf> {
    if !snapshot.dir.is_dir() {
        anyhow::bail!(
            "cannot bind rollback to missing snapshot {}",
            snapshot.dir.display()
        );
    }
    let path = ctx.rollback_script_path();
    let body = templates::rollback_script(&snapshot.dir, &ctx.timestamp, &ctx.home);
    write_owner_only(&path, &body)?;
    logging::info(
        &ctx.timestamp,
        "rollback",
        "emit",
        &path.display().to_string(),
        &snapshot.dir.display().to_string(),
    );
    Ok(path)
}

/// Rollback scripts in `home`, oldest first.
pub fn list_rollback_scripts(home: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(home).with_context(|| format!("failed to read {}", home.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(ROLLBACK_PREFIX) && name.ends_with(".sh") {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}
