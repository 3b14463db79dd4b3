use crate::error::EnvError;
use crate::logging;
use crate::shellenv::context::RunContext;
use crate::shellenv::layout::{LEGACY_PAIR, MANAGED_MARKER, legacy_glob_prefix, legacy_reference_name};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const MARKER_SCAN_BYTES: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Frozen,
    ActiveFallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegacyReference {
    pub name: String,
    pub link: PathBuf,
    pub target: PathBuf,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// True when the file starts with content this tool generated.
pub fn is_generated(path: &Path) -> Result<bool> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err).with_context(|| format!("failed to open {}", path.display())),
    };
    let mut head = Vec::new();
    file.take(MARKER_SCAN_BYTES)
        .read_to_end(&mut head)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&head)
        .lines()
        .any(|line| line.trim_end() == MANAGED_MARKER))
}

/// Files matching `<primary>.legacy.*` that were not written by this tool.
/// Links are followed, so a frozen dotfile link counts with its target's
/// mtime. Dangling links and entries that vanish mid-scan are skipped.
pub fn legacy_candidates(home: &Path, primary: &str) -> Result<Vec<Candidate>> {
    let prefix = legacy_glob_prefix(primary);
    let mut out = Vec::new();
    for entry in fs::read_dir(home).with_context(|| format!("failed to read {}", home.display()))? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let path = entry.path();
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(err).with_context(|| format!("failed to stat {}", path.display())),
        };
        if !meta.is_file() || is_generated(&path)? {
            continue;
        }
        out.push(Candidate {
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
            path,
        });
    }
    Ok(out)
}

/// Most recently modified candidate; equal times go to the greatest file
/// name, which carries the newest embedded timestamp.
pub fn pick_latest(candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates
        .into_iter()
        .max_by(|a, b| (a.modified, &a.path).cmp(&(b.modified, &b.path)))
}

pub fn select_legacy_source(home: &Path, primary: &str) -> Result<Option<(PathBuf, ResolutionSource)>> {
    if let Some(best) = pick_latest(legacy_candidates(home, primary)?) {
        return Ok(Some((best.path, ResolutionSource::Frozen)));
    }
    let active = home.join(primary);
    if active.is_file() && !is_generated(&active)? {
        return Ok(Some((active, ResolutionSource::ActiveFallback)));
    }
    Ok(None)
}

fn ensure_reference_slot(link: &Path) -> Result<()> {
    match fs::symlink_metadata(link) {
        Ok(meta) if !meta.file_type().is_symlink() => {
            Err(EnvError::ReferenceOccupied(link.to_path_buf()).into())
        }
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to stat {}", link.display())),
    }
}

/// Fails with E005 when any reference path of the legacy pair holds
/// something other than a link. Checked before an advanced pass mutates.
pub fn ensure_reference_slots_free(home: &Path) -> Result<()> {
    for primary in LEGACY_PAIR {
        ensure_reference_slot(&home.join(legacy_reference_name(primary)))?;
    }
    Ok(())
}

/// Point `<primary>.legacy` at `target` (relative link). An existing link is
/// replaced atomically; anything else at that path is left untouched.
pub fn pin_reference(home: &Path, primary: &str, target: &Path) -> Result<PathBuf> {
    let link = home.join(legacy_reference_name(primary));
    ensure_reference_slot(&link)?;

    let relative = target
        .file_name()
        .with_context(|| format!("legacy target {} has no file name", target.display()))?;
    let staging = home.join(format!("{}~", legacy_reference_name(primary)));
    if fs::symlink_metadata(&staging).is_ok() {
        fs::remove_file(&staging)
            .with_context(|| format!("failed to clear {}", staging.display()))?;
    }
    std::os::unix::fs::symlink(relative, &staging)
        .with_context(|| format!("failed to create link {}", staging.display()))?;
    fs::rename(&staging, &link)
        .with_context(|| format!("failed to move link into place at {}", link.display()))?;
    Ok(link)
}

/// Resolve and pin a reference for each name of the legacy pair.
pub fn resolve_references(ctx: &RunContext) -> Result<Vec<LegacyReference>> {
    let mut out = Vec::new();
    for primary in LEGACY_PAIR {
        let Some((target, source)) = select_legacy_source(&ctx.home, primary)? else {
            logging::warn(
                &ctx.timestamp,
                "resolve",
                "detect",
                primary,
                "no legacy candidate or active file; reference not pinned",
            );
            continue;
        };
        if source == ResolutionSource::ActiveFallback {
            logging::warn(
                &ctx.timestamp,
                "resolve",
                "detect",
                primary,
                "automatic legacy detection failed; using the active file",
            );
        }
        let link = pin_reference(&ctx.home, primary, &target)?;
        logging::info(
            &ctx.timestamp,
            "resolve",
            "pin",
            &link.display().to_string(),
            &target.display().to_string(),
        );
        out.push(LegacyReference {
            name: primary.to_string(),
            link,
            target,
            source,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, code_of};
    use std::time::Duration;
    use tempfile::tempdir;

    fn set_mtime(path: &Path, secs_ago: u64) {
        let when = SystemTime::now() - Duration::from_secs(secs_ago);
        fs::File::options()
            .write(true)
            .open(path)
            .expect("open")
            .set_modified(when)
            .expect("set mtime");
    }

    #[test]
    fn newest_modification_wins() {
        let tmp = tempdir().expect("tempdir");
        let home = tmp.path();
        fs::write(home.join(".bashrc.legacy.20261001_000000"), "older name, newer mtime").expect("seed");
        fs::write(home.join(".bashrc.legacy.20261002_000000"), "newer name, older mtime").expect("seed");
        set_mtime(&home.join(".bashrc.legacy.20261001_000000"), 10);
        set_mtime(&home.join(".bashrc.legacy.20261002_000000"), 3_600);

        let (path, source) = select_legacy_source(home, ".bashrc").expect("select").expect("some");
        assert_eq!(path, home.join(".bashrc.legacy.20261001_000000"));
        assert_eq!(source, ResolutionSource::Frozen);
    }

    #[test]
    fn equal_mtimes_break_toward_greatest_name() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let picked = pick_latest(vec![
            Candidate { path: PathBuf::from("/h/.bashrc.legacy.20261002_000000"), modified: base },
            Candidate { path: PathBuf::from("/h/.bashrc.legacy.20261003_000000"), modified: base },
            Candidate { path: PathBuf::from("/h/.bashrc.legacy.20261001_000000"), modified: base },
        ])
        .expect("some");
        assert_eq!(picked.path, PathBuf::from("/h/.bashrc.legacy.20261003_000000"));
    }

    #[test]
    fn generated_routers_are_never_legacy_sources() {
        let tmp = tempdir().expect("tempdir");
        let home = tmp.path();
        fs::write(home.join(".bash_profile.legacy.t1"), "corp profile\n").expect("seed");
        fs::write(
            home.join(".bash_profile.legacy.t2"),
            format!("# ~/.bash_profile\n{MANAGED_MARKER}\n"),
        )
        .expect("seed");
        set_mtime(&home.join(".bash_profile.legacy.t1"), 600);

        let (path, _) = select_legacy_source(home, ".bash_profile").expect("select").expect("some");
        assert_eq!(path, home.join(".bash_profile.legacy.t1"));
    }

    #[test]
    fn falls_back_to_active_file() {
        let tmp = tempdir().expect("tempdir");
        let home = tmp.path();
        fs::write(home.join(".bashrc"), "corp rc\n").expect("seed");
        let (path, source) = select_legacy_source(home, ".bashrc").expect("select").expect("some");
        assert_eq!(path, home.join(".bashrc"));
        assert_eq!(source, ResolutionSource::ActiveFallback);
        assert!(select_legacy_source(home, ".bash_profile").expect("select").is_none());
    }

    #[test]
    fn pin_repoints_existing_link() {
        let tmp = tempdir().expect("tempdir");
        let home = tmp.path();
        fs::write(home.join(".bashrc.legacy.t1"), "one").expect("seed");
        fs::write(home.join(".bashrc.legacy.t2"), "two").expect("seed");

        let link = pin_reference(home, ".bashrc", &home.join(".bashrc.legacy.t1")).expect("pin");
        assert_eq!(fs::read_to_string(&link).expect("read"), "one");
        pin_reference(home, ".bashrc", &home.join(".bashrc.legacy.t2")).expect("repin");
        assert_eq!(fs::read_link(&link).expect("link"), PathBuf::from(".bashrc.legacy.t2"));
        assert!(!home.join(".bashrc.legacy~").exists());
        assert_eq!(fs::read_to_string(home.join(".bashrc.legacy.t1")).expect("read"), "one");
    }

    #[test]
    fn pin_refuses_regular_file_at_reference_path() {
        let tmp = tempdir().expect("tempdir");
        let home = tmp.path();
        fs::write(home.join(".bashrc.legacy"), "hand-made").expect("seed");
        fs::write(home.join(".bashrc.legacy.t1"), "one").expect("seed");

        let err = pin_reference(home, ".bashrc", &home.join(".bashrc.legacy.t1")).expect_err("occupied");
        assert_eq!(code_of(&err), Some(ErrorCode::E005ReferenceOccupied));
        assert_eq!(fs::read_to_string(home.join(".bashrc.legacy")).expect("read"), "hand-made");
    }

    #[test]
    fn frozen_dotfile_link_is_a_candidate() {
        let tmp = tempdir().expect("tempdir");
        let home = tmp.path();
        fs::create_dir(home.join("dotfiles")).expect("mkdir");
        fs::write(home.join("dotfiles/bashrc"), "# from dotfiles\n").expect("seed");
        std::os::unix::fs::symlink("dotfiles/bashrc", home.join(".bashrc.legacy.t1")).expect("link");
        std::os::unix::fs::symlink("dotfiles/missing", home.join(".bashrc.legacy.t0")).expect("dangling");

        let cands = legacy_candidates(home, ".bashrc").expect("cands");
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].path, home.join(".bashrc.legacy.t1"));

        let (path, source) = select_legacy_source(home, ".bashrc").expect("select").expect("some");
        let link = pin_reference(home, ".bashrc", &path).expect("pin");
        assert_eq!(source, ResolutionSource::Frozen);
        assert_eq!(fs::read_to_string(link).expect("read"), "# from dotfiles\n");
    }

    #[test]
    fn reference_slots_reject_regular_files_only() {
        let tmp = tempdir().expect("tempdir");
        let home = tmp.path();
        ensure_reference_slots_free(home).expect("empty slots");
        std::os::unix::fs::symlink(".bashrc.legacy.t1", home.join(".bashrc.legacy")).expect("link");
        ensure_reference_slots_free(home).expect("links are replaceable");

        fs::write(home.join(".bash_profile.legacy"), "hand-made").expect("seed");
        let err = ensure_reference_slots_free(home).expect_err("occupied");
        assert_eq!(code_of(&err), Some(ErrorCode::E005ReferenceOccupied));
    }

    #[test]
    fn references_are_not_candidates() {
        let tmp = tempdir().expect("tempdir");
        let home = tmp.path();
        fs::write(home.join(".bashrc.legacy.t1"), "one").expect("seed");
        pin_reference(home, ".bashrc", &home.join(".bashrc.legacy.t1")).expect("pin");

        let cands = legacy_candidates(home, ".bashrc").expect("cands");
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].path, home.join(".bashrc.legacy.t1"));
    }
}
