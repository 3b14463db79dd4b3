//! Age-based pruning of `<workspace>/runs/<experiment>/<run>` directories.

use crate::error::EnvError;
use crate::logging;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PruneMode {
    DryRun,
    Clean,
}

#[derive(Debug, Clone)]
pub struct PrunePolicy {
    pub days_old: u64,
    pub sentinel: String,
    pub mode: PruneMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Protected,
    TooRecent,
    Eligible,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunEntry {
    pub path: PathBuf,
    pub age_days: u64,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneOutcome {
    pub entries: Vec<RunEntry>,
    pub removed: Vec<PathBuf>,
    pub vanished: usize,
    pub errors: Vec<(PathBuf, String)>,
}

impl PruneOutcome {
    pub fn count(&self, verdict: Verdict) -> usize {
        self.entries.iter().filter(|e| e.verdict == verdict).count()
    }
}

pub fn age_in_days(modified: SystemTime, now: SystemTime) -> u64 {
    now.duration_since(modified)
        .unwrap_or(Duration::ZERO)
        .as_secs()
        / DAY_SECS
}

/// Whole days strictly greater than the threshold, like `find -mtime +N`.
pub fn evaluate(age_days: u64, days_old: u64, protected: bool) -> Verdict {
    if protected {
        Verdict::Protected
    } else if age_days > days_old {
        Verdict::Eligible
    } else {
        Verdict::TooRecent
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", dir.display())),
    };
    let mut out = Vec::new();
    for entry in read_dir {
        let Ok(entry) = entry else {
            continue;
        };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

/// Remove `path` recursively without descending into other filesystems.
fn remove_tree_same_fs(path: &Path, device: u64) -> Result<()> {
    for entry in fs::read_dir(path).with_context(|| format!("failed to read {}", path.display()))? {
        let entry = entry?;
        let child = entry.path();
        let meta = match fs::symlink_metadata(&child) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(err).with_context(|| format!("failed to stat {}", child.display())),
        };
        if meta.is_dir() {
            if meta.dev() != device {
                anyhow::bail!("{} is on another filesystem; left in place", child.display());
            }
            remove_tree_same_fs(&child, device)?;
        } else {
            match fs::remove_file(&child) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to remove {}", child.display()));
                }
            }
        }
    }
    fs::remove_dir(path).with_context(|| format!("failed to remove {}", path.display()))
}

pub fn prune_runs(workspace: &Path, policy: &PrunePolicy, now: SystemTime) -> Result<PruneOutcome> {
    if !workspace.is_dir() {
        return Err(EnvError::WorkspaceMissing(workspace.display().to_string()).into());
    }
    let run_tag = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default();

    let mut outcome = PruneOutcome::default();
    let runs_root = workspace.join("runs");
    for experiment in sorted_subdirs(&runs_root)? {
        for run in sorted_subdirs(&experiment)? {
            let meta = match fs::metadata(&run) {
                Ok(meta) => meta,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    outcome.vanished += 1;
                    continue;
                }
                Err(err) => {
                    outcome.errors.push((run.clone(), err.to_string()));
                    continue;
                }
            };
            let age_days = age_in_days(meta.modified().unwrap_or(now), now);
            let protected = fs::symlink_metadata(run.join(&policy.sentinel)).is_ok();
            let verdict = evaluate(age_days, policy.days_old, protected);
            let target = run.display().to_string();

            match (verdict, policy.mode) {
                (Verdict::Eligible, PruneMode::Clean) => match remove_tree_same_fs(&run, meta.dev()) {
                    Ok(()) => {
                        logging::info(&run_tag, "prune", "remove", &target, &format!("{age_days} days old"));
                        outcome.removed.push(run.clone());
                    }
                    Err(err) if !run.exists() => {
                        logging::info(&run_tag, "prune", "vanished", &target, &format!("{err:#}"));
                        outcome.vanished += 1;
                    }
                    Err(err) => {
                        logging::warn(&run_tag, "prune", "remove", &target, &format!("{err:#}"));
                        outcome.errors.push((run.clone(), format!("{err:#}")));
                    }
                },
                (Verdict::Eligible, PruneMode::DryRun) => {
                    logging::info(&run_tag, "prune", "would-remove", &target, &format!("{age_days} days old"));
                }
                (Verdict::Protected, _) => {
                    logging::info(&run_tag, "prune", "skip", &target, "sentinel present");
                }
                (Verdict::TooRecent, _) => {}
            }
            outcome.entries.push(RunEntry {
                path: run,
                age_days,
                verdict,
            });
        }
    }
    Ok(outcome)
}
