use anyhow::Result;
use std::env;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::commands::CommandReport;
use crate::error::EnvError;
use crate::shellenv::config::{load_config, load_env_config};
use crate::shellenv::paths::config_dir_without_home;
use crate::shellenv::runs::{PruneMode, PrunePolicy, Verdict, prune_runs};

#[derive(Debug, Clone)]
pub struct PruneOptions {
    pub mode: PruneMode,
}

fn required_workspace() -> Result<PathBuf> {
    match env::var("WORKSPACE") {
        Ok(v) if !v.trim().is_empty() => Ok(PathBuf::from(v.trim())),
        _ => Err(EnvError::WorkspaceMissing("WORKSPACE is unset".to_string()).into()),
    }
}

pub fn run(opts: &PruneOptions) -> Result<CommandReport> {
    let workspace = required_workspace()?;
    let config_dir =
        config_dir_without_home(dirs::home_dir().as_deref(), env::var("HPCENV_CONFIG_DIR").ok());
    let config = match config_dir {
        Some(dir) => load_config(&dir)?,
        None => load_env_config()?,
    };
    let policy = PrunePolicy {
        days_old: config.prune.days_old,
        sentinel: config.prune.sentinel,
        mode: opts.mode,
    };

    let outcome = prune_runs(&workspace, &policy, SystemTime::now())?;

    let mut report = CommandReport::new("prune");
    report.detail(format!(
        "mode={}",
        match policy.mode {
            PruneMode::DryRun => "dry-run",
            PruneMode::Clean => "clean",
        }
    ));
    report.detail(format!("workspace={}", workspace.display()));
    report.detail(format!("days_old={}", policy.days_old));
    report.detail(format!("sentinel={}", policy.sentinel));

    for entry in &outcome.entries {
        match entry.verdict {
            Verdict::Eligible if policy.mode == PruneMode::DryRun => report.detail(format!(
                "would remove {} ({} days old)",
                entry.path.display(),
                entry.age_days
            )),
            Verdict::Protected => report.detail(format!("protected {}", entry.path.display())),
            _ => {}
        }
    }
    for path in &outcome.removed {
        report.detail(format!("removed {}", path.display()));
    }
    report.detail(format!(
        "scanned={} eligible={} protected={} too_recent={} removed={} vanished={}",
        outcome.entries.len(),
        outcome.count(Verdict::Eligible),
        outcome.count(Verdict::Protected),
        outcome.count(Verdict::TooRecent),
        outcome.removed.len(),
        outcome.vanished
    ));
    for (path, err) in &outcome.errors {
        report.issue(format!("failed to remove {}: {err}", path.display()));
    }
    Ok(report)
}
