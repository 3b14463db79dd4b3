pub mod isolate;
pub mod migrate;
pub mod prune;
pub mod status;

use anyhow::Result;
use serde::Serialize;

use crate::shellenv::config::{EnvConfig, load_config};
use crate::shellenv::context::{Mode, RunContext, unique_timestamp};
use crate::shellenv::orchestrator::MigrationOutcome;
use crate::shellenv::paths::{EnvPaths, required_home_dir, resolve_config_dir, resolve_paths};
use crate::shellenv::resolve::ResolutionSource;
use crate::shellenv::util::{current_short_hostname, run_timestamp};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn render_text(&self) -> String {
        let mut out = format!(
            "{}: {}\n",
            self.command,
            if self.ok { "ok" } else { "issues found" }
        );
        for detail in &self.details {
            out.push_str(&format!("  - {detail}\n"));
        }
        for issue in &self.issues {
            out.push_str(&format!("  ! {issue}\n"));
        }
        out
    }
}

/// Home, config, and derived paths shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Environment {
    pub paths: EnvPaths,
    pub config: EnvConfig,
}

pub fn load_environment() -> Result<Environment> {
    let home = required_home_dir()?;
    let config = load_config(&resolve_config_dir(&home))?;
    let paths = resolve_paths(home, &config.backup.root);
    Ok(Environment { paths, config })
}

pub fn run_context(env: &Environment, mode: Mode, isolation_confirmed: bool) -> RunContext {
    let timestamp = unique_timestamp(&env.paths.home, &env.paths.backup_root, &run_timestamp());
    RunContext {
        home: env.paths.home.clone(),
        backup_root: env.paths.backup_root.clone(),
        hostname: current_short_hostname(),
        timestamp,
        mode,
        cluster_prefixes: env.config.router.cluster_prefixes.clone(),
        tar_bin: env.config.backup.tar_bin.clone(),
        isolation_confirmed,
    }
}

pub fn migration_report(command: &str, outcome: &MigrationOutcome) -> CommandReport {
    let mut report = CommandReport::new(command);
    report.detail(format!("mode={}", outcome.mode.label()));
    report.detail(format!("timestamp={}", outcome.timestamp));
    report.detail(format!("snapshot={}", outcome.snapshot.dir.display()));
    for file in &outcome.snapshot.manifest.files {
        report.detail(format!("backed up {} ({} bytes)", file.name, file.bytes));
    }
    for archive in &outcome.snapshot.manifest.archives {
        if archive.ok {
            report.detail(format!("archived {} as {}", archive.dir, archive.archive));
        } else {
            report.detail(format!(
                "warning: archive of {} skipped (best-effort): {}",
                archive.dir,
                archive.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    for frozen in &outcome.frozen {
        report.detail(format!("froze {} -> {}", frozen.name, frozen.legacy.display()));
    }
    for reference in &outcome.references {
        let how = match reference.source {
            ResolutionSource::Frozen => "most recent legacy file",
            ResolutionSource::ActiveFallback => "fallback to active file",
        };
        report.detail(format!(
            "pinned {} -> {} ({how})",
            reference.link.display(),
            reference.target.display()
        ));
    }
    for path in &outcome.generated {
        report.detail(format!("generated {}", path.display()));
    }
    report.detail(format!("rollback_script={}", outcome.rollback_script.display()));
    report.detail(format!(
        "to undo this run: sh {}",
        outcome.rollback_script.display()
    ));
    report
}

#[cfg(test)]
mod tests {
    use super::CommandReport;

    #[test]
    fn issue_flips_ok_and_renders() {
        let mut report = CommandReport::new("status");
        report.detail("home=/home/alice");
        assert!(report.ok);
        report.issue("dangling reference");
        assert!(!report.ok);
        assert_eq!(
            report.render_text(),
            "status: issues found\n  - home=/home/alice\n  ! dangling reference\n"
        );
    }
}
