use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;

use crate::commands::{CommandReport, load_environment};
use crate::shellenv::audit::read_events;
use crate::shellenv::backup::{list_snapshots, load_manifest, verify_snapshot};
use crate::shellenv::config::{ENV_OVERRIDES, config_file_path};
use crate::shellenv::freeze::list_legacy_files;
use crate::shellenv::layout::{
    CLUSTER_BASHRC, CLUSTER_PROFILE, ENV_FLAG, LEGACY_PAIR, MANAGED_FILES, ROUTER,
    legacy_reference_name,
};
use crate::shellenv::resolve::is_generated;
use crate::shellenv::rollback::list_rollback_scripts;
use crate::shellenv::templates::route_for_hostname;
use crate::shellenv::util::{OWNER_ONLY_MODE, current_short_hostname, short_hostname};

#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    pub hostname: Option<String>,
}

pub fn run(opts: &StatusOptions) -> Result<CommandReport> {
    let env = load_environment()?;
    let paths = &env.paths;
    let mut report = CommandReport::new("status");

    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("backup_root={}", paths.backup_root.display()));
    let config_file = config_file_path(&paths.config_dir);
    report.detail(format!(
        "config={} ({})",
        config_file.display(),
        if config_file.exists() { "present" } else { "defaults" }
    ));
    for key in ENV_OVERRIDES {
        if let Ok(value) = env::var(key) {
            report.detail(format!("override {key}={value}"));
        }
    }

    for name in MANAGED_FILES {
        let path = paths.home_file(name);
        let state = if !path.exists() {
            "absent"
        } else if is_generated(&path)? {
            "generated"
        } else {
            "user"
        };
        let legacy = list_legacy_files(&paths.home, name)?;
        report.detail(format!("{name}: {state}, {} legacy copies", legacy.len()));
    }

    for name in LEGACY_PAIR {
        let link = paths.home_file(&legacy_reference_name(name));
        match fs::read_link(&link) {
            Ok(target) if link.exists() => {
                report.detail(format!("reference {} -> {}", link.display(), target.display()));
            }
            Ok(target) => report.issue(format!(
                "reference {} is dangling (points at {})",
                link.display(),
                target.display()
            )),
            Err(_) if link.exists() => report.issue(format!(
                "reference path {} is a regular file, not a link",
                link.display()
            )),
            Err(_) => {}
        }
    }

    for name in [CLUSTER_PROFILE, CLUSTER_BASHRC, ROUTER] {
        let path = paths.home_file(name);
        if !path.exists() || !is_generated(&path)? {
            continue;
        }
        let mode = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .permissions()
            .mode()
            & 0o777;
        if mode == OWNER_ONLY_MODE {
            report.detail(format!("controller {name} mode {mode:o}"));
        } else {
            report.issue(format!("controller {name} has mode {mode:o}, expected 700"));
        }
    }

    let snapshots = list_snapshots(&paths.backup_root)?;
    report.detail(format!("snapshots={}", snapshots.len()));
    if let Some(latest) = snapshots.last() {
        let manifest = load_manifest(latest)?;
        report.detail(format!(
            "latest snapshot {} ({} mode, {} files)",
            latest.display(),
            manifest.mode,
            manifest.files.len()
        ));
        for problem in verify_snapshot(latest)? {
            report.issue(problem);
        }
    }
    if let Some(event) = read_events(&paths.backup_root)?.last() {
        report.detail(format!(
            "last audit event: run {} stage {} {} ({})",
            event.run, event.stage, event.status, event.message
        ));
    }
    let scripts = list_rollback_scripts(&paths.home)?;
    report.detail(format!("rollback_scripts={}", scripts.len()));
    if let Some(latest) = scripts.last() {
        report.detail(format!("latest rollback {}", latest.display()));
    }

    let host = match &opts.hostname {
        Some(raw) => short_hostname(raw),
        None => current_short_hostname(),
    };
    let branch = route_for_hostname(&host, &env.config.router.cluster_prefixes);
    report.detail(format!(
        "hostname={} branch={} ({ENV_FLAG}={})",
        if host.is_empty() { "<empty>" } else { host.as_str() },
        branch.flag_value(),
        branch.flag_value()
    ));

    Ok(report)
}
