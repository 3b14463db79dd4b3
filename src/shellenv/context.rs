use crate::shellenv::layout::{ADVANCED_FREEZE_TARGETS, DEFAULT_FREEZE_TARGETS, rollback_script_name};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Default,
    Advanced,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Advanced => "advanced",
        }
    }

    pub fn freeze_targets(self) -> &'static [&'static str] {
        match self {
            Self::Default => DEFAULT_FREEZE_TARGETS,
            Self::Advanced => ADVANCED_FREEZE_TARGETS,
        }
    }
}

/// Everything a migration pass reads about its surroundings, captured once
/// up front so no stage consults ambient process state.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub home: PathBuf,
    pub backup_root: PathBuf,
    pub hostname: String,
    pub timestamp: String,
    pub mode: Mode,
    pub cluster_prefixes: Vec<String>,
    pub tar_bin: Option<PathBuf>,
    pub isolation_confirmed: bool,
}

impl RunContext {
    pub fn home_file(&self, name: &str) -> PathBuf {
        self.home.join(name)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.backup_root.join(&self.timestamp)
    }

    pub fn rollback_script_path(&self) -> PathBuf {
        self.home.join(rollback_script_name(&self.timestamp))
    }
}

/// Returns `base`, or `base-N` for the smallest N whose snapshot directory
/// and rollback script are both unused.
pub fn unique_timestamp(home: &Path, backup_root: &Path, base: &str) -> String {
    let taken = |stamp: &str| {
        backup_root.join(stamp).exists() || home.join(rollback_script_name(stamp)).exists()
    };
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
