use crate::error::EnvError;
use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_BACKUP_ROOT: &str = ".hpcenv_backups";

#[derive(Debug, Clone)]
pub struct EnvPaths {
    pub home: PathBuf,
    pub config_dir: PathBuf,
    pub backup_root: PathBuf,
}

impl EnvPaths {
    pub fn home_file(&self, name: &str) -> PathBuf {
        self.home.join(name)
    }
}

pub fn required_home_dir() -> Result<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Err(EnvError::HomeMissing("HOME is unset".to_string()).into());
    };
    if !home.is_dir() {
        return Err(EnvError::HomeMissing(home.display().to_string()).into());
    }
    Ok(home)
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_config_dir(home: &Path) -> PathBuf {
    env_or_default_path("HPCENV_CONFIG_DIR", home.join(".hpcenv"))
}

/// Config directory for commands that do not need a home directory. An
/// explicit override wins; without one and without a home there is none.
pub fn config_dir_without_home(home: Option<&Path>, override_dir: Option<String>) -> Option<PathBuf> {
    match override_dir {
        Some(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => home.map(|home| home.join(".hpcenv")),
    }
}

/// Relative backup roots hang off the home directory.
pub fn backup_root_for(home: &Path, configured: &str) -> PathBuf {
    let configured = Path::new(configured);
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        home.join(configured)
    }
}

pub fn resolve_paths(home: PathBuf, backup_root: &str) -> EnvPaths {
    let config_dir = resolve_config_dir(&home);
    let backup_root = backup_root_for(&home, backup_root);
    EnvPaths {
        home,
        config_dir,
        backup_root,
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BACKUP_ROOT, backup_root_for, config_dir_without_home};
    use std::path::{Path, PathBuf};

    #[test]
    fn config_dir_without_home_never_falls_back_to_cwd() {
        assert_eq!(config_dir_without_home(None, None), None);
        assert_eq!(config_dir_without_home(None, Some("  ".to_string())), None);
        assert_eq!(
            config_dir_without_home(None, Some("/etc/hpcenv".to_string())),
            Some(PathBuf::from("/etc/hpcenv"))
        );
        assert_eq!(
            config_dir_without_home(Some(Path::new("/home/alice")), None),
            Some(PathBuf::from("/home/alice/.hpcenv"))
        );
    }

    #[test]
    fn relative_backup_root_is_under_home() {
        let got = backup_root_for(Path::new("/home/alice"), DEFAULT_BACKUP_ROOT);
        assert_eq!(got, PathBuf::from("/home/alice/.hpcenv_backups"));
    }

    #[test]
    fn absolute_backup_root_is_kept() {
        let got = backup_root_for(Path::new("/home/alice"), "/scratch/alice/backups");
        assert_eq!(got, PathBuf::from("/scratch/alice/backups"));
    }
}
