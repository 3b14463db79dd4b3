use crate::error::EnvError;
use crate::shellenv::paths::DEFAULT_BACKUP_ROOT;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DAYS_OLD: u64 = 60;
pub const DEFAULT_SENTINEL: &str = ".keep";

/// Environment keys that override the config file, reported by `status`.
pub const ENV_OVERRIDES: &[&str] = &[
    "HPCENV_CONFIG_DIR",
    "HPCENV_CLUSTER_PREFIXES",
    "HPCENV_BACKUP_ROOT",
    "HPCENV_TAR_BIN",
    "HPCENV_PRUNE_SENTINEL",
    "DAYS_OLD",
    "WORKSPACE",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub cluster_prefixes: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cluster_prefixes: vec!["jaci".to_string(), "ian".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub root: String,
    #[serde(default)]
    pub tar_bin: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_BACKUP_ROOT.to_string(),
            tar_bin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneConfig {
    pub days_old: u64,
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
}

fn default_sentinel() -> String {
    DEFAULT_SENTINEL.to_string()
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            days_old: DEFAULT_DAYS_OLD,
            sentinel: default_sentinel(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvConfig {
    pub router: RouterConfig,
    pub backup: BackupConfig,
    pub prune: PruneConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialEnvConfig {
    router: Option<RouterConfig>,
    backup: Option<BackupConfig>,
    prune: Option<PruneConfig>,
}

fn env_or_string(lookup: &dyn Fn(&str) -> Option<String>, var: &str, fallback: &str) -> String {
    match lookup(var) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_csv(lookup: &dyn Fn(&str) -> Option<String>, var: &str, fallback: &[String]) -> Vec<String> {
    match lookup(var) {
        Some(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        None => fallback.to_vec(),
    }
}

fn env_strict_u64(lookup: &dyn Fn(&str) -> Option<String>, var: &str, fallback: u64) -> Result<u64> {
    match lookup(var) {
        Some(v) if !v.trim().is_empty() => v.trim().parse::<u64>().map_err(|_| {
            anyhow::Error::from(EnvError::InvalidConfig(format!(
                "{var} must be a non-negative integer, got `{}`",
                v.trim()
            )))
        }),
        _ => Ok(fallback),
    }
}

fn is_safe_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

fn validate(cfg: &EnvConfig) -> Result<()> {
    if cfg.router.cluster_prefixes.is_empty() {
        return Err(EnvError::InvalidConfig("at least one cluster hostname prefix is required".into()).into());
    }
    if let Some(bad) = cfg
        .router
        .cluster_prefixes
        .iter()
        .find(|prefix| !is_safe_prefix(prefix))
    {
        return Err(EnvError::InvalidConfig(format!(
            "cluster prefix `{bad}` may only contain [A-Za-z0-9_-]"
        ))
        .into());
    }
    if cfg.backup.root.trim().is_empty() {
        return Err(EnvError::InvalidConfig("backup root cannot be empty".into()).into());
    }
    let sentinel = cfg.prune.sentinel.as_str();
    if sentinel.is_empty() || sentinel.contains('/') || sentinel == "." || sentinel == ".." {
        return Err(EnvError::InvalidConfig(format!(
            "prune sentinel `{sentinel}` must be a plain file name"
        ))
        .into());
    }
    Ok(())
}

pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join("config.toml")
}

fn merge_file_config(base: &mut EnvConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: PartialEnvConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse hpcenv config {}: {err}", path.display()))?;
    if let Some(router) = parsed.router {
        base.router = router;
    }
    if let Some(backup) = parsed.backup {
        base.backup = backup;
    }
    if let Some(prune) = parsed.prune {
        base.prune = prune;
    }
    Ok(())
}

/// Layers defaults, the optional TOML file, and overrides from `lookup`.
pub fn load_config_with(config_dir: &Path, lookup: &dyn Fn(&str) -> Option<String>) -> Result<EnvConfig> {
    let mut cfg = EnvConfig::default();
    merge_file_config(&mut cfg, &config_file_path(config_dir))?;
    apply_env_overrides(cfg, lookup)
}

/// Defaults plus overrides from `lookup`, with no config file.
pub fn load_env_config_with(lookup: &dyn Fn(&str) -> Option<String>) -> Result<EnvConfig> {
    apply_env_overrides(EnvConfig::default(), lookup)
}

fn apply_env_overrides(mut cfg: EnvConfig, lookup: &dyn Fn(&str) -> Option<String>) -> Result<EnvConfig> {
    cfg.router.cluster_prefixes =
        env_or_csv(lookup, "HPCENV_CLUSTER_PREFIXES", &cfg.router.cluster_prefixes);
    cfg.backup.root = env_or_string(lookup, "HPCENV_BACKUP_ROOT", &cfg.backup.root);
    if let Some(tar) = lookup("HPCENV_TAR_BIN").filter(|v| !v.trim().is_empty()) {
        cfg.backup.tar_bin = Some(PathBuf::from(tar.trim()));
    }
    cfg.prune.sentinel = env_or_string(lookup, "HPCENV_PRUNE_SENTINEL", &cfg.prune.sentinel);
    cfg.prune.days_old = env_strict_u64(lookup, "DAYS_OLD", cfg.prune.days_old)?;

    validate(&cfg)?;
    Ok(cfg)
}

pub fn load_config(config_dir: &Path) -> Result<EnvConfig> {
    load_config_with(config_dir, &|var| env::var(var).ok())
}

pub fn load_env_config() -> Result<EnvConfig> {
    load_env_config_with(&|var| env::var(var).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, code_of};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let tmp = tempdir().expect("tempdir");
        let cfg = load_config_with(tmp.path(), &lookup_from(&[])).expect("config");
        assert_eq!(cfg.router.cluster_prefixes, vec!["jaci", "ian"]);
        assert_eq!(cfg.backup.root, ".hpcenv_backups");
        assert_eq!(cfg.prune.days_old, 60);
        assert_eq!(cfg.prune.sentinel, ".keep");
    }

    #[test]
    fn file_then_env_layering() {
        let tmp = tempdir().expect("tempdir");
        fs::write(
            config_file_path(tmp.path()),
            "[router]\ncluster_prefixes = [\"gadi\"]\n\n[prune]\ndays_old = 30\n",
        )
        .expect("write config");

        let cfg = load_config_with(tmp.path(), &lookup_from(&[])).expect("config");
        assert_eq!(cfg.router.cluster_prefixes, vec!["gadi"]);
        assert_eq!(cfg.prune.days_old, 30);
        assert_eq!(cfg.prune.sentinel, ".keep");

        let cfg = load_config_with(
            tmp.path(),
            &lookup_from(&[("HPCENV_CLUSTER_PREFIXES", "jaci, ian ,"), ("DAYS_OLD", "7")]),
        )
        .expect("config");
        assert_eq!(cfg.router.cluster_prefixes, vec!["jaci", "ian"]);
        assert_eq!(cfg.prune.days_old, 7);
    }

    #[test]
    fn malformed_days_old_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let err = load_config_with(tmp.path(), &lookup_from(&[("DAYS_OLD", "sixty")]))
            .expect_err("must reject");
        assert_eq!(code_of(&err), Some(ErrorCode::E007ConfigInvalid));
    }

    #[test]
    fn unsafe_prefix_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let err = load_config_with(
            tmp.path(),
            &lookup_from(&[("HPCENV_CLUSTER_PREFIXES", "jaci*)")]),
        )
        .expect_err("must reject");
        assert!(format!("{err:#}").contains("may only contain"));
    }

    #[test]
    fn sentinel_with_path_separator_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let err = load_config_with(
            tmp.path(),
            &lookup_from(&[("HPCENV_PRUNE_SENTINEL", "../keep")]),
        )
        .expect_err("must reject");
        assert_eq!(code_of(&err), Some(ErrorCode::E007ConfigInvalid));
    }

    #[test]
    fn env_only_layering_skips_files() {
        let cfg = load_env_config_with(&lookup_from(&[
            ("DAYS_OLD", "14"),
            ("HPCENV_PRUNE_SENTINEL", ".pin"),
        ]))
        .expect("config");
        assert_eq!(cfg.prune.days_old, 14);
        assert_eq!(cfg.prune.sentinel, ".pin");
        assert_eq!(cfg.router.cluster_prefixes, vec!["jaci", "ian"]);
    }

    #[test]
    fn broken_toml_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        fs::write(config_file_path(tmp.path()), "[router\n").expect("write config");
        let err = load_config_with(tmp.path(), &lookup_from(&[])).expect_err("must fail");
        assert!(format!("{err:#}").contains("failed to parse hpcenv config"));
    }
}
