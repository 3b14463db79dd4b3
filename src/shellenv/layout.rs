//! Fixed file names the migration owns inside the home directory.

/// Shell-startup files that are snapshotted before any mutation and restored
/// by the rollback script.
pub const MANAGED_FILES: &[&str] = &[".bash_profile", ".bashrc", ".profile", ".condarc"];

/// Heavier directories archived best-effort into each snapshot, paired with
/// the archive file name used inside the snapshot.
pub const HEAVY_DIRS: &[(&str, &str)] = &[(".ssh", "ssh.tar.gz"), (".config", "config.tar.gz")];

pub const DEFAULT_FREEZE_TARGETS: &[&str] = &[".bash_profile", ".bashrc", ".profile"];
pub const ADVANCED_FREEZE_TARGETS: &[&str] = &[".bash_profile", ".bashrc", ".profile", ".condarc"];

/// Names the legacy branch of the router sources, in order.
pub const LEGACY_PAIR: &[&str] = &[".bash_profile", ".bashrc"];

pub const CLUSTER_PROFILE: &str = ".cluster_profile";
pub const CLUSTER_BASHRC: &str = ".cluster_bashrc";
pub const ROUTER: &str = ".bash_profile";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const AUDIT_LOG: &str = "audit.log";
pub const ROLLBACK_PREFIX: &str = "rollback_env_";

/// Marker line carried by every file this tool writes.
pub const MANAGED_MARKER: &str = "# managed-by: hpcenv";

pub const ENV_FLAG: &str = "HPC_ENV";

pub fn legacy_file_name(name: &str, timestamp: &str) -> String {
    format!("{name}.legacy.{timestamp}")
}

pub fn legacy_glob_prefix(name: &str) -> String {
    format!("{name}.legacy.")
}

pub fn legacy_reference_name(name: &str) -> String {
    format!("{name}.legacy")
}

pub fn rollback_script_name(timestamp: &str) -> String {
    format!("{ROLLBACK_PREFIX}{timestamp}.sh")
}
