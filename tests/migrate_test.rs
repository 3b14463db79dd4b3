use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use predicates::prelude::*;
use tempfile::tempdir;

fn hpcenv(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("hpcenv");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("HPCENV_CONFIG_DIR", home.join(".hpcenv-test"))
        .env_remove("HPCENV_BACKUP_ROOT")
        .env_remove("HPCENV_CLUSTER_PREFIXES")
        .env_remove("HPCENV_TAR_BIN");
    cmd
}

fn rollback_scripts(home: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = fs::read_dir(home)
        .expect("read home")
        .map(|entry| entry.expect("entry").path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().starts_with("rollback_env_"))
                .unwrap_or(false)
        })
        .collect();
    out.sort();
    out
}

fn seed_corporate_home(home: &Path) {
    fs::write(home.join(".bash_profile"), "# corp\n. ~/.bashrc\n").expect("seed profile");
    fs::write(home.join(".bashrc"), "export CORP_PROXY=http://proxy:3128\n").expect("seed rc");
    fs::write(home.join(".condarc"), "channels:\n  - corp\n").expect("seed condarc");
}

#[test]
fn migrate_freezes_generates_and_emits_rollback() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    seed_corporate_home(home);

    hpcenv(home)
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrate: ok"))
        .stdout(predicate::str::contains("froze .bash_profile"))
        .stderr(predicate::str::contains("HPCENV_INFO"));

    for name in [".cluster_profile", ".cluster_bashrc", ".bash_profile"] {
        let mode = fs::metadata(home.join(name)).expect("generated").permissions().mode() & 0o777;
        assert_eq!(mode, 0o700, "{name}");
    }
    assert!(!home.join(".bashrc").exists());
    assert_eq!(fs::read_to_string(home.join(".condarc")).expect("condarc"), "channels:\n  - corp\n");

    let legacy: Vec<_> = fs::read_dir(home)
        .expect("read home")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(".bashrc.legacy."))
        .collect();
    assert_eq!(legacy.len(), 1);

    let scripts = rollback_scripts(home);
    assert_eq!(scripts.len(), 1);
    let mode = fs::metadata(&scripts[0]).expect("script").permissions().mode() & 0o777;
    assert_eq!(mode, 0o700);
}

#[test]
fn rollback_script_restores_pre_migration_files() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    seed_corporate_home(home);

    hpcenv(home).arg("migrate").assert().success();
    let scripts = rollback_scripts(home);

    let out = Command::new("sh").arg(&scripts[0]).output().expect("run rollback");
    assert!(out.status.success());
    assert_eq!(fs::read_to_string(home.join(".bash_profile")).expect("read"), "# corp\n. ~/.bashrc\n");
    assert_eq!(
        fs::read_to_string(home.join(".bashrc")).expect("read"),
        "export CORP_PROXY=http://proxy:3128\n"
    );
    assert!(!home.join(".profile").exists());
    assert!(home.join(".cluster_profile").exists());
}

#[test]
fn repeated_migrations_keep_distinct_runs() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    seed_corporate_home(home);

    hpcenv(home).arg("migrate").assert().success();
    hpcenv(home).arg("migrate").assert().success();

    assert_eq!(rollback_scripts(home).len(), 2);
    let snapshots = fs::read_dir(home.join(".hpcenv_backups"))
        .expect("backups")
        .filter(|e| e.as_ref().expect("entry").path().is_dir())
        .count();
    assert_eq!(snapshots, 2);
    let frozen_profiles = fs::read_dir(home)
        .expect("read home")
        .filter(|e| {
            e.as_ref()
                .expect("entry")
                .file_name()
                .to_string_lossy()
                .starts_with(".bash_profile.legacy.")
        })
        .count();
    assert_eq!(frozen_profiles, 2);
}

#[test]
fn missing_home_aborts_before_mutation() {
    let tmp = tempdir().expect("tempdir");
    let missing = tmp.path().join("nohome");

    assert_cmd::cargo::cargo_bin_cmd!("hpcenv")
        .current_dir(tmp.path())
        .env("HOME", &missing)
        .arg("migrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("E001_HOME_MISSING"));
    assert!(!missing.exists());
}

#[test]
fn status_reports_router_branch_and_snapshots() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    seed_corporate_home(home);
    hpcenv(home).arg("migrate").assert().success();

    hpcenv(home)
        .args(["status", "--hostname", "ian-login3.cluster"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hostname=ian-login3 branch=cluster"))
        .stdout(predicate::str::contains("snapshots=1"))
        .stdout(predicate::str::contains(".bash_profile: generated, 1 legacy copies"));

    hpcenv(home)
        .args(["--json", "status", "--hostname", "corp-host"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"command\": \"status\""))
        .stdout(predicate::str::contains("branch=legacy"));
}
