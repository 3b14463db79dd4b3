use std::fs;
use std::path::{Path, PathBuf};

use predicates::prelude::*;
use tempfile::tempdir;

fn hpcenv(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("hpcenv");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("HPCENV_CONFIG_DIR", home.join(".hpcenv-test"))
        .env_remove("HPCENV_BACKUP_ROOT")
        .env_remove("HPCENV_CLUSTER_PREFIXES");
    cmd
}

#[test]
fn isolate_without_confirmation_touches_nothing() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    fs::write(home.join(".bashrc"), "corp\n").expect("seed");

    hpcenv(home)
        .arg("isolate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("E006_ISOLATION_NOT_CONFIRMED"));

    assert_eq!(fs::read_to_string(home.join(".bashrc")).expect("read"), "corp\n");
    assert!(!home.join(".hpcenv_backups").exists());
}

#[test]
fn isolate_after_migrate_pins_corporate_files_and_freezes_condarc() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    fs::write(home.join(".bash_profile"), "# corp login\n").expect("seed");
    fs::write(home.join(".bashrc"), "# corp rc\n").expect("seed");
    fs::write(home.join(".condarc"), "channels: [corp]\n").expect("seed");

    hpcenv(home).arg("migrate").assert().success();
    hpcenv(home)
        .args(["isolate", "--confirm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("isolate: ok"))
        .stdout(predicate::str::contains("most recent legacy file"));

    assert_eq!(
        fs::read_to_string(home.join(".bash_profile.legacy")).expect("profile ref"),
        "# corp login\n"
    );
    assert_eq!(
        fs::read_to_string(home.join(".bashrc.legacy")).expect("rc ref"),
        "# corp rc\n"
    );
    let target = fs::read_link(home.join(".bashrc.legacy")).expect("link");
    assert!(target.is_relative());
    assert!(!home.join(".condarc").exists());

    let frozen_condarc: Vec<PathBuf> = fs::read_dir(home)
        .expect("read home")
        .map(|e| e.expect("entry").path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with(".condarc.legacy."))
                .unwrap_or(false)
        })
        .collect();
    assert_eq!(frozen_condarc.len(), 1);
}

#[test]
fn isolate_refuses_hand_made_reference_file() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    fs::write(home.join(".bashrc"), "# corp rc\n").expect("seed");
    fs::write(home.join(".bashrc.legacy"), "# my own notes\n").expect("seed");

    hpcenv(home)
        .args(["isolate", "--confirm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E005_REFERENCE_OCCUPIED"));
    assert_eq!(
        fs::read_to_string(home.join(".bashrc.legacy")).expect("read"),
        "# my own notes\n"
    );
    assert_eq!(fs::read_to_string(home.join(".bashrc")).expect("read"), "# corp rc\n");
    assert!(!home.join(".hpcenv_backups").exists());
    let frozen = fs::read_dir(home)
        .expect("read home")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".bashrc.legacy."))
        .count();
    assert_eq!(frozen, 0);
}
