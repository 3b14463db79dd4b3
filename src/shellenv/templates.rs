//! Literal bodies of every file this tool writes. Each function is pure: the
//! same inputs always render the same bytes.

use crate::shellenv::context::Mode;
use crate::shellenv::layout::{
    CLUSTER_BASHRC, CLUSTER_PROFILE, ENV_FLAG, LEGACY_PAIR, MANAGED_FILES, MANAGED_MARKER,
    legacy_reference_name,
};
use crate::shellenv::util::shell_quote;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Cluster,
    Legacy,
}

impl Branch {
    pub fn flag_value(self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::Legacy => "legacy",
        }
    }
}

/// The branch the router's `case` statement takes for `hostname`.
pub fn route_for_hostname(hostname: &str, prefixes: &[String]) -> Branch {
    if prefixes
        .iter()
        .any(|prefix| !prefix.is_empty() && hostname.starts_with(prefix.as_str()))
    {
        Branch::Cluster
    } else {
        Branch::Legacy
    }
}

fn case_pattern(prefixes: &[String]) -> String {
    prefixes
        .iter()
        .map(|prefix| format!("{prefix}*"))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn cluster_profile() -> String {
    format!(
        r#"# ~/{CLUSTER_PROFILE}
{MANAGED_MARKER}
# Cluster login profile: locale only.
export LANG=en_US.UTF-8
export LC_ALL=en_US.UTF-8
"#
    )
}

pub fn cluster_bashrc() -> String {
    format!(
        r#"# ~/{CLUSTER_BASHRC}
{MANAGED_MARKER}
# Cluster interactive shell.
set -o noclobber

unset PYTHONPATH
unset LD_LIBRARY_PATH

if command -v module >/dev/null 2>&1; then
    module purge >/dev/null 2>&1 || true
fi

export PS1='[cluster \u@\h \W]\$ '
alias ll='ls -alF'
"#
    )
}

fn legacy_sources(mode: Mode) -> String {
    let mut out = String::new();
    for name in LEGACY_PAIR {
        let reference = legacy_reference_name(name);
        match mode {
            Mode::Default => out.push_str(&format!(
                r#"        for _hpcenv_f in "$HOME/{reference}" "$HOME"/{reference}.*; do
            if [ -f "$_hpcenv_f" ]; then
                . "$_hpcenv_f"
                break
            fi
        done
"#
            )),
            Mode::Advanced => out.push_str(&format!(
                r#"        if [ -f "$HOME/{reference}" ]; then
            . "$HOME/{reference}"
        fi
"#
            )),
        }
    }
    out
}

pub fn router(mode: Mode, prefixes: &[String]) -> String {
    let pattern = case_pattern(prefixes);
    let legacy = legacy_sources(mode);
    let banner = match mode {
        Mode::Default => "# Legacy branch: stable reference first, then frozen copies oldest-first.",
        Mode::Advanced => "# Total isolation: legacy branch reads only the pinned references.",
    };
    format!(
        r#"# ~/.bash_profile
{MANAGED_MARKER}
# Login-shell router. Cluster hosts get the clean cluster pair; every other
# host gets the legacy configuration. Missing files are skipped silently.
{banner}
if [ -n "${{_HPCENV_ROUTER_ACTIVE:-}}" ]; then
    return 0 2>/dev/null || exit 0
fi
_HPCENV_ROUTER_ACTIVE=1

_hpcenv_host="$(hostname -s 2>/dev/null || hostname 2>/dev/null || true)"
_hpcenv_host="${{_hpcenv_host%%.*}}"

case "$_hpcenv_host" in
    {pattern})
        export {ENV_FLAG}=cluster
        if [ -f "$HOME/{CLUSTER_PROFILE}" ]; then
            . "$HOME/{CLUSTER_PROFILE}"
        fi
        if [ -f "$HOME/{CLUSTER_BASHRC}" ]; then
            . "$HOME/{CLUSTER_BASHRC}"
        fi
        ;;
    *)
        export {ENV_FLAG}=legacy
{legacy}        ;;
esac

unset _hpcenv_host _hpcenv_f
unset _HPCENV_ROUTER_ACTIVE
"#
    )
}

/// Restores managed files from one snapshot. Paths and stamp are embedded
/// as literals so the script stays bound to this run.
pub fn rollback_script(snapshot_dir: &Path, timestamp: &str, home: &Path) -> String {
    let files = MANAGED_FILES.join(" ");
    format!(
        r#"#!/bin/sh
{MANAGED_MARKER}
# Rollback for run {timestamp}. Restores shell startup files from the bound
# snapshot. Generated cluster files are left in place; heavy-directory
# archives in the snapshot must be restored by hand.
set -u

BACKUP_DIR={backup}
TIMESTAMP={stamp}
HOME_DIR={home}

if [ ! -d "$BACKUP_DIR" ]; then
    echo "[rollback] backup snapshot missing: $BACKUP_DIR" >&2
    exit 1
fi

echo "[rollback] restoring run $TIMESTAMP from $BACKUP_DIR"
status=0
for f in {files}; do
    if [ -f "$BACKUP_DIR/$f" ]; then
        if cp -p "$BACKUP_DIR/$f" "$HOME_DIR/$f"; then
            echo "[rollback] restored $f"
        else
            echo "[rollback] failed to restore $f" >&2
            status=1
        fi
    fi
done

echo "[rollback] cluster files kept: $HOME_DIR/{CLUSTER_PROFILE} $HOME_DIR/{CLUSTER_BASHRC}"
echo "[rollback] archives (if any) remain in $BACKUP_DIR for manual restore"
if [ "$status" -eq 0 ]; then
    echo "[rollback] complete"
fi
exit "$status"
"#,
        backup = shell_quote(&snapshot_dir.display().to_string()),
        stamp = shell_quote(timestamp),
        home = shell_quote(&home.display().to_string()),
    )
}
