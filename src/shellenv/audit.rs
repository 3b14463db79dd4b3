use crate::shellenv::layout::AUDIT_LOG;
use crate::shellenv::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub run: String,
    pub stage: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(
    backup_root: &Path,
    run: &str,
    stage: &str,
    status: &str,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(backup_root)
        .with_context(|| format!("failed to create {}", backup_root.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        run: run.to_string(),
        stage: stage.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = backup_root.join(AUDIT_LOG);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

pub fn read_events(backup_root: &Path) -> Result<Vec<AuditEvent>> {
    let path = backup_root.join(AUDIT_LOG);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .with_context(|| format!("failed to parse audit line in {}", path.display()))
        })
        .collect()
}
