//! Sequences the migration stages for one pass and enforces their ordering.
//!
//! A pass either runs every stage of its plan or stops at the first error.
//! Nothing is undone automatically: once the rollback script exists it is
//! the recovery path, before that the snapshot directory is.

use crate::error::EnvError;
use crate::logging;
use crate::shellenv::audit;
use crate::shellenv::backup::{self, BackupSnapshot};
use crate::shellenv::context::{Mode, RunContext};
use crate::shellenv::freeze::{self, FrozenFile};
use crate::shellenv::generate;
use crate::shellenv::resolve::{self, LegacyReference};
use crate::shellenv::rollback;
use crate::shellenv::templates::route_for_hostname;
use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Backup,
    Freeze,
    Resolve,
    Generate,
    EmitRollback,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Freeze => "freeze",
            Self::Resolve => "resolve",
            Self::Generate => "generate",
            Self::EmitRollback => "emit-rollback",
        }
    }

    fn requires(self, mode: Mode) -> &'static [Stage] {
        match (self, mode) {
            (Self::Backup, _) => &[],
            (Self::Freeze, _) => &[Stage::Backup],
            (Self::Resolve, _) => &[Stage::Freeze],
            (Self::Generate, Mode::Default) => &[Stage::Freeze],
            (Self::Generate, Mode::Advanced) => &[Stage::Freeze, Stage::Resolve],
            (Self::EmitRollback, _) => &[Stage::Backup, Stage::Generate],
        }
    }
}

pub fn plan(mode: Mode) -> &'static [Stage] {
    match mode {
        Mode::Default => &[Stage::Backup, Stage::Freeze, Stage::Generate, Stage::EmitRollback],
        Mode::Advanced => &[
            Stage::Backup,
            Stage::Freeze,
            Stage::Resolve,
            Stage::Generate,
            Stage::EmitRollback,
        ],
    }
}

#[derive(Debug, Default)]
struct RunState {
    completed: Vec<Stage>,
    snapshot: Option<BackupSnapshot>,
    frozen: Vec<FrozenFile>,
    references: Vec<LegacyReference>,
    generated: Vec<PathBuf>,
    rollback_script: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub mode: Mode,
    pub timestamp: String,
    pub snapshot: BackupSnapshot,
    pub frozen: Vec<FrozenFile>,
    pub references: Vec<LegacyReference>,
    pub generated: Vec<PathBuf>,
    pub rollback_script: PathBuf,
}

fn check_preconditions(stage: Stage, mode: Mode, state: &RunState) -> Result<()> {
    if let Some(missing) = stage
        .requires(mode)
        .iter()
        .find(|required| !state.completed.contains(*required))
    {
        return Err(EnvError::StageOrder {
            stage: stage.label(),
            requires: missing.label(),
        }
        .into());
    }
    Ok(())
}

fn run_stage(ctx: &RunContext, stage: Stage, state: &mut RunState) -> Result<String> {
    match stage {
        Stage::Backup => {
            let snapshot = backup::create_snapshot(ctx)?;
            let summary = format!(
                "{} files, {} archives into {}",
                snapshot.manifest.files.len(),
                snapshot.manifest.archives.iter().filter(|a| a.ok).count(),
                snapshot.dir.display()
            );
            state.snapshot = Some(snapshot);
            Ok(summary)
        }
        Stage::Freeze => {
            state.frozen = freeze::freeze_targets(ctx, ctx.mode.freeze_targets())?;
            Ok(format!("{} renamed", state.frozen.len()))
        }
        Stage::Resolve => {
            state.references = resolve::resolve_references(ctx)?;
            Ok(format!("{} references pinned", state.references.len()))
        }
        Stage::Generate => {
            state.generated = generate::generate_controllers(ctx)?;
            Ok(format!("{} files written", state.generated.len()))
        }
        Stage::EmitRollback => {
            let snapshot = state
                .snapshot
                .as_ref()
                .context("rollback requested without a snapshot")?;
            let script = rollback::emit_rollback(ctx, snapshot)?;
            let summary = script.display().to_string();
            state.rollback_script = Some(script);
            Ok(summary)
        }
    }
}

fn record(ctx: &RunContext, stage: Stage, status: &str, message: &str) {
    if let Err(err) = audit::append_event(&ctx.backup_root, &ctx.timestamp, stage.label(), status, message) {
        logging::warn(&ctx.timestamp, stage.label(), "audit", "audit.log", &format!("{err:#}"));
    }
}

fn run_stages(ctx: &RunContext, stages: &[Stage]) -> Result<RunState> {
    let mut state = RunState::default();
    for stage in stages {
        check_preconditions(*stage, ctx.mode, &state)?;
        match run_stage(ctx, *stage, &mut state) {
            Ok(summary) => {
                record(ctx, *stage, "ok", &summary);
                logging::info(&ctx.timestamp, stage.label(), "done", ctx.mode.label(), &summary);
                state.completed.push(*stage);
            }
            Err(err) => {
                let message = format!("{err:#}");
                record(ctx, *stage, "failed", &message);
                logging::error(&ctx.timestamp, stage.label(), "abort", ctx.mode.label(), &message);
                return Err(err.context(format!("{} stage failed", stage.label())));
            }
        }
    }
    Ok(state)
}

/// Run one full pass in `ctx.mode`.
pub fn run_migration(ctx: &RunContext) -> Result<MigrationOutcome> {
    if ctx.mode == Mode::Advanced && !ctx.isolation_confirmed {
        return Err(EnvError::IsolationNotConfirmed.into());
    }
    if !ctx.home.is_dir() {
        return Err(EnvError::HomeMissing(ctx.home.display().to_string()).into());
    }
    if ctx.mode == Mode::Advanced {
        resolve::ensure_reference_slots_free(&ctx.home)?;
    }

    let branch = route_for_hostname(&ctx.hostname, &ctx.cluster_prefixes);
    logging::info(
        &ctx.timestamp,
        "start",
        ctx.mode.label(),
        &ctx.home.display().to_string(),
        &format!("host {} routes to {}", ctx.hostname, branch.flag_value()),
    );

    let state = run_stages(ctx, plan(ctx.mode))?;
    Ok(MigrationOutcome {
        mode: ctx.mode,
        timestamp: ctx.timestamp.clone(),
        snapshot: state.snapshot.context("pass finished without a snapshot")?,
        frozen: state.frozen,
        references: state.references,
        generated: state.generated,
        rollback_script: state
            .rollback_script
            .context("pass finished without a rollback script")?,
    })
}
