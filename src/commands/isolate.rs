use anyhow::Result;

use crate::commands::{CommandReport, load_environment, migration_report, run_context};
use crate::error::EnvError;
use crate::shellenv::context::Mode;
use crate::shellenv::orchestrator::run_migration;

#[derive(Debug, Clone, Default)]
pub struct IsolateOptions {
    pub confirm: bool,
}

pub fn run(opts: &IsolateOptions) -> Result<CommandReport> {
    if !opts.confirm {
        return Err(EnvError::IsolationNotConfirmed.into());
    }
    let env = load_environment()?;
    let ctx = run_context(&env, Mode::Advanced, opts.confirm);
    let outcome = run_migration(&ctx)?;
    let mut report = migration_report("isolate", &outcome);
    if outcome.references.len() < crate::shellenv::layout::LEGACY_PAIR.len() {
        report.detail(
            "warning: not every legacy reference could be pinned; the legacy branch will skip the missing ones",
        );
    }
    Ok(report)
}
