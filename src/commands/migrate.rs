use anyhow::Result;

use crate::commands::{CommandReport, load_environment, migration_report, run_context};
use crate::shellenv::context::Mode;
use crate::shellenv::orchestrator::run_migration;

pub fn run() -> Result<CommandReport> {
    let env = load_environment()?;
    let ctx = run_context(&env, Mode::Default, false);
    let outcome = run_migration(&ctx)?;
    Ok(migration_report("migrate", &outcome))
}
