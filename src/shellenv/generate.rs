use crate::logging;
use crate::shellenv::context::RunContext;
use crate::shellenv::layout::{CLUSTER_BASHRC, CLUSTER_PROFILE, ROUTER};
use crate::shellenv::templates;
use crate::shellenv::util::write_owner_only;
use anyhow::Result;
use std::path::PathBuf;

/// File name and rendered body for each controller file, in write order.
pub fn render_controllers(ctx: &RunContext) -> Vec<(&'static str, String)> {
    vec![
        (CLUSTER_PROFILE, templates::cluster_profile()),
        (CLUSTER_BASHRC, templates::cluster_bashrc()),
        (ROUTER, templates::router(ctx.mode, &ctx.cluster_prefixes)),
    ]
}

pub fn generate_controllers(ctx: &RunContext) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (name, body) in render_controllers(ctx) {
        let path = ctx.home_file(name);
        write_owner_only(&path, &body)?;
        logging::info(&ctx.timestamp, "generate", "write", name, "mode 0700");
        written.push(path);
    }
    Ok(written)
}
